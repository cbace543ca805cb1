#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Coordinated, idempotent teardown of resources for single-threaded code.
//!
//! Everything that holds a resource (a subscription, a timer, a connection, a cancellation source)
//! is expressed as a [`Disposable`]: a value with a single idempotent [`dispose()`][1] operation.
//! Arbitrary resource shapes are normalized into that contract through [`DisposableLike`] and
//! [`to_disposable()`], and are then aggregated by containers that tear them down together:
//!
//! * [`DisposableStore`] holds an ordered list of members.
//! * [`AsyncDisposableStore`] does the same for members with asynchronous teardown, awaiting them
//!   one after another.
//! * [`DisposableSlot`] holds at most one member and disposes it when replaced.
//! * [`DisposableMap`] holds one member per key.
//! * [`WeakGuard`] disposes a member without keeping it alive.
//!
//! Containers are themselves disposable, so they nest. Once disposed, a container stays disposed
//! and anything added to it afterwards is disposed immediately.
//!
//! # Re-entrancy
//!
//! Teardown logic may call back into the container that is disposing it, most commonly to register
//! a replacement. The two batch policies in this crate differ in how they treat such late
//! additions, see [`dispose_unsafe()`] and [`dispose_safe()`].
//!
//! # Errors
//!
//! A failing member aborts an ordinary disposal pass and its [`Error`] is returned to the caller.
//! The `dispose_safely` methods of the stores instead attempt every member and pass failures to an
//! error handler, see [`ErrorHandlerSlot`].
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//!
//! use disposables::{AbortController, Disposable, DisposableAction, DisposableStore};
//!
//! let store = DisposableStore::new();
//!
//! let cancellation = AbortController::new();
//! store.add(cancellation.clone())?;
//!
//! let timer = store.add_one(Rc::new(DisposableAction::new(|| println!("timer stopped"))))?;
//!
//! store.dispose()?;
//!
//! assert!(cancellation.is_aborted());
//! assert!(timer.is_disposed());
//! # Ok::<(), disposables::Error>(())
//! ```
//!
//! [1]: Disposable::dispose

mod abort;
mod action;
mod async_store;
mod batch;
mod buffer_pool;
mod builder;
mod disposable;
mod emitter;
mod error;
mod error_handler;
mod linked_queue;
mod map;
mod normalize;
mod scope;
mod slot;
mod store;
mod weak;

pub use abort::*;
pub use action::*;
pub use async_store::*;
pub use batch::*;
pub use buffer_pool::*;
pub use builder::*;
pub use disposable::*;
pub use emitter::*;
pub use error::*;
pub use error_handler::*;
pub use linked_queue::*;
pub use map::*;
pub use normalize::*;
pub use scope::*;
pub use slot::*;
pub use store::*;
pub use weak::*;
