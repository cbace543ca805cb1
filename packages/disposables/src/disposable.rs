use std::rc::Rc;

use futures::future::LocalBoxFuture;

use crate::Result;

/// A resource with a single idempotent teardown operation.
///
/// The first call to [`dispose()`][Disposable::dispose] performs the teardown. Every subsequent
/// call is a no-op with no observable effect and returns `Ok(())`.
///
/// Disposal takes `&self` because it is frequently re-entrant: the teardown of one resource may
/// add to, remove from or dispose the container that owns it. Implementations therefore use
/// interior mutability and must not hold a borrow of their own state while calling into foreign
/// teardown logic.
///
/// Disposal is explicit. Dropping the last reference to a disposable does not dispose it.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
///
/// use disposables::{Disposable, Result};
///
/// struct Subscription {
///     active: Cell<bool>,
/// }
///
/// impl Disposable for Subscription {
///     fn dispose(&self) -> Result<()> {
///         self.active.set(false);
///         Ok(())
///     }
/// }
///
/// let subscription = Subscription {
///     active: Cell::new(true),
/// };
///
/// subscription.dispose().unwrap();
/// subscription.dispose().unwrap();
/// assert!(!subscription.active.get());
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait Disposable {
    /// Tears down the resource if it has not already been torn down.
    ///
    /// # Errors
    ///
    /// Returns the failure of the teardown logic. A failed teardown still counts as the first
    /// call; later calls do not retry it.
    fn dispose(&self) -> Result<()>;
}

/// A resource whose teardown completes asynchronously.
///
/// This is the asynchronous counterpart of [`Disposable`] with the same idempotence guarantee.
/// The returned future must be awaited for the teardown to complete.
pub trait AsyncDisposable {
    /// Tears down the resource if it has not already been torn down.
    ///
    /// # Errors
    ///
    /// The future resolves to the failure of the teardown logic, if any.
    fn dispose_async(&self) -> LocalBoxFuture<'_, Result<()>>;
}

/// A handle that keeps some host facility (typically a timer) alive until it is released.
///
/// Releasing the handle via [`unref()`][Unref::unref] is what disposing it means.
pub trait Unref {
    /// Releases the handle.
    fn unref(&self);
}

/// A container that can take ownership of a disposable.
///
/// Implemented by the aggregates of this crate so that a disposable can hand itself over with
/// [`DisposableAction::dispose_with()`][crate::DisposableAction::dispose_with].
pub trait DisposableContainer {
    /// Takes ownership of `member`, disposing it immediately if the container is already disposed.
    ///
    /// # Errors
    ///
    /// Returns the failure of the immediate disposal, if one was needed.
    fn adopt(&self, member: Rc<dyn Disposable>) -> Result<()>;
}

/// A disposable that does nothing.
#[derive(Debug, Default)]
pub struct EmptyDisposable;

impl Disposable for EmptyDisposable {
    fn dispose(&self) -> Result<()> {
        Ok(())
    }
}

thread_local! {
    static EMPTY: Rc<dyn Disposable> = Rc::new(EmptyDisposable);
}

/// Returns the shared no-op disposable of the current thread.
///
/// # Example
///
/// ```rust
/// use std::ptr;
/// use std::rc::Rc;
///
/// use disposables::Disposable;
///
/// let a = disposables::empty();
/// let b = disposables::empty();
///
/// assert!(ptr::addr_eq(Rc::as_ptr(&a), Rc::as_ptr(&b)));
/// a.dispose().unwrap();
/// ```
#[must_use]
pub fn empty() -> Rc<dyn Disposable> {
    EMPTY.with(Rc::clone)
}
