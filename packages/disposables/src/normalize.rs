use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::{self, LocalBoxFuture};

use crate::{
    AbortController, AsyncDisposable, Disposable, DisposableAction, Result, Unref, empty,
};

/// A value that can be normalized into a [`Disposable`].
///
/// Each variant is one shape of resource that this crate knows how to tear down. The normalizers
/// ([`to_disposable()`], [`to_async_disposable()`] and [`DisposableAction::from_like()`]) match on
/// the variant in the order the variants are declared.
///
/// # Example
///
/// ```rust
/// use std::rc::Rc;
///
/// use disposables::{AbortController, DisposableAction, DisposableLike, DisposableStore};
///
/// let store = DisposableStore::new();
///
/// store.add(DisposableLike::action(|| println!("closure")))?;
/// store.add(Rc::new(DisposableAction::new(|| println!("disposable"))))?;
/// store.add(DisposableLike::drop_on_dispose(vec![1_u8; 1024]))?;
/// store.add(AbortController::new())?;
///
/// assert_eq!(store.len(), 4);
/// # Ok::<(), disposables::Error>(())
/// ```
#[non_exhaustive]
pub enum DisposableLike {
    /// Nothing to dispose.
    None,

    /// A callable that performs the teardown.
    Action(Box<dyn FnOnce() -> Result<()>>),

    /// A value that already satisfies the [`Disposable`] contract.
    Disposable(Rc<dyn Disposable>),

    /// A value whose teardown is its destructor.
    Drop(Box<dyn Any>),

    /// A value with asynchronous teardown.
    Async(Rc<dyn AsyncDisposable>),

    /// A handle that is released by [`Unref::unref()`].
    Unref(Rc<dyn Unref>),

    /// A cancellation source that is aborted on disposal.
    Abort(AbortController),
}

impl DisposableLike {
    /// Wraps an infallible teardown callable.
    pub fn action(action: impl FnOnce() + 'static) -> Self {
        Self::Action(Box::new(move || {
            action();
            Ok(())
        }))
    }

    /// Wraps a fallible teardown callable.
    pub fn try_action(action: impl FnOnce() -> Result<()> + 'static) -> Self {
        Self::Action(Box::new(action))
    }

    /// Wraps a value that is dropped when disposed.
    pub fn drop_on_dispose(value: impl Any) -> Self {
        Self::Drop(Box::new(value))
    }

    /// Wraps a value with asynchronous teardown.
    pub fn async_disposable(value: Rc<dyn AsyncDisposable>) -> Self {
        Self::Async(value)
    }

    /// Wraps a handle that is released by [`Unref::unref()`].
    pub fn unref(handle: Rc<dyn Unref>) -> Self {
        Self::Unref(handle)
    }

    /// Whether this is [`DisposableLike::None`].
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl<D: Disposable + 'static> From<Rc<D>> for DisposableLike {
    fn from(value: Rc<D>) -> Self {
        Self::Disposable(value)
    }
}

impl From<Rc<dyn Disposable>> for DisposableLike {
    fn from(value: Rc<dyn Disposable>) -> Self {
        Self::Disposable(value)
    }
}

impl From<AbortController> for DisposableLike {
    fn from(value: AbortController) -> Self {
        Self::Abort(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for DisposableLike {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::None, Into::into)
    }
}

impl fmt::Debug for DisposableLike {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::None => "None",
            Self::Action(_) => "Action",
            Self::Disposable(_) => "Disposable",
            Self::Drop(_) => "Drop",
            Self::Async(_) => "Async",
            Self::Unref(_) => "Unref",
            Self::Abort(_) => "Abort",
        };

        f.debug_tuple("DisposableLike").field(&kind).finish()
    }
}

/// Normalizes a disposable-like value into the synchronous [`Disposable`] contract.
///
/// * [`None`][DisposableLike::None] becomes the shared [`empty()`] disposable.
/// * A callable is wrapped so that it runs exactly once.
/// * A [`Disposable`] is returned unchanged.
/// * A value with a destructor is dropped on disposal.
/// * A value with asynchronous teardown has its teardown started but not awaited: the future is
///   polled once and abandoned if it does not complete synchronously.
/// * An [`Unref`] handle is released on disposal.
/// * An [`AbortController`] is aborted on disposal.
///
/// # Example
///
/// ```rust
/// use std::ptr;
/// use std::rc::Rc;
///
/// use disposables::{Disposable, DisposableAction, DisposableLike, to_disposable};
///
/// let original: Rc<dyn Disposable> = Rc::new(DisposableAction::new(|| {}));
/// let normalized = to_disposable(Rc::clone(&original));
///
/// assert!(ptr::addr_eq(Rc::as_ptr(&original), Rc::as_ptr(&normalized)));
///
/// to_disposable(DisposableLike::action(|| println!("tearing down"))).dispose()?;
/// # Ok::<(), disposables::Error>(())
/// ```
pub fn to_disposable(like: impl Into<DisposableLike>) -> Rc<dyn Disposable> {
    match like.into() {
        DisposableLike::None => empty(),
        DisposableLike::Disposable(disposable) => disposable,
        DisposableLike::Async(disposable) => Rc::new(FireAndForget::new(disposable)),
        other => wrap(other),
    }
}

/// Normalizes a disposable-like value into the [`AsyncDisposable`] contract.
///
/// Asynchronous teardown is awaited. Every other shape is normalized as by [`to_disposable()`] and
/// completes synchronously when the returned future is first polled.
///
/// # Example
///
/// ```rust
/// use std::rc::Rc;
///
/// use disposables::{AsyncDisposable, AsyncDisposableAction, DisposableLike, to_async_disposable};
/// use futures::executor::block_on;
///
/// let closing = Rc::new(AsyncDisposableAction::new(|| async { Ok(()) }));
/// let member: Rc<dyn AsyncDisposable> = Rc::<AsyncDisposableAction>::clone(&closing);
/// let normalized = to_async_disposable(DisposableLike::async_disposable(member));
///
/// block_on(normalized.dispose_async())?;
/// assert!(closing.is_disposed());
/// # Ok::<(), disposables::Error>(())
/// ```
pub fn to_async_disposable(like: impl Into<DisposableLike>) -> Rc<dyn AsyncDisposable> {
    match like.into() {
        DisposableLike::Async(disposable) => disposable,
        other => Rc::new(Lifted(to_disposable(other))),
    }
}

impl DisposableAction {
    /// Normalizes a disposable-like value, always wrapping it in a new [`DisposableAction`].
    ///
    /// Unlike [`to_disposable()`], even values that already satisfy the [`Disposable`] contract
    /// are wrapped, so the result always offers the scheduling helpers of [`DisposableAction`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::rc::Rc;
    ///
    /// use disposables::{DisposableAction, DisposableStore};
    ///
    /// let store = Rc::new(DisposableStore::new());
    /// let action = DisposableAction::from_like(Rc::clone(&store));
    ///
    /// let dispose = action.into_fn();
    /// dispose()?;
    ///
    /// assert!(store.is_disposed());
    /// # Ok::<(), disposables::Error>(())
    /// ```
    #[must_use]
    pub fn from_like(like: impl Into<DisposableLike>) -> Rc<Self> {
        match like.into() {
            DisposableLike::None => Rc::new(Self::empty()),
            DisposableLike::Disposable(disposable) => {
                Rc::new(Self::try_new(move || disposable.dispose()))
            }
            DisposableLike::Async(disposable) => {
                let disposable = FireAndForget::new(disposable);
                Rc::new(Self::try_new(move || disposable.dispose()))
            }
            DisposableLike::Action(action) => Rc::new(Self::try_new(action)),
            DisposableLike::Drop(value) => Rc::new(Self::new(move || drop(value))),
            DisposableLike::Unref(handle) => Rc::new(Self::new(move || handle.unref())),
            DisposableLike::Abort(controller) => controller.to_disposable(),
        }
    }
}

/// Wraps the shapes that have no more specific representation.
fn wrap(like: DisposableLike) -> Rc<dyn Disposable> {
    DisposableAction::from_like(like)
}

/// Starts an asynchronous teardown from a synchronous caller without awaiting it.
struct FireAndForget {
    target: Rc<dyn AsyncDisposable>,
    disposed: Cell<bool>,
}

impl FireAndForget {
    fn new(target: Rc<dyn AsyncDisposable>) -> Self {
        Self {
            target,
            disposed: Cell::new(false),
        }
    }
}

impl Disposable for FireAndForget {
    fn dispose(&self) -> Result<()> {
        if self.disposed.replace(true) {
            return Ok(());
        }

        match self.target.dispose_async().now_or_never() {
            Some(result) => result,
            None => {
                log::debug!(
                    "asynchronous teardown did not complete synchronously and was abandoned"
                );
                Ok(())
            }
        }
    }
}

/// Presents a synchronous disposable as an asynchronous one.
struct Lifted(Rc<dyn Disposable>);

impl AsyncDisposable for Lifted {
    fn dispose_async(&self) -> LocalBoxFuture<'_, Result<()>> {
        future::ready(self.0.dispose()).boxed_local()
    }
}
