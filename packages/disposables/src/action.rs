use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::LocalBoxFuture;

use crate::{AsyncDisposable, Disposable, DisposableContainer, Result};

type Action = Box<dyn FnOnce() -> Result<()>>;
type AsyncAction = Box<dyn FnOnce() -> LocalBoxFuture<'static, Result<()>>>;

/// A disposable that runs a teardown action the first time it is disposed.
///
/// This is the base type produced by [`DisposableAction::from_like()`], which wraps any
/// disposable-like value so that the scheduling helpers of this type are uniformly available:
///
/// * [`dispose_after()`][Self::dispose_after] disposes after a delay.
/// * [`dispose_with()`][Self::dispose_with] hands the action over to a container.
/// * [`into_fn()`][Self::into_fn] converts the action into a plain function.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// use disposables::{Disposable, DisposableAction};
///
/// let calls = Rc::new(Cell::new(0));
///
/// let action = DisposableAction::new({
///     let calls = Rc::clone(&calls);
///     move || calls.set(calls.get() + 1)
/// });
///
/// action.dispose().unwrap();
/// action.dispose().unwrap();
///
/// assert_eq!(calls.get(), 1);
/// assert!(action.is_disposed());
/// ```
pub struct DisposableAction {
    action: RefCell<Option<Action>>,
    disposed: Cell<bool>,
}

impl DisposableAction {
    /// Creates a disposable that runs an infallible action on first disposal.
    #[must_use]
    pub fn new(action: impl FnOnce() + 'static) -> Self {
        Self::try_new(move || {
            action();
            Ok(())
        })
    }

    /// Creates a disposable that runs a fallible action on first disposal.
    #[must_use]
    pub fn try_new(action: impl FnOnce() -> Result<()> + 'static) -> Self {
        Self {
            action: RefCell::new(Some(Box::new(action))),
            disposed: Cell::new(false),
        }
    }

    /// Creates a disposable that does nothing when disposed.
    ///
    /// Unlike [`empty()`][crate::empty], every call returns a distinct instance that tracks its
    /// own disposed state.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            action: RefCell::new(None),
            disposed: Cell::new(false),
        }
    }

    /// Whether the action has been disposed, either directly or by an external cancellation
    /// source it is bridged to.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Enters the disposed state without running the action.
    ///
    /// Used when the teardown already happened through some other channel.
    pub(crate) fn mark_disposed(&self) {
        if self.disposed.replace(true) {
            return;
        }

        // Dropping the action releases whatever it captured.
        let action = self.action.borrow_mut().take();
        drop(action);
    }

    /// Returns a future that waits for `delay` and then disposes the action.
    ///
    /// The timer is provided by tokio, so the future must be polled inside a tokio runtime with
    /// the time driver enabled. Dropping the future before it completes cancels the scheduled
    /// disposal.
    ///
    /// # Errors
    ///
    /// The future resolves to the failure of the action, if any.
    pub fn dispose_after(self: Rc<Self>, delay: Duration) -> impl Future<Output = Result<()>> {
        async move {
            tokio::time::sleep(delay).await;
            self.dispose()
        }
    }

    /// Hands the action over to a container, which becomes responsible for disposing it.
    ///
    /// If the container is already disposed, the action is disposed immediately.
    ///
    /// # Errors
    ///
    /// Returns the failure of the immediate disposal, if one was needed.
    pub fn dispose_with(self: &Rc<Self>, container: &impl DisposableContainer) -> Result<()> {
        let erased: Rc<dyn Disposable> = Rc::<Self>::clone(self);
        container.adopt(erased)
    }

    /// Converts the action into a plain function that disposes it.
    ///
    /// The function may be called any number of times; only the first call runs the action.
    pub fn into_fn(self: Rc<Self>) -> impl Fn() -> Result<()> {
        move || self.dispose()
    }
}

impl Disposable for DisposableAction {
    fn dispose(&self) -> Result<()> {
        if self.disposed.replace(true) {
            return Ok(());
        }

        let action = self.action.borrow_mut().take();

        match action {
            Some(action) => action(),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for DisposableAction {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposableAction")
            .field("disposed", &self.disposed.get())
            .finish_non_exhaustive()
    }
}

/// A disposable that runs an asynchronous teardown action the first time it is disposed.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// use disposables::{AsyncDisposable, AsyncDisposableAction};
/// use futures::executor::block_on;
///
/// let closed = Rc::new(Cell::new(false));
///
/// let action = AsyncDisposableAction::new({
///     let closed = Rc::clone(&closed);
///     move || async move {
///         closed.set(true);
///         Ok(())
///     }
/// });
///
/// block_on(action.dispose_async()).unwrap();
/// assert!(closed.get());
/// ```
pub struct AsyncDisposableAction {
    action: RefCell<Option<AsyncAction>>,
    disposed: Cell<bool>,
}

impl AsyncDisposableAction {
    /// Creates a disposable that runs an asynchronous action on first disposal.
    #[must_use]
    pub fn new<F, Fut>(action: F) -> Self
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        Self {
            action: RefCell::new(Some(Box::new(move || action().boxed_local()))),
            disposed: Cell::new(false),
        }
    }

    /// Whether disposal has started.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}

impl AsyncDisposable for AsyncDisposableAction {
    fn dispose_async(&self) -> LocalBoxFuture<'_, Result<()>> {
        if self.disposed.replace(true) {
            return futures::future::ready(Ok(())).boxed_local();
        }

        let action = self.action.borrow_mut().take();

        match action {
            Some(action) => action(),
            None => futures::future::ready(Ok(())).boxed_local(),
        }
    }
}

impl fmt::Debug for AsyncDisposableAction {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncDisposableAction")
            .field("disposed", &self.disposed.get())
            .finish_non_exhaustive()
    }
}
