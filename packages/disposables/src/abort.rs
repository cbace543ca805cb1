use std::cell::{Cell, RefCell};
use std::fmt;
use std::ptr;
use std::rc::{Rc, Weak};

use crate::{Disposable, DisposableAction};

type Listener = Rc<dyn Fn()>;

#[derive(Default)]
struct SignalState {
    aborted: Cell<bool>,
    listeners: RefCell<Vec<Listener>>,
}

/// The observing side of an [`AbortController`].
///
/// Cloning the signal creates another handle to the same state.
#[derive(Clone, Default)]
pub struct AbortSignal {
    state: Rc<SignalState>,
}

impl AbortSignal {
    /// Whether the controller of this signal has been aborted.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.state.aborted.get()
    }

    /// Registers a listener that is called once when the signal is aborted.
    ///
    /// If the signal is already aborted, the listener is called immediately.
    ///
    /// Disposing the returned subscription removes the listener.
    pub fn on_abort(&self, listener: impl Fn() + 'static) -> Rc<DisposableAction> {
        if self.is_aborted() {
            listener();

            let subscription = DisposableAction::empty();
            subscription.mark_disposed();
            return Rc::new(subscription);
        }

        let listener: Listener = Rc::new(listener);
        self.state.listeners.borrow_mut().push(Rc::clone(&listener));

        let state = Rc::downgrade(&self.state);
        Rc::new(DisposableAction::new(move || {
            if let Some(state) = state.upgrade() {
                state.listeners.borrow_mut().retain(|candidate| {
                    !ptr::addr_eq(Rc::as_ptr(candidate), Rc::as_ptr(&listener))
                });
            }
        }))
    }

    fn abort(&self) {
        if self.state.aborted.replace(true) {
            return;
        }

        // Taken out of the cell so listeners may subscribe or unsubscribe while we notify.
        let listeners = self.state.listeners.take();

        for listener in listeners {
            listener();
        }
    }
}

impl fmt::Debug for AbortSignal {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortSignal")
            .field("aborted", &self.state.aborted.get())
            .field("listeners", &self.state.listeners.borrow().len())
            .finish()
    }
}

/// A single-threaded cancellation source.
///
/// Aborting the controller notifies every listener registered on its [`AbortSignal`]. Cloning the
/// controller creates another handle to the same state.
///
/// Controllers are disposable-like: normalizing one produces a disposable that aborts it. The
/// bridge works in both directions, see [`to_disposable()`][Self::to_disposable].
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// use disposables::AbortController;
///
/// let controller = AbortController::new();
/// let cancelled = Rc::new(Cell::new(false));
///
/// let _subscription = controller.signal().on_abort({
///     let cancelled = Rc::clone(&cancelled);
///     move || cancelled.set(true)
/// });
///
/// controller.abort();
/// assert!(cancelled.get());
/// ```
#[derive(Clone, Debug, Default)]
pub struct AbortController {
    signal: AbortSignal,
}

impl AbortController {
    /// Creates a controller that has not been aborted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the signal observed by cancellable operations.
    #[must_use]
    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    /// Aborts the controller. Calling this more than once has no further effect.
    pub fn abort(&self) {
        self.signal.abort();
    }

    /// Whether the controller has been aborted.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.signal.is_aborted()
    }

    /// Returns a disposable bridged to this controller.
    ///
    /// Disposing the returned action aborts the controller. Aborting the controller through any
    /// other handle flips the action into the disposed state without running it again.
    ///
    /// The action listens on the signal only while it is alive and not yet disposed.
    ///
    /// # Example
    ///
    /// ```rust
    /// use disposables::AbortController;
    ///
    /// let controller = AbortController::new();
    /// let adapter = controller.to_disposable();
    ///
    /// controller.abort();
    /// assert!(adapter.is_disposed());
    /// ```
    #[must_use]
    pub fn to_disposable(&self) -> Rc<DisposableAction> {
        let adapter = Rc::new_cyclic(|weak_adapter: &Weak<DisposableAction>| {
            let weak_adapter = Weak::clone(weak_adapter);

            let subscription = self.signal.on_abort(move || {
                if let Some(adapter) = weak_adapter.upgrade() {
                    adapter.mark_disposed();
                }
            });

            // Runs when the action is dropped, whether or not it was ever run.
            let unsubscribe = scopeguard::guard(subscription, |subscription| {
                _ = subscription.dispose();
            });

            let controller = self.clone();
            DisposableAction::new(move || {
                drop(unsubscribe);
                controller.abort();
            })
        });

        // An already aborted signal ran the listener before the adapter could be reached.
        if self.is_aborted() {
            adapter.mark_disposed();
        }

        adapter
    }
}
