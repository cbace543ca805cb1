use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::Error;

/// A callback that receives teardown failures that could not be returned to a caller.
pub type ErrorHandler = Rc<dyn Fn(&Error)>;

/// A replaceable slot holding the handler that receives teardown failures on the safe
/// disposal path.
///
/// A new slot starts out with the fallback handler, which ignores every error. The handler can be
/// replaced with [`set()`][Self::set] and restored to the fallback with [`reset()`][Self::reset].
///
/// Stores take a shared slot from their builder, so the handler can be set and reset after the
/// store was built. Every thread has one default slot, used by stores that were not given their
/// own. It is returned by [`default_error_handler_slot()`] and is also reachable through
/// [`set_default_error_handler()`], [`reset_default_error_handler()`] and [`report_error()`].
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// use disposables::{Error, ErrorHandlerSlot};
///
/// let seen = Rc::new(Cell::new(0));
///
/// let slot = ErrorHandlerSlot::new();
/// slot.set({
///     let seen = Rc::clone(&seen);
///     move |_| seen.set(seen.get() + 1)
/// });
///
/// slot.handle(&Error::teardown("boom"));
/// assert_eq!(seen.get(), 1);
///
/// slot.reset();
/// slot.handle(&Error::teardown("boom"));
/// assert_eq!(seen.get(), 1);
/// ```
#[derive(Default)]
pub struct ErrorHandlerSlot {
    handler: RefCell<Option<ErrorHandler>>,
}

impl ErrorHandlerSlot {
    /// Creates a slot holding the fallback (no-op) handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the handler in the slot.
    pub fn set(&self, handler: impl Fn(&Error) + 'static) {
        self.set_shared(Rc::new(handler));
    }

    /// Replaces the handler in the slot with an already shared handler.
    pub fn set_shared(&self, handler: ErrorHandler) {
        *self.handler.borrow_mut() = Some(handler);
    }

    /// Restores the fallback (no-op) handler.
    pub fn reset(&self) {
        *self.handler.borrow_mut() = None;
    }

    /// Returns the currently installed handler, if it is not the fallback.
    #[must_use]
    pub fn get(&self) -> Option<ErrorHandler> {
        self.handler.borrow().clone()
    }

    /// Passes an error to the current handler.
    ///
    /// A panic raised by the handler itself is swallowed.
    pub fn handle(&self, error: &Error) {
        // Cloned out of the cell so that the handler may replace itself.
        let handler = self.get();

        match handler {
            Some(handler) => invoke(&*handler, error),
            None => log::trace!("ignoring teardown failure with fallback handler: {error}"),
        }
    }
}

impl fmt::Debug for ErrorHandlerSlot {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorHandlerSlot")
            .field("is_fallback", &self.handler.borrow().is_none())
            .finish()
    }
}

thread_local! {
    static DEFAULT_SLOT: Rc<ErrorHandlerSlot> = Rc::new(ErrorHandlerSlot::new());
}

/// Returns the default error handler slot of the current thread.
#[must_use]
pub fn default_error_handler_slot() -> Rc<ErrorHandlerSlot> {
    DEFAULT_SLOT.with(Rc::clone)
}

/// Installs the default error handler for the current thread.
///
/// The default handler receives teardown failures from the safe disposal path of every store that
/// was not built with its own handler.
pub fn set_default_error_handler(handler: impl Fn(&Error) + 'static) {
    default_error_handler_slot().set(handler);
}

/// Restores the fallback (no-op) default error handler for the current thread.
pub fn reset_default_error_handler() {
    default_error_handler_slot().reset();
}

/// Passes an error to the default error handler of the current thread.
pub fn report_error(error: &Error) {
    default_error_handler_slot().handle(error);
}

/// Runs `handler`, swallowing a panic raised by it.
pub(crate) fn invoke(handler: &dyn Fn(&Error), error: &Error) {
    if panic::catch_unwind(AssertUnwindSafe(|| handler(error))).is_err() {
        log::warn!("error handler panicked while handling teardown failure: {error}");
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;

    use static_assertions::assert_not_impl_any;

    use super::*;

    assert_not_impl_any!(ErrorHandlerSlot: Send, Sync);

    #[test]
    fn fallback_handler_ignores_errors() {
        let slot = ErrorHandlerSlot::new();

        assert!(slot.get().is_none());
        slot.handle(&Error::teardown("ignored"));
    }

    #[test]
    fn set_and_reset() {
        let calls = Rc::new(Cell::new(0_usize));
        let slot = ErrorHandlerSlot::new();

        slot.set({
            let calls = Rc::clone(&calls);
            move |_| calls.set(calls.get() + 1)
        });

        slot.handle(&Error::AlreadyDisposed);
        slot.handle(&Error::AlreadyDisposed);
        assert_eq!(calls.get(), 2);

        slot.reset();
        slot.handle(&Error::AlreadyDisposed);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn panicking_handler_is_swallowed() {
        let slot = ErrorHandlerSlot::new();
        slot.set(|_| panic!("handler failure"));

        slot.handle(&Error::teardown("boom"));
    }

    #[test]
    fn handler_may_replace_itself() {
        let slot = Rc::new(ErrorHandlerSlot::new());
        let second_calls = Rc::new(Cell::new(0_usize));

        slot.set({
            let slot = Rc::clone(&slot);
            let second_calls = Rc::clone(&second_calls);
            move |_| {
                let second_calls = Rc::clone(&second_calls);
                slot.set(move |_| second_calls.set(second_calls.get() + 1));
            }
        });

        slot.handle(&Error::AlreadyDisposed);
        assert_eq!(second_calls.get(), 0);

        slot.handle(&Error::AlreadyDisposed);
        assert_eq!(second_calls.get(), 1);
    }

    #[test]
    fn default_slot_is_per_thread_and_resettable() {
        let calls = Rc::new(Cell::new(0_usize));

        set_default_error_handler({
            let calls = Rc::clone(&calls);
            move |_| calls.set(calls.get() + 1)
        });

        report_error(&Error::teardown("first"));
        default_error_handler_slot().handle(&Error::teardown("second"));
        assert_eq!(calls.get(), 2);

        // An explicit handler bypasses the default.
        invoke(&|_: &Error| {}, &Error::teardown("third"));
        assert_eq!(calls.get(), 2);

        reset_default_error_handler();
        report_error(&Error::teardown("fourth"));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn default_slot_is_shared_within_thread() {
        let first = default_error_handler_slot();
        let second = default_error_handler_slot();

        assert!(Rc::ptr_eq(&first, &second));
    }
}
