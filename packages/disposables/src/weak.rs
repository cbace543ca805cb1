use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::{Disposable, Result};

/// Disposes a target without keeping it alive.
///
/// The guard holds a weak reference. Disposing the guard disposes the target if it still exists
/// and does nothing if every strong reference to it has already been dropped. Either way, the guard
/// releases its reference on first disposal, so later calls never reach the target.
///
/// # Example
///
/// ```rust
/// use std::rc::Rc;
///
/// use disposables::{Disposable, DisposableAction, WeakGuard};
///
/// let target = Rc::new(DisposableAction::new(|| println!("closing")));
/// let guard = WeakGuard::new(&target);
///
/// drop(target);
///
/// // The target is gone, so this does nothing.
/// guard.dispose()?;
/// # Ok::<(), disposables::Error>(())
/// ```
pub struct WeakGuard<T: Disposable + ?Sized> {
    target: RefCell<Option<Weak<T>>>,
}

impl<T: Disposable + ?Sized> WeakGuard<T> {
    /// Creates a guard for `target` that does not extend its lifetime.
    #[must_use]
    pub fn new(target: &Rc<T>) -> Self {
        Self {
            target: RefCell::new(Some(Rc::downgrade(target))),
        }
    }

    /// Whether the guard has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.target.borrow().is_none()
    }

    /// The target, if the guard has not been disposed and the target still exists.
    #[must_use]
    pub fn target(&self) -> Option<Rc<T>> {
        self.target.borrow().as_ref().and_then(Weak::upgrade)
    }
}

impl<T: Disposable + ?Sized> Disposable for WeakGuard<T> {
    fn dispose(&self) -> Result<()> {
        let Some(target) = self.target.take() else {
            return Ok(());
        };

        match target.upgrade() {
            Some(target) => target.dispose(),
            None => {
                log::trace!("guarded target no longer exists, nothing to dispose");
                Ok(())
            }
        }
    }
}

impl<T: Disposable + ?Sized> fmt::Debug for WeakGuard<T> {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.target.borrow() {
            None => "disposed",
            Some(target) if target.strong_count() == 0 => "dropped",
            Some(_) => "alive",
        };

        f.debug_struct("WeakGuard").field("target", &state).finish()
    }
}
