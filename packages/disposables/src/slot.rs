use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::{Disposable, DisposableContainer, DisposableLike, Error, Result, to_disposable};

/// Holds at most one disposable, disposing the previous value when a new one is set.
///
/// Useful for resources that are periodically re-created, such as a subscription that is renewed
/// whenever its configuration changes.
///
/// # Example
///
/// ```rust
/// use std::rc::Rc;
///
/// use disposables::{Disposable, DisposableAction, DisposableSlot};
///
/// let slot = DisposableSlot::new();
///
/// let first = Rc::new(DisposableAction::new(|| {}));
/// let second = Rc::new(DisposableAction::new(|| {}));
///
/// slot.set(Rc::clone(&first))?;
/// slot.set(Rc::clone(&second))?;
/// assert!(first.is_disposed());
///
/// slot.dispose()?;
/// assert!(second.is_disposed());
/// # Ok::<(), disposables::Error>(())
/// ```
#[derive(Default)]
pub struct DisposableSlot {
    value: RefCell<Option<Rc<dyn Disposable>>>,
    disposed: Cell<bool>,
}

impl DisposableSlot {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the slot has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Fails with [`Error::AlreadyDisposed`] if the slot has been disposed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyDisposed`] if the slot has been disposed.
    pub fn ensure_not_disposed(&self) -> Result<()> {
        if self.disposed.get() {
            return Err(Error::AlreadyDisposed);
        }

        Ok(())
    }

    /// The value currently held, if any.
    #[must_use]
    pub fn get(&self) -> Option<Rc<dyn Disposable>> {
        self.value.borrow().clone()
    }

    /// Stores a new value and disposes the previous one.
    ///
    /// If the slot has been disposed, the new value is disposed immediately instead.
    ///
    /// # Errors
    ///
    /// Returns the teardown failure of whichever value was disposed. The new value is held even if
    /// disposing the previous one fails.
    pub fn set(&self, like: impl Into<DisposableLike>) -> Result<()> {
        let Some(previous) = self.replace(like)? else {
            return Ok(());
        };

        previous.dispose()
    }

    /// Stores a new value and hands back the previous one without disposing it.
    ///
    /// If the slot has been disposed, the new value is disposed immediately instead and `None` is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns the teardown failure of a new value that was disposed immediately.
    pub fn replace(&self, like: impl Into<DisposableLike>) -> Result<Option<Rc<dyn Disposable>>> {
        let like = like.into();

        if self.disposed.get() {
            log::trace!("slot is disposed, disposing new value immediately");
            to_disposable(like).dispose()?;
            return Ok(None);
        }

        let value = (!like.is_none()).then(|| to_disposable(like));

        Ok(self.value.replace(value))
    }

    /// Disposes and clears the value currently held without disposing the slot.
    ///
    /// # Errors
    ///
    /// Returns the teardown failure of the value.
    pub fn dispose_current(&self) -> Result<()> {
        // The borrow ends before the value runs, as its teardown may set a new value.
        let current = self.value.take();

        match current {
            Some(current) => current.dispose(),
            None => Ok(()),
        }
    }
}

impl Disposable for DisposableSlot {
    fn dispose(&self) -> Result<()> {
        if self.disposed.replace(true) {
            return Ok(());
        }

        self.dispose_current()
    }
}

impl DisposableContainer for DisposableSlot {
    fn adopt(&self, member: Rc<dyn Disposable>) -> Result<()> {
        self.set(member)
    }
}

impl fmt::Debug for DisposableSlot {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposableSlot")
            .field("occupied", &self.value.borrow().is_some())
            .field("disposed", &self.disposed.get())
            .finish()
    }
}
