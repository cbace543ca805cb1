use std::cell::{Cell, RefCell};
use std::fmt;
use std::ptr;
use std::rc::Rc;

use crate::{
    Disposable, DisposableContainer, DisposableLike, DisposableStoreBuilder, Error,
    ErrorHandlerSlot, Result, ScratchPool, StoreMember, dispose_safe, dispose_unsafe,
    error_handler, to_disposable,
};

/// An ordered collection of disposables that are torn down together.
///
/// Members are disposed in the order they were added. The store has two ways of disposing its
/// members:
///
/// * [`dispose()`][Disposable::dispose] is terminal. The store becomes permanently disposed and
///   every later addition is disposed immediately instead of being stored. Members added by the
///   teardown of another member during this pass are therefore disposed as well.
/// * [`dispose_current()`][Self::dispose_current] disposes the members the store holds at the
///   time of the call and leaves the store usable. Members added during the pass are kept for the
///   next one.
///
/// A failing member aborts either pass and its error is returned. Use
/// [`dispose_safely()`][Self::dispose_safely] to attempt every member regardless, routing failures
/// to an error handler.
///
/// The store itself implements [`Disposable`], so stores nest.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// use disposables::{Disposable, DisposableStore};
///
/// let log = Rc::new(RefCell::new(Vec::new()));
/// let store = DisposableStore::new();
///
/// for name in ["a", "b"] {
///     let log = Rc::clone(&log);
///     store.add_fn(move || log.borrow_mut().push(name))?;
/// }
///
/// store.dispose()?;
/// assert_eq!(*log.borrow(), vec!["a", "b"]);
///
/// // Once disposed, additions are torn down immediately.
/// let late = Rc::clone(&log);
/// store.add_fn(move || late.borrow_mut().push("c"))?;
/// assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
/// # Ok::<(), disposables::Error>(())
/// ```
pub struct DisposableStore {
    members: RefCell<Vec<StoreMember>>,
    disposed: Cell<bool>,
    scratch_pool: ScratchPool<StoreMember>,
    error_handler: Rc<ErrorHandlerSlot>,
}

impl DisposableStore {
    /// Creates an empty store with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts building a store with a custom configuration.
    pub fn builder() -> DisposableStoreBuilder {
        DisposableStoreBuilder::new()
    }

    pub(crate) fn new_inner(
        scratch_pool: ScratchPool<StoreMember>,
        error_handler: Rc<ErrorHandlerSlot>,
    ) -> Self {
        Self {
            members: RefCell::new(Vec::new()),
            disposed: Cell::new(false),
            scratch_pool,
            error_handler,
        }
    }

    /// Whether the store has been disposed and no longer holds members.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Number of members currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.borrow().iter().flatten().count()
    }

    /// Whether the store currently holds no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.borrow().iter().all(Option::is_none)
    }

    /// Fails with [`Error::AlreadyDisposed`] if the store has been disposed.
    ///
    /// Adding to a disposed store is not an error, so callers that want to guard further work
    /// check explicitly.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyDisposed`] if the store has been disposed.
    pub fn ensure_not_disposed(&self) -> Result<()> {
        if self.disposed.get() {
            return Err(Error::AlreadyDisposed);
        }

        Ok(())
    }

    /// Normalizes a disposable-like value and appends it to the store.
    ///
    /// [`DisposableLike::None`] is skipped. If the store has been disposed, the value is disposed
    /// immediately instead of being stored.
    ///
    /// # Errors
    ///
    /// Returns the teardown failure of a value that was disposed immediately.
    pub fn add(&self, like: impl Into<DisposableLike>) -> Result<()> {
        let like = like.into();

        if like.is_none() {
            return Ok(());
        }

        self.adopt(to_disposable(like))
    }

    /// Appends a teardown closure to the store.
    ///
    /// # Errors
    ///
    /// Returns the teardown failure of a closure that was run immediately.
    pub fn add_fn(&self, action: impl FnOnce() + 'static) -> Result<()> {
        self.add(DisposableLike::action(action))
    }

    /// Appends every value, in iteration order.
    ///
    /// # Errors
    ///
    /// If the store has been disposed, the values are disposed immediately and the first failure
    /// stops the iteration and is returned.
    pub fn add_all<I>(&self, items: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<DisposableLike>,
    {
        for item in items {
            self.add(item)?;
        }

        Ok(())
    }

    /// Appends a disposable and hands the same allocation back, for further use by the caller.
    ///
    /// # Errors
    ///
    /// Returns the teardown failure of a disposable that was disposed immediately.
    pub fn add_one<D: Disposable + 'static>(&self, member: Rc<D>) -> Result<Rc<D>> {
        let erased: Rc<dyn Disposable> = Rc::<D>::clone(&member);
        self.adopt(erased)?;
        Ok(member)
    }

    /// Detaches a member without disposing it.
    ///
    /// Members are matched by allocation. Returns whether the member was found.
    ///
    /// A member removed by the teardown of another member while the store is being disposed is
    /// skipped by that pass.
    pub fn remove<D: ?Sized>(&self, member: &Rc<D>) -> bool {
        let removed = {
            let mut members = self.members.borrow_mut();

            let index = members.iter().position(|held| is_member(held.as_ref(), member));

            index.and_then(|index| {
                if self.disposed.get() {
                    // A pass may be walking the list by index, so the positions must not shift.
                    members.get_mut(index).and_then(Option::take)
                } else {
                    members.remove(index)
                }
            })
        };

        removed.is_some()
    }

    /// Whether the store holds the given member, matched by allocation.
    #[must_use]
    pub fn contains<D: ?Sized>(&self, member: &Rc<D>) -> bool {
        self.members
            .borrow()
            .iter()
            .any(|held| is_member(held.as_ref(), member))
    }

    /// Disposes the members currently held without disposing the store.
    ///
    /// The members are detached before any of them is disposed. Members added while this runs are
    /// kept, and the store remains usable afterwards.
    ///
    /// # Errors
    ///
    /// The first member failure aborts the pass and is returned. The members that were not reached
    /// are released without being disposed.
    pub fn dispose_current(&self) -> Result<()> {
        dispose_safe(&self.members, &self.scratch_pool)
    }

    /// Disposes the store, attempting every member even if some fail.
    ///
    /// Failures go to the error handler slot the store was built with, or to the default error
    /// handler of the current thread.
    pub fn dispose_safely(&self) {
        self.dispose_safely_inner(&|error| self.error_handler.handle(error));
    }

    /// Disposes the store, attempting every member even if some fail and passing each failure to
    /// `on_error`.
    pub fn dispose_safely_with(&self, on_error: impl Fn(&Error)) {
        self.dispose_safely_inner(&|error| error_handler::invoke(&on_error, error));
    }

    fn dispose_safely_inner(&self, on_error: &dyn Fn(&Error)) {
        if self.disposed.replace(true) {
            return;
        }

        for index in 0.. {
            let Some(entry) = self.members.borrow().get(index).cloned() else {
                break;
            };

            let Some(member) = entry else {
                continue;
            };

            if let Err(error) = member.dispose() {
                log::debug!("routing member teardown failure to error handler: {error}");
                on_error(&error);
            }
        }

        self.members.borrow_mut().clear();
    }
}

impl Default for DisposableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Disposable for DisposableStore {
    fn dispose(&self) -> Result<()> {
        if self.disposed.replace(true) {
            return Ok(());
        }

        dispose_unsafe(&self.members)
    }
}

impl DisposableContainer for DisposableStore {
    fn adopt(&self, member: Rc<dyn Disposable>) -> Result<()> {
        if self.disposed.get() {
            log::trace!("store is disposed, disposing new member immediately");
            return member.dispose();
        }

        self.members.borrow_mut().push(Some(member));
        Ok(())
    }
}

fn is_member<D: ?Sized>(held: Option<&Rc<dyn Disposable>>, member: &Rc<D>) -> bool {
    held.is_some_and(|held| ptr::addr_eq(Rc::as_ptr(held), Rc::as_ptr(member)))
}

impl fmt::Debug for DisposableStore {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposableStore")
            .field("len", &self.len())
            .field("disposed", &self.disposed.get())
            .field("error_handler", &self.error_handler)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use mockall::Sequence;
    use static_assertions::assert_not_impl_any;

    use super::*;
    use crate::{DisposableAction, MockDisposable};

    assert_not_impl_any!(DisposableStore: Send, Sync);

    fn failing() -> Rc<DisposableAction> {
        Rc::new(DisposableAction::try_new(|| Err(Error::teardown("boom"))))
    }

    #[test]
    fn disposes_in_insertion_order() {
        let store = DisposableStore::new();
        let mut seq = Sequence::new();

        for _ in 0..3 {
            let mut mock = MockDisposable::new();
            mock.expect_dispose()
                .times(1)
                .in_sequence(&mut seq)
                .returning(|| Ok(()));
            store.add(Rc::new(mock)).unwrap();
        }

        store.dispose().unwrap();
        store.dispose().unwrap();

        assert!(store.is_disposed());
        assert!(store.is_empty());
    }

    #[test]
    fn none_is_skipped() {
        let store = DisposableStore::new();

        store.add(DisposableLike::None).unwrap();
        store.add(None::<Rc<DisposableAction>>).unwrap();

        assert!(store.is_empty());
    }

    #[test]
    fn add_after_dispose_disposes_immediately() {
        let store = DisposableStore::new();
        store.dispose().unwrap();

        let late = store
            .add_one(Rc::new(DisposableAction::new(|| {})))
            .unwrap();

        assert!(late.is_disposed());
        assert!(store.is_empty());
        assert!(!store.remove(&late));
    }

    #[test]
    fn add_all_after_dispose_returns_first_failure() {
        let store = DisposableStore::new();
        store.dispose().unwrap();

        let ok = Rc::new(DisposableAction::new(|| {}));
        let ok_member: Rc<dyn Disposable> = Rc::<DisposableAction>::clone(&ok);
        let failing_member: Rc<dyn Disposable> = failing();
        let members = vec![ok_member, failing_member];

        assert!(store.add_all(members).is_err());
        assert!(ok.is_disposed());
    }

    #[test]
    fn remove_detaches_without_disposing() {
        let store = DisposableStore::new();
        let member = store
            .add_one(Rc::new(DisposableAction::new(|| {})))
            .unwrap();

        assert!(store.contains(&member));
        assert!(store.remove(&member));
        assert!(!store.remove(&member));

        store.dispose().unwrap();
        assert!(!member.is_disposed());
    }

    #[test]
    fn remove_during_dispose_does_not_skip_next_member() {
        let store = Rc::new(DisposableStore::new());
        let next = Rc::new(DisposableAction::new(|| {}));

        let self_removing = Rc::new_cyclic(|this: &std::rc::Weak<DisposableAction>| {
            let store = Rc::clone(&store);
            let this = this.clone();

            DisposableAction::new(move || {
                if let Some(this) = this.upgrade() {
                    assert!(store.remove(&this));
                }
            })
        });

        store.add(Rc::clone(&self_removing)).unwrap();
        store.add(Rc::clone(&next)).unwrap();
        assert_eq!(store.len(), 2);

        store.dispose().unwrap();

        assert!(self_removing.is_disposed());
        assert!(next.is_disposed());
        assert!(store.is_empty());
    }

    #[test]
    fn remove_during_dispose_skips_removed_member() {
        let store = Rc::new(DisposableStore::new());
        let later = Rc::new(DisposableAction::new(|| {}));

        store
            .add_fn({
                let store = Rc::clone(&store);
                let later = Rc::clone(&later);
                move || assert!(store.remove(&later))
            })
            .unwrap();
        store.add(Rc::clone(&later)).unwrap();

        store.dispose().unwrap();

        assert!(!later.is_disposed());
    }

    #[test]
    fn dispose_current_keeps_store_usable() {
        let store = DisposableStore::new();
        let first = store
            .add_one(Rc::new(DisposableAction::new(|| {})))
            .unwrap();

        store.dispose_current().unwrap();

        assert!(first.is_disposed());
        assert!(!store.is_disposed());

        let second = store
            .add_one(Rc::new(DisposableAction::new(|| {})))
            .unwrap();
        assert!(!second.is_disposed());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn dispose_fails_fast() {
        let store = DisposableStore::new();
        let after = Rc::new(DisposableAction::new(|| {}));

        store.add(failing()).unwrap();
        store.add(Rc::clone(&after)).unwrap();

        assert!(matches!(store.dispose(), Err(Error::Teardown(_))));
        assert!(!after.is_disposed());
        assert!(store.is_disposed());
    }

    #[test]
    fn dispose_safely_attempts_every_member() {
        let store = DisposableStore::new();
        let after = Rc::new(DisposableAction::new(|| {}));
        let failures = Rc::new(Cell::new(0_usize));

        store.add(failing()).unwrap();
        store.add(Rc::clone(&after)).unwrap();
        store.add(failing()).unwrap();

        store.dispose_safely_with({
            let failures = Rc::clone(&failures);
            move |_| failures.set(failures.get() + 1)
        });

        assert_eq!(failures.get(), 2);
        assert!(after.is_disposed());
        assert!(store.is_disposed());
        assert!(store.is_empty());
    }

    #[test]
    fn dispose_safely_uses_default_handler() {
        let failures = Rc::new(Cell::new(0_usize));

        crate::set_default_error_handler({
            let failures = Rc::clone(&failures);
            move |_| failures.set(failures.get() + 1)
        });

        let store = DisposableStore::new();
        store.add(failing()).unwrap();
        store.dispose_safely();

        crate::reset_default_error_handler();

        assert_eq!(failures.get(), 1);
    }

    #[test]
    fn dispose_safely_uses_injected_slot() {
        let failures = Rc::new(Cell::new(0_usize));
        let slot = Rc::new(ErrorHandlerSlot::new());

        let store = DisposableStore::builder()
            .error_handler_slot(Rc::clone(&slot))
            .build();
        store.add(failing()).unwrap();

        // The slot is configured after the store was built.
        slot.set({
            let failures = Rc::clone(&failures);
            move |_| failures.set(failures.get() + 1)
        });
        store.dispose_safely();
        assert_eq!(failures.get(), 1);

        let other = DisposableStore::builder()
            .error_handler_slot(Rc::clone(&slot))
            .build();
        other.add(failing()).unwrap();

        slot.reset();
        other.dispose_safely();
        assert_eq!(failures.get(), 1);
    }

    #[test]
    fn ensure_not_disposed() {
        let store = DisposableStore::new();
        store.ensure_not_disposed().unwrap();

        store.dispose().unwrap();
        assert!(matches!(
            store.ensure_not_disposed(),
            Err(Error::AlreadyDisposed)
        ));
    }

    #[test]
    fn nested_stores() {
        let outer = DisposableStore::new();
        let inner = outer.add_one(Rc::new(DisposableStore::new())).unwrap();
        let leaf = inner
            .add_one(Rc::new(DisposableAction::new(|| {})))
            .unwrap();

        outer.dispose().unwrap();

        assert!(inner.is_disposed());
        assert!(leaf.is_disposed());
    }
}
