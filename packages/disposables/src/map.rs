use std::borrow::Borrow;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::Hash;
use std::mem;
use std::rc::Rc;

use foldhash::{HashMap, HashMapExt};

use crate::{Disposable, DisposableLike, Error, Result, to_disposable};

/// Holds one disposable per key, disposing the previous value when a key is overwritten.
///
/// # Example
///
/// ```rust
/// use std::rc::Rc;
///
/// use disposables::{Disposable, DisposableAction, DisposableMap};
///
/// let watchers = DisposableMap::new();
///
/// let old = Rc::new(DisposableAction::new(|| {}));
/// let new = Rc::new(DisposableAction::new(|| {}));
///
/// watchers.set("config.toml", Rc::clone(&old))?;
/// watchers.set("config.toml", Rc::clone(&new))?;
/// assert!(old.is_disposed());
/// assert!(!new.is_disposed());
///
/// watchers.dispose()?;
/// assert!(new.is_disposed());
/// # Ok::<(), disposables::Error>(())
/// ```
pub struct DisposableMap<K> {
    // We use foldhash because keys are typically short names or small integers.
    values: RefCell<HashMap<K, Rc<dyn Disposable>>>,
    disposed: Cell<bool>,
}

impl<K: Eq + Hash> DisposableMap<K> {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: RefCell::new(HashMap::new()),
            disposed: Cell::new(false),
        }
    }

    /// Whether the map has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Fails with [`Error::AlreadyDisposed`] if the map has been disposed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyDisposed`] if the map has been disposed.
    pub fn ensure_not_disposed(&self) -> Result<()> {
        if self.disposed.get() {
            return Err(Error::AlreadyDisposed);
        }

        Ok(())
    }

    /// Number of keys with a value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.borrow().len()
    }

    /// Whether no key has a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.borrow().is_empty()
    }

    /// Whether `key` has a value.
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.values.borrow().contains_key(key)
    }

    /// The value for `key`, if any. A disposed map holds no values.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<Rc<dyn Disposable>>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.values.borrow().get(key).cloned()
    }

    /// Stores a value for `key` and disposes the value it replaces.
    ///
    /// Setting [`DisposableLike::None`] removes and disposes the current value. If the map has been
    /// disposed, the new value is disposed immediately instead.
    ///
    /// # Errors
    ///
    /// Returns the teardown failure of whichever value was disposed.
    pub fn set(&self, key: K, like: impl Into<DisposableLike>) -> Result<()> {
        let like = like.into();

        if self.disposed.get() {
            log::trace!("map is disposed, disposing new value immediately");
            return to_disposable(like).dispose();
        }

        let previous = if like.is_none() {
            self.values.borrow_mut().remove(&key)
        } else {
            self.values.borrow_mut().insert(key, to_disposable(like))
        };

        match previous {
            Some(previous) => previous.dispose(),
            None => Ok(()),
        }
    }

    /// Removes and disposes the value for `key`. Returns whether there was one.
    ///
    /// # Errors
    ///
    /// Returns the teardown failure of the removed value.
    pub fn delete<Q>(&self, key: &Q) -> Result<bool>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let Some(removed) = self.extract(key) else {
            return Ok(false);
        };

        removed.dispose()?;
        Ok(true)
    }

    /// Removes the value for `key` and hands it to the caller without disposing it.
    #[must_use = "the extracted value is no longer disposed by the map"]
    pub fn extract<Q>(&self, key: &Q) -> Option<Rc<dyn Disposable>>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.values.borrow_mut().remove(key)
    }
}

impl<K: Eq + Hash> Default for DisposableMap<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash> Disposable for DisposableMap<K> {
    /// Disposes every value, in no particular order.
    ///
    /// The first failure aborts the pass and is returned. The values that were not reached are
    /// released without being disposed.
    fn dispose(&self) -> Result<()> {
        if self.disposed.replace(true) {
            return Ok(());
        }

        // The borrow ends before any value runs, as teardown may call back into the map.
        let values = mem::take(&mut *self.values.borrow_mut());

        for value in values.into_values() {
            value.dispose()?;
        }

        Ok(())
    }
}

impl<K> fmt::Debug for DisposableMap<K> {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposableMap")
            .field("len", &self.values.borrow().len())
            .field("disposed", &self.disposed.get())
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::ptr;

    use static_assertions::assert_not_impl_any;

    use super::*;
    use crate::DisposableAction;

    assert_not_impl_any!(DisposableMap<String>: Send, Sync);

    fn action() -> Rc<DisposableAction> {
        Rc::new(DisposableAction::new(|| {}))
    }

    #[test]
    fn overwrite_disposes_previous() {
        let map = DisposableMap::new();
        let first = action();
        let second = action();

        map.set("k", Rc::clone(&first)).unwrap();
        map.set("k", Rc::clone(&second)).unwrap();

        assert!(first.is_disposed());
        assert!(!second.is_disposed());

        let held = map.get("k").unwrap();
        assert!(ptr::addr_eq(Rc::as_ptr(&held), Rc::as_ptr(&second)));
    }

    #[test]
    fn borrowed_key_lookup() {
        let map: DisposableMap<String> = DisposableMap::new();
        map.set("watcher".to_owned(), action()).unwrap();

        assert!(map.contains_key("watcher"));
        assert!(map.get("watcher").is_some());
        assert!(map.get("other").is_none());
    }

    #[test]
    fn delete_disposes() {
        let map = DisposableMap::new();
        let value = action();

        map.set(1, Rc::clone(&value)).unwrap();

        assert!(map.delete(&1).unwrap());
        assert!(value.is_disposed());
        assert!(!map.delete(&1).unwrap());
        assert!(map.is_empty());
    }

    #[test]
    fn extract_does_not_dispose() {
        let map = DisposableMap::new();
        let value = action();

        map.set(1, Rc::clone(&value)).unwrap();
        let extracted = map.extract(&1).unwrap();

        assert!(!value.is_disposed());
        assert!(ptr::addr_eq(Rc::as_ptr(&extracted), Rc::as_ptr(&value)));

        map.dispose().unwrap();
        assert!(!value.is_disposed());
    }

    #[test]
    fn set_none_removes_and_disposes() {
        let map = DisposableMap::new();
        let value = action();

        map.set(1, Rc::clone(&value)).unwrap();
        map.set(1, DisposableLike::None).unwrap();

        assert!(value.is_disposed());
        assert!(!map.contains_key(&1));
    }

    #[test]
    fn dispose_is_terminal() {
        let map = DisposableMap::new();
        let values: Vec<_> = (0..3).map(|_| action()).collect();

        for (key, value) in values.iter().enumerate() {
            map.set(key, Rc::clone(value)).unwrap();
        }

        map.dispose().unwrap();
        map.dispose().unwrap();

        assert!(values.iter().all(|value| value.is_disposed()));
        assert!(map.is_empty());
        assert!(map.get(&0).is_none());

        let late = action();
        map.set(7, Rc::clone(&late)).unwrap();
        assert!(late.is_disposed());
        assert!(!map.contains_key(&7));

        assert!(matches!(
            map.ensure_not_disposed(),
            Err(Error::AlreadyDisposed)
        ));
    }

    #[test]
    fn teardown_may_set_during_dispose() {
        let map = Rc::new(DisposableMap::new());
        let late = action();

        let value = Rc::new(DisposableAction::try_new({
            let map = Rc::clone(&map);
            let late = Rc::clone(&late);
            move || map.set(2, late)
        }));

        map.set(1, value).unwrap();
        map.dispose().unwrap();

        assert!(late.is_disposed());
    }
}
