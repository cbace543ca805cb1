use std::cell::{Cell, RefCell};
use std::fmt;
use std::ptr;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::{self, LocalBoxFuture};

use crate::{
    AsyncDisposable, AsyncDisposableStoreBuilder, AsyncStoreMember, DisposableLike, Error,
    ErrorHandlerSlot, Result, ScratchPool, dispose_safe_async, dispose_unsafe_async, error_handler,
    to_async_disposable,
};

/// An ordered collection of asynchronous disposables that are torn down together.
///
/// This is the asynchronous counterpart of [`DisposableStore`][crate::DisposableStore]. Members
/// are disposed one at a time in insertion order, each teardown being awaited before the next one
/// starts, so disposing a store takes as long as the teardowns of all its members combined.
///
/// Adding is synchronous: a member is registered by the time an `add*` method returns. Once the
/// store has been disposed, additions are torn down instead of being stored. That teardown starts
/// before the `add*` method returns and the returned future drives it to completion, so a
/// teardown that finishes without suspending has run even if the future is dropped.
///
/// # Example
///
/// ```rust
/// use std::rc::Rc;
///
/// use disposables::{AsyncDisposableAction, AsyncDisposableStore};
/// use futures::executor::block_on;
///
/// let store = AsyncDisposableStore::new();
///
/// let connection = Rc::new(AsyncDisposableAction::new(|| async {
///     // Flush and close the connection.
///     Ok(())
/// }));
///
/// block_on(async {
///     store.add_one(Rc::clone(&connection)).await?;
///     store.dispose().await
/// })?;
///
/// assert!(connection.is_disposed());
/// # Ok::<(), disposables::Error>(())
/// ```
pub struct AsyncDisposableStore {
    members: RefCell<Vec<AsyncStoreMember>>,
    disposed: Cell<bool>,
    scratch_pool: ScratchPool<AsyncStoreMember>,
    error_handler: Rc<ErrorHandlerSlot>,
}

impl AsyncDisposableStore {
    /// Creates an empty store with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts building a store with a custom configuration.
    pub fn builder() -> AsyncDisposableStoreBuilder {
        AsyncDisposableStoreBuilder::new()
    }

    pub(crate) fn new_inner(
        scratch_pool: ScratchPool<AsyncStoreMember>,
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
    /// [`DisposableLike::None`] is skipped. If the store has been disposed, disposal of the value
    /// starts immediately and the returned future resolves to its outcome. Otherwise the future
    /// resolves immediately.
    #[must_use = "asynchronous teardown of late additions only completes when awaited"]
    pub fn add(&self, like: impl Into<DisposableLike>) -> LocalBoxFuture<'static, Result<()>> {
        let like = like.into();

        if like.is_none() {
            return future::ready(Ok(())).boxed_local();
        }

        self.add_member(to_async_disposable(like))
    }

    /// Appends a teardown closure to the store.
    ///
    /// If the store has been disposed, the closure runs before this returns.
    #[must_use = "asynchronous teardown of late additions only completes when awaited"]
    pub fn add_fn(&self, action: impl FnOnce() + 'static) -> LocalBoxFuture<'static, Result<()>> {
        self.add(DisposableLike::action(action))
    }

    /// Appends every value, in iteration order.
    ///
    /// If the store has been disposed, disposal of the values starts immediately. They are disposed
    /// in order and the returned future resolves to the first failure.
    #[must_use = "asynchronous teardown of late additions only completes when awaited"]
    pub fn add_all<I>(&self, items: I) -> LocalBoxFuture<'static, Result<()>>
    where
        I: IntoIterator,
        I::Item: Into<DisposableLike>,
    {
        let rejected: Vec<_> = items
            .into_iter()
            .map(Into::into)
            .filter(|like: &DisposableLike| !like.is_none())
            .map(to_async_disposable)
            .filter_map(|member| self.register(member))
            .collect();

        if rejected.is_empty() {
            return future::ready(Ok(())).boxed_local();
        }

        start(
            async move {
                for member in rejected {
                    member.dispose_async().await?;
                }

                Ok(())
            }
            .boxed_local(),
        )
    }

    /// Appends an asynchronous disposable. The returned future resolves to the same allocation.
    ///
    /// If the store has been disposed, disposal of the member starts immediately.
    #[must_use = "asynchronous teardown of late additions only completes when awaited"]
    pub fn add_one<D: AsyncDisposable + 'static>(
        &self,
        member: Rc<D>,
    ) -> LocalBoxFuture<'static, Result<Rc<D>>> {
        let erased: Rc<dyn AsyncDisposable> = Rc::<D>::clone(&member);
        let registered = self.add_member(erased);

        async move {
            registered.await?;
            Ok(member)
        }
        .boxed_local()
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

            let index = members.iter().position(|held| {
                held.as_ref()
                    .is_some_and(|held| ptr::addr_eq(Rc::as_ptr(held), Rc::as_ptr(member)))
            });

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

    /// Disposes the store, awaiting each member in insertion order.
    ///
    /// Members added by the teardown of another member during this pass are disposed as well.
    /// Calling this again, including while the first call is still running, resolves immediately.
    ///
    /// # Errors
    ///
    /// The first member failure aborts the pass and is returned.
    pub async fn dispose(&self) -> Result<()> {
        if self.disposed.replace(true) {
            return Ok(());
        }

        dispose_unsafe_async(&self.members).await
    }

    /// Disposes the members currently held without disposing the store.
    ///
    /// # Errors
    ///
    /// The first member failure aborts the pass and is returned.
    pub async fn dispose_current(&self) -> Result<()> {
        dispose_safe_async(&self.members, &self.scratch_pool).await
    }

    /// Disposes the store, attempting every member even if some fail.
    ///
    /// Failures go to the error handler slot the store was built with, or to the default error
    /// handler of the current thread.
    pub async fn dispose_safely(&self) {
        self.dispose_safely_inner(&|error| self.error_handler.handle(error)).await;
    }

    /// Disposes the store, attempting every member even if some fail and passing each failure to
    /// `on_error`.
    pub async fn dispose_safely_with(&self, on_error: impl Fn(&Error)) {
        self.dispose_safely_inner(&|error| error_handler::invoke(&on_error, error)).await;
    }

    async fn dispose_safely_inner(&self, on_error: &dyn Fn(&Error)) {
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

            if let Err(error) = member.dispose_async().await {
                log::debug!("routing member teardown failure to error handler: {error}");
                on_error(&error);
            }
        }

        self.members.borrow_mut().clear();
    }

    fn add_member(&self, member: Rc<dyn AsyncDisposable>) -> LocalBoxFuture<'static, Result<()>> {
        match self.register(member) {
            None => future::ready(Ok(())).boxed_local(),
            Some(member) => start(async move { member.dispose_async().await }.boxed_local()),
        }
    }

    /// Stores the member, or hands it back if the store has been disposed.
    fn register(&self, member: Rc<dyn AsyncDisposable>) -> Option<Rc<dyn AsyncDisposable>> {
        if self.disposed.get() {
            log::trace!("store is disposed, disposing new member immediately");
            return Some(member);
        }

        self.members.borrow_mut().push(Some(member));
        None
    }
}

/// Polls a teardown once, so that it makes progress even if the caller never awaits it.
///
/// A teardown that completes without suspending is finished by the time this returns.
fn start(mut teardown: LocalBoxFuture<'static, Result<()>>) -> LocalBoxFuture<'static, Result<()>> {
    match teardown.as_mut().now_or_never() {
        Some(result) => future::ready(result).boxed_local(),
        None => teardown,
    }
}

impl Default for AsyncDisposableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncDisposable for AsyncDisposableStore {
    fn dispose_async(&self) -> LocalBoxFuture<'_, Result<()>> {
        self.dispose().boxed_local()
    }
}

impl fmt::Debug for AsyncDisposableStore {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncDisposableStore")
            .field("len", &self.len())
            .field("disposed", &self.disposed.get())
            .field("error_handler", &self.error_handler)
            .finish_non_exhaustive()
    }
}
