use std::fmt;
use std::rc::Rc;

use crate::{
    AsyncDisposableStore, AsyncStoreMember, DisposableStore, Error, ErrorHandlerSlot, ScratchPool,
    StoreMember, default_error_handler_slot, shared_async_scratch_pool, shared_scratch_pool,
};

/// Builder for creating an instance of [`DisposableStore`].
///
/// You only need to use this builder if you want to customize the store configuration.
/// The default configuration used by [`DisposableStore::new()`][1] is sufficient for most use
/// cases: it shares the scratch pool of the current thread and reports teardown failures on the
/// safe disposal path to the default error handler of the current thread.
///
/// # Examples
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// use disposables::{BufferPool, DisposableStore};
///
/// let store = DisposableStore::builder()
///     .scratch_pool(Rc::new(RefCell::new(BufferPool::new(16))))
///     .error_handler(|error| eprintln!("teardown failed: {error}"))
///     .build();
/// ```
///
/// [1]: DisposableStore::new
#[must_use]
pub struct DisposableStoreBuilder {
    scratch_pool: Option<ScratchPool<StoreMember>>,
    error_handler: Option<Rc<ErrorHandlerSlot>>,
}

impl fmt::Debug for DisposableStoreBuilder {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposableStoreBuilder")
            .field("custom_scratch_pool", &self.scratch_pool.is_some())
            .field("custom_error_handler", &self.error_handler.is_some())
            .finish()
    }
}

impl DisposableStoreBuilder {
    pub(crate) fn new() -> Self {
        Self {
            scratch_pool: None,
            error_handler: None,
        }
    }

    /// Sets the pool that lends scratch buffers to
    /// [`dispose_current()`][DisposableStore::dispose_current].
    ///
    /// Stores that share a pool share its cached buffers.
    pub fn scratch_pool(mut self, pool: ScratchPool<StoreMember>) -> Self {
        self.scratch_pool = Some(pool);
        self
    }

    /// Sets the handler that receives teardown failures on the safe disposal path, instead of the
    /// default error handler of the current thread.
    pub fn error_handler(self, handler: impl Fn(&Error) + 'static) -> Self {
        let slot = ErrorHandlerSlot::new();
        slot.set(handler);
        self.error_handler_slot(Rc::new(slot))
    }

    /// Sets the slot whose handler receives teardown failures on the safe disposal path.
    ///
    /// The handler in the slot may be set and reset at any time, including after the store was
    /// built. Stores that share a slot share its handler.
    pub fn error_handler_slot(mut self, slot: Rc<ErrorHandlerSlot>) -> Self {
        self.error_handler = Some(slot);
        self
    }

    /// Builds the store with the specified configuration.
    #[must_use]
    pub fn build(self) -> DisposableStore {
        DisposableStore::new_inner(
            self.scratch_pool.unwrap_or_else(shared_scratch_pool),
            self.error_handler.unwrap_or_else(default_error_handler_slot),
        )
    }
}

/// Builder for creating an instance of [`AsyncDisposableStore`].
///
/// The default configuration used by [`AsyncDisposableStore::new()`][1] shares the asynchronous
/// scratch pool of the current thread and reports teardown failures on the safe disposal path to
/// the default error handler of the current thread.
///
/// # Examples
///
/// ```
/// use disposables::AsyncDisposableStore;
///
/// let store = AsyncDisposableStore::builder()
///     .error_handler(|error| eprintln!("teardown failed: {error}"))
///     .build();
/// ```
///
/// [1]: AsyncDisposableStore::new
#[must_use]
pub struct AsyncDisposableStoreBuilder {
    scratch_pool: Option<ScratchPool<AsyncStoreMember>>,
    error_handler: Option<Rc<ErrorHandlerSlot>>,
}

impl fmt::Debug for AsyncDisposableStoreBuilder {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncDisposableStoreBuilder")
            .field("custom_scratch_pool", &self.scratch_pool.is_some())
            .field("custom_error_handler", &self.error_handler.is_some())
            .finish()
    }
}

impl AsyncDisposableStoreBuilder {
    pub(crate) fn new() -> Self {
        Self {
            scratch_pool: None,
            error_handler: None,
        }
    }

    /// Sets the pool that lends scratch buffers to
    /// [`dispose_current()`][AsyncDisposableStore::dispose_current].
    pub fn scratch_pool(mut self, pool: ScratchPool<AsyncStoreMember>) -> Self {
        self.scratch_pool = Some(pool);
        self
    }

    /// Sets the handler that receives teardown failures on the safe disposal path, instead of the
    /// default error handler of the current thread.
    pub fn error_handler(self, handler: impl Fn(&Error) + 'static) -> Self {
        let slot = ErrorHandlerSlot::new();
        slot.set(handler);
        self.error_handler_slot(Rc::new(slot))
    }

    /// Sets the slot whose handler receives teardown failures on the safe disposal path.
    ///
    /// The handler in the slot may be set and reset at any time, including after the store was
    /// built. Stores that share a slot share its handler.
    pub fn error_handler_slot(mut self, slot: Rc<ErrorHandlerSlot>) -> Self {
        self.error_handler = Some(slot);
        self
    }

    /// Builds the store with the specified configuration.
    #[must_use]
    pub fn build(self) -> AsyncDisposableStore {
        AsyncDisposableStore::new_inner(
            self.scratch_pool.unwrap_or_else(shared_async_scratch_pool),
            self.error_handler.unwrap_or_else(default_error_handler_slot),
        )
    }
}
