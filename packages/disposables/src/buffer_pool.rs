use crate::{LinkedQueue, QueueIter};

/// A bounded first-in-first-out cache of reusable buffers.
///
/// Callers [`lift()`][Self::lift] a cached buffer when they need scratch space, falling back to a
/// fresh allocation when the pool is empty, and [`throw()`][Self::throw] the buffer back when they
/// are done with it. The pool never holds more than [`capacity()`][Self::capacity] buffers: when it
/// is full, returning a buffer evicts the oldest cached one.
///
/// The capacity may be changed at runtime. A caller that observes evictions may grow the pool to
/// bound the churn, see [`set_capacity()`][Self::set_capacity].
///
/// # Example
///
/// ```rust
/// use disposables::BufferPool;
///
/// let mut pool = BufferPool::new(2);
///
/// assert_eq!(pool.throw(1), None);
/// assert_eq!(pool.throw(2), None);
/// assert_eq!(pool.throw(3), Some(1));
///
/// assert_eq!(pool.lift(), Some(2));
/// assert_eq!(pool.lift(), Some(3));
/// assert_eq!(pool.lift(), None);
/// ```
#[derive(Debug)]
pub struct BufferPool<B> {
    buffers: LinkedQueue<B>,
    capacity: usize,
}

impl<B> BufferPool<B> {
    /// Creates an empty pool that caches at most `capacity` buffers.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: LinkedQueue::new(),
            capacity,
        }
    }

    /// Maximum number of buffers the pool caches.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Changes the maximum number of buffers the pool caches.
    ///
    /// When shrinking below the number of cached buffers, the oldest buffers are dropped.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;

        while self.buffers.len() > self.capacity {
            drop(self.buffers.dequeue());
        }
    }

    /// Number of buffers currently cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether the pool holds no cached buffers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Takes the oldest cached buffer out of the pool.
    ///
    /// Returns `None` if the pool is empty, in which case the caller should allocate a fresh
    /// buffer.
    pub fn lift(&mut self) -> Option<B> {
        self.buffers.dequeue()
    }

    /// Returns a buffer to the pool.
    ///
    /// If the pool is full, the oldest cached buffer is evicted and handed back to the caller;
    /// otherwise returns `None`. A pool with zero capacity hands back the buffer it was given.
    #[must_use = "an evicted buffer indicates the pool is full, which callers may want to react to"]
    pub fn throw(&mut self, buffer: B) -> Option<B> {
        if self.buffers.len() < self.capacity {
            self.buffers.enqueue(buffer);
            return None;
        }

        if self.capacity == 0 {
            return Some(buffer);
        }

        let evicted = self.buffers.dequeue();
        self.buffers.enqueue(buffer);
        evicted
    }

    /// Drops every cached buffer.
    pub fn clear(&mut self) {
        self.buffers.clear();
    }

    /// Iterates over the cached buffers from oldest to newest.
    pub fn iter(&self) -> QueueIter<'_, B> {
        self.buffers.iter()
    }
}
