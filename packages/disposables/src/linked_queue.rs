use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::ptr::NonNull;

struct Node<T> {
    value: T,
    next: Option<NonNull<Node<T>>>,
}

/// A singly linked first-in-first-out queue.
///
/// Enqueueing at the tail and dequeueing at the head are both O(1) and never move existing items.
///
/// # Example
///
/// ```rust
/// use disposables::LinkedQueue;
///
/// let mut queue = LinkedQueue::new();
/// queue.enqueue(1);
/// queue.enqueue(2);
///
/// assert_eq!(queue.peek(), Some(&1));
/// assert_eq!(queue.dequeue(), Some(1));
/// assert_eq!(queue.dequeue(), Some(2));
/// assert_eq!(queue.dequeue(), None);
/// ```
pub struct LinkedQueue<T> {
    /// Oldest node. Owns the whole chain; every node is a leaked `Box` that is reclaimed when it
    /// is dequeued or when the queue is cleared.
    head: Option<NonNull<Node<T>>>,

    /// Newest node. `None` if and only if `head` is `None`.
    tail: Option<NonNull<Node<T>>>,

    len: usize,

    // We own the nodes, for the benefit of the drop checker and auto traits.
    _owns: PhantomData<Box<Node<T>>>,
}

impl<T> LinkedQueue<T> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
            _owns: PhantomData,
        }
    }

    /// Number of items in the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the queue holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends an item at the tail of the queue.
    pub fn enqueue(&mut self, value: T) {
        let node = NonNull::from(Box::leak(Box::new(Node { value, next: None })));

        match self.tail {
            // SAFETY: `tail` points to a live node owned by this queue and we hold `&mut self`,
            // so no other reference to the node exists.
            Some(tail) => unsafe { (*tail.as_ptr()).next = Some(node) },
            None => self.head = Some(node),
        }

        self.tail = Some(node);
        self.len = self
            .len
            .checked_add(1)
            .expect("queue length overflows usize - this indicates an unrealistic scenario");
    }

    /// Removes and returns the item at the head of the queue, if any.
    pub fn dequeue(&mut self) -> Option<T> {
        let head = self.head?;

        // SAFETY: `head` was created by `Box::leak` in `enqueue` and is unlinked from the queue
        // right here, so ownership returns to the `Box` exactly once.
        let node = unsafe { Box::from_raw(head.as_ptr()) };

        self.head = node.next;

        if self.head.is_none() {
            self.tail = None;
        }

        self.len = self
            .len
            .checked_sub(1)
            .expect("queue length is tracked for every node we own");

        Some(node.value)
    }

    /// Returns a reference to the item at the head of the queue, if any.
    #[must_use]
    pub fn peek(&self) -> Option<&T> {
        // SAFETY: The node is live for as long as the queue is borrowed because removing it
        // requires `&mut self`.
        self.head.map(|head| unsafe { &(*head.as_ptr()).value })
    }

    /// Removes and drops every item in the queue.
    pub fn clear(&mut self) {
        while self.dequeue().is_some() {}
    }

    /// Iterates over the items in the queue from head to tail.
    pub fn iter(&self) -> QueueIter<'_, T> {
        QueueIter {
            next: self.head,
            remaining: self.len,
            _queue: PhantomData,
        }
    }
}

// SAFETY: The queue exclusively owns its nodes, the same as a chain of `Box<Node<T>>` would.
unsafe impl<T: Send> Send for LinkedQueue<T> {}

// SAFETY: Shared access only ever hands out `&T`, the same as a chain of `Box<Node<T>>` would.
unsafe impl<T: Sync> Sync for LinkedQueue<T> {}

impl<T> Default for LinkedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LinkedQueue<T> {
    fn drop(&mut self) {
        // Iterative, so long queues do not recurse through `Drop` of nested boxes.
        self.clear();
    }
}

impl<T: fmt::Debug> fmt::Debug for LinkedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a, T> IntoIterator for &'a LinkedQueue<T> {
    type Item = &'a T;
    type IntoIter = QueueIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the items of a [`LinkedQueue`], from head to tail.
#[derive(Debug)]
pub struct QueueIter<'a, T> {
    next: Option<NonNull<Node<T>>>,
    remaining: usize,
    _queue: PhantomData<&'a LinkedQueue<T>>,
}

impl<'a, T> Iterator for QueueIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;

        // SAFETY: The iterator borrows the queue for 'a, so every node reachable from `head`
        // stays alive and unmodified for 'a.
        let node: &'a Node<T> = unsafe { &*current.as_ptr() };

        self.next = node.next;
        self.remaining = self.remaining.saturating_sub(1);

        Some(&node.value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for QueueIter<'_, T> {}

impl<T> FusedIterator for QueueIter<'_, T> {}
