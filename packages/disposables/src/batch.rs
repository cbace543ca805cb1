//! Bulk disposal of a mutable, ordered list of members.
//!
//! Two policies exist, differing in how they treat members that are added to the same list by
//! the teardown of another member while the pass is running:
//!
//! * [`dispose_unsafe()`] iterates the live list, re-reading its length after every member, so
//!   late additions are disposed in the same pass. The list is emptied at the end.
//! * [`dispose_safe()`] first moves the current members into a scratch buffer, leaving the live
//!   list empty, and only then disposes them. Late additions land in the live list and survive
//!   until the next pass.
//!
//! Terminal disposal uses the unsafe policy because the owner will never hold members again,
//! whereas clearing a still-usable owner uses the safe policy so that it only tears down the
//! generation of members that existed when it was called.

use std::cell::RefCell;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::{self, LocalBoxFuture};

use crate::{AsyncDisposable, BufferPool, Disposable, Result};

/// Number of scratch buffers cached by a newly created shared scratch pool.
pub const DEFAULT_SCRATCH_POOL_CAPACITY: usize = 4;

/// Upper bound for the adaptive growth of a scratch pool.
pub const MAX_SCRATCH_POOL_CAPACITY: usize = 64;

/// A pool of scratch buffers for [`dispose_safe()`] and [`dispose_safe_async()`].
pub type ScratchPool<M> = Rc<RefCell<BufferPool<Vec<M>>>>;

/// An entry in the member list of a [`DisposableStore`][crate::DisposableStore].
///
/// A member detached while the store is being disposed leaves an empty entry behind, so that the
/// running pass does not skip the member after it.
pub type StoreMember = Option<Rc<dyn Disposable>>;

/// An entry in the member list of an [`AsyncDisposableStore`][crate::AsyncDisposableStore].
pub type AsyncStoreMember = Option<Rc<dyn AsyncDisposable>>;

thread_local! {
    static SHARED_SCRATCH_POOL: ScratchPool<StoreMember> =
        Rc::new(RefCell::new(BufferPool::new(DEFAULT_SCRATCH_POOL_CAPACITY)));

    static SHARED_ASYNC_SCRATCH_POOL: ScratchPool<AsyncStoreMember> =
        Rc::new(RefCell::new(BufferPool::new(DEFAULT_SCRATCH_POOL_CAPACITY)));
}

/// Returns the scratch pool shared by every [`DisposableStore`][crate::DisposableStore] on the
/// current thread that was not built with its own pool.
#[must_use]
pub fn shared_scratch_pool() -> ScratchPool<StoreMember> {
    SHARED_SCRATCH_POOL.with(Rc::clone)
}

/// Returns the scratch pool shared by every
/// [`AsyncDisposableStore`][crate::AsyncDisposableStore] on the current thread that was not
/// built with its own pool.
#[must_use]
pub fn shared_async_scratch_pool() -> ScratchPool<AsyncStoreMember> {
    SHARED_ASYNC_SCRATCH_POOL.with(Rc::clone)
}

/// A member of a list that can be disposed by [`dispose_unsafe()`] and [`dispose_safe()`].
pub trait BatchMember {
    /// Disposes the member.
    ///
    /// # Errors
    ///
    /// Returns the failure of the member's teardown logic.
    fn dispose_member(&self) -> Result<()>;
}

impl<T: Disposable + ?Sized> BatchMember for Rc<T> {
    fn dispose_member(&self) -> Result<()> {
        self.dispose()
    }
}

/// Empty slots are skipped.
impl<M: BatchMember> BatchMember for Option<M> {
    fn dispose_member(&self) -> Result<()> {
        match self {
            Some(member) => member.dispose_member(),
            None => Ok(()),
        }
    }
}

/// A member of a list that can be disposed by [`dispose_unsafe_async()`] and
/// [`dispose_safe_async()`].
pub trait AsyncBatchMember {
    /// Disposes the member.
    ///
    /// # Errors
    ///
    /// The future resolves to the failure of the member's teardown logic.
    fn dispose_member_async(&self) -> LocalBoxFuture<'_, Result<()>>;
}

impl<T: AsyncDisposable + ?Sized> AsyncBatchMember for Rc<T> {
    fn dispose_member_async(&self) -> LocalBoxFuture<'_, Result<()>> {
        self.dispose_async()
    }
}

/// Empty slots are skipped.
impl<M: AsyncBatchMember> AsyncBatchMember for Option<M> {
    fn dispose_member_async(&self) -> LocalBoxFuture<'_, Result<()>> {
        match self {
            Some(member) => member.dispose_member_async(),
            None => future::ready(Ok(())).boxed_local(),
        }
    }
}

/// Disposes every member of `list` in order, including members appended while the pass is
/// running, then empties the list.
///
/// The length of the list is re-read after every member, so a member whose teardown appends to
/// `list` causes the appended member to be disposed in the same pass.
///
/// # Errors
///
/// The first member failure aborts the pass and is returned. Members that were not reached stay in
/// the list.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// use disposables::{Disposable, DisposableAction, dispose_unsafe};
///
/// let first: Rc<dyn Disposable> = Rc::new(DisposableAction::new(|| println!("first")));
/// let second: Rc<dyn Disposable> = Rc::new(DisposableAction::new(|| println!("second")));
///
/// let list = RefCell::new(vec![first, second]);
///
/// dispose_unsafe(&list).unwrap();
/// assert!(list.borrow().is_empty());
/// ```
pub fn dispose_unsafe<M: BatchMember + Clone>(list: &RefCell<Vec<M>>) -> Result<()> {
    for index in 0.. {
        // The borrow ends before the member runs, as its teardown may append to the list.
        let Some(member) = list.borrow().get(index).cloned() else {
            break;
        };

        member.dispose_member()?;
    }

    list.borrow_mut().clear();
    Ok(())
}

/// Disposes the members that `list` holds at the time of the call, in order.
///
/// The members are moved into a scratch buffer borrowed from `pool` and the list is emptied before
/// any member is disposed. Members appended to `list` while the pass is running are not disposed
/// by this pass. The scratch buffer is cleared, releasing its references, and returned to the pool
/// afterwards, even if a member fails.
///
/// # Errors
///
/// The first member failure aborts the pass and is returned. Members that were not reached are
/// released without being disposed.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// use disposables::{Disposable, DisposableAction, dispose_safe, shared_scratch_pool};
///
/// let member: Rc<dyn Disposable> = Rc::new(DisposableAction::new(|| println!("gone")));
/// let list = RefCell::new(vec![Some(member)]);
///
/// dispose_safe(&list, &shared_scratch_pool()).unwrap();
/// assert!(list.borrow().is_empty());
/// ```
pub fn dispose_safe<M: BatchMember>(
    list: &RefCell<Vec<M>>,
    pool: &RefCell<BufferPool<Vec<M>>>,
) -> Result<()> {
    let scratch = take_generation(list, pool);

    for member in scratch.iter() {
        member.dispose_member()?;
    }

    Ok(())
}

/// Asynchronous counterpart of [`dispose_unsafe()`].
///
/// Each member's teardown is awaited before the next one starts.
///
/// # Errors
///
/// The first member failure aborts the pass and is returned. Members that were not reached stay in
/// the list.
pub async fn dispose_unsafe_async<M: AsyncBatchMember + Clone>(
    list: &RefCell<Vec<M>>,
) -> Result<()> {
    for index in 0.. {
        let Some(member) = list.borrow().get(index).cloned() else {
            break;
        };

        member.dispose_member_async().await?;
    }

    list.borrow_mut().clear();
    Ok(())
}

/// Asynchronous counterpart of [`dispose_safe()`].
///
/// Each member's teardown is awaited before the next one starts. If the returned future is dropped
/// before completion, the remaining members are released without being disposed.
///
/// # Errors
///
/// The first member failure aborts the pass and is returned.
pub async fn dispose_safe_async<M: AsyncBatchMember>(
    list: &RefCell<Vec<M>>,
    pool: &RefCell<BufferPool<Vec<M>>>,
) -> Result<()> {
    let scratch = take_generation(list, pool);

    for member in scratch.iter() {
        member.dispose_member_async().await?;
    }

    Ok(())
}

/// Moves the current contents of `list` into a pooled scratch buffer.
///
/// The returned guard clears the buffer and gives it back to the pool when dropped.
fn take_generation<'a, M>(
    list: &RefCell<Vec<M>>,
    pool: &'a RefCell<BufferPool<Vec<M>>>,
) -> scopeguard::ScopeGuard<Vec<M>, impl FnOnce(Vec<M>) + 'a> {
    let mut scratch = pool.borrow_mut().lift().unwrap_or_default();
    scratch.append(&mut list.borrow_mut());

    scopeguard::guard(scratch, move |mut scratch| {
        // Drops every member reference before the buffer goes back into circulation.
        scratch.clear();
        recycle(pool, scratch);
    })
}

fn recycle<M>(pool: &RefCell<BufferPool<Vec<M>>>, buffer: Vec<M>) {
    let mut pool = pool.borrow_mut();

    if pool.throw(buffer).is_none() {
        return;
    }

    // The pool was full, so nested passes are holding more buffers than we cache.
    let capacity = pool.capacity();

    if capacity < MAX_SCRATCH_POOL_CAPACITY {
        let grown = capacity
            .saturating_mul(2)
            .clamp(1, MAX_SCRATCH_POOL_CAPACITY);

        log::trace!("growing scratch pool from {capacity} to {grown} buffers");
        pool.set_capacity(grown);
    }
}
