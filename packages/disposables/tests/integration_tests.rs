//! Integration tests for `disposables` covering the interplay of stores, slots, maps and guards.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use disposables::{
    AsyncDisposableAction, AsyncDisposableStore, BufferPool, Disposable, DisposableAction,
    DisposableLike, DisposableMap, DisposableSlot, DisposableStore, Error, WeakGuard,
};

fn counter() -> (Rc<Cell<usize>>, impl Fn() + Clone + 'static) {
    let calls = Rc::new(Cell::new(0_usize));

    let increment = {
        let calls = Rc::clone(&calls);
        move || calls.set(calls.get() + 1)
    };

    (calls, increment)
}

#[test]
fn closures_run_once_and_late_closures_run_immediately() {
    let (a_calls, a) = counter();
    let (b_calls, b) = counter();
    let (c_calls, c) = counter();

    let store = DisposableStore::new();
    store.add_fn(a).unwrap();
    store.add_fn(b).unwrap();

    store.dispose().unwrap();
    store.dispose().unwrap();

    assert_eq!(a_calls.get(), 1);
    assert_eq!(b_calls.get(), 1);

    store.add_fn(c).unwrap();
    assert_eq!(c_calls.get(), 1);
    assert!(store.is_empty());
}

#[test]
fn map_overwrite_disposes_previous_value() {
    let map = DisposableMap::new();
    let d1 = Rc::new(DisposableAction::new(|| {}));
    let d2 = Rc::new(DisposableAction::new(|| {}));

    map.set("k", Rc::clone(&d1)).unwrap();
    map.set("k", Rc::clone(&d2)).unwrap();

    assert!(d1.is_disposed());
    assert!(!d2.is_disposed());

    let held = map.get("k").unwrap();
    assert!(std::ptr::addr_eq(Rc::as_ptr(&held), Rc::as_ptr(&d2)));
}

#[test]
fn pool_evicts_oldest_buffer() {
    let mut pool = BufferPool::new(2);

    assert_eq!(pool.throw(1), None);
    assert_eq!(pool.throw(2), None);
    assert_eq!(pool.throw(3), Some(1));

    assert_eq!(pool.iter().copied().collect::<Vec<_>>(), vec![2, 3]);
}

/// A store member whose teardown registers `late` with `store`.
fn registering_member(store: &Rc<DisposableStore>, late: &Rc<DisposableAction>) -> DisposableLike {
    let store = Rc::clone(store);
    let late = Rc::clone(late);

    DisposableLike::try_action(move || store.add(late))
}

#[test]
fn dispose_current_keeps_members_registered_during_the_pass() {
    let store = Rc::new(DisposableStore::new());
    let y = Rc::new(DisposableAction::new(|| {}));

    store.add(registering_member(&store, &y)).unwrap();
    store.dispose_current().unwrap();

    assert!(!y.is_disposed());
    assert!(store.contains(&y));
    assert!(!store.is_disposed());
}

#[test]
fn dispose_includes_members_registered_during_the_pass() {
    let store = Rc::new(DisposableStore::new());
    let y = Rc::new(DisposableAction::new(|| {}));

    store.add(registering_member(&store, &y)).unwrap();
    store.dispose().unwrap();

    assert!(y.is_disposed());
    assert!(store.is_empty());
}

#[test]
fn disposed_store_does_not_keep_additions() {
    let store = DisposableStore::new();
    store.dispose().unwrap();

    let z = Rc::new(DisposableAction::new(|| {}));
    store.add(Rc::clone(&z)).unwrap();

    assert!(z.is_disposed());
    assert!(!store.remove(&z));
}

#[test]
fn slot_set_disposes_and_replace_does_not() {
    let slot = DisposableSlot::new();
    let first = Rc::new(DisposableAction::new(|| {}));
    let second = Rc::new(DisposableAction::new(|| {}));
    let third = Rc::new(DisposableAction::new(|| {}));

    slot.set(Rc::clone(&first)).unwrap();
    slot.set(Rc::clone(&second)).unwrap();
    assert!(first.is_disposed());

    let previous = slot.replace(Rc::clone(&third)).unwrap();
    assert!(previous.is_some());
    assert!(!second.is_disposed());
}

#[test]
fn weak_guard_ignores_dropped_target() {
    let (calls, increment) = counter();

    let target = Rc::new(DisposableAction::new(increment));
    let guard = WeakGuard::new(&target);
    drop(target);

    guard.dispose().unwrap();
    assert_eq!(calls.get(), 0);
}

#[test]
fn safe_disposal_reports_every_failure_and_finishes() {
    let failures = Rc::new(RefCell::new(Vec::new()));

    let store = DisposableStore::builder()
        .error_handler({
            let failures = Rc::clone(&failures);
            move |error| failures.borrow_mut().push(error.to_string())
        })
        .build();

    let (calls, increment) = counter();

    store
        .add(DisposableLike::try_action(|| Err(Error::teardown("first"))))
        .unwrap();
    store.add_fn(increment).unwrap();
    store
        .add(DisposableLike::try_action(|| Err(Error::teardown("second"))))
        .unwrap();

    store.dispose_safely();

    assert_eq!(failures.borrow().len(), 2);
    assert_eq!(calls.get(), 1);
    assert!(store.is_disposed());
}

#[test]
fn nested_containers_dispose_recursively() {
    let outer = DisposableStore::new();
    let slot = outer.add_one(Rc::new(DisposableSlot::new())).unwrap();
    let map = outer.add_one(Rc::new(DisposableMap::<u32>::new())).unwrap();

    let in_slot = Rc::new(DisposableAction::new(|| {}));
    let in_map = Rc::new(DisposableAction::new(|| {}));

    slot.set(Rc::clone(&in_slot)).unwrap();
    map.set(1, Rc::clone(&in_map)).unwrap();

    outer.dispose().unwrap();

    assert!(in_slot.is_disposed());
    assert!(in_map.is_disposed());
    assert!(slot.is_disposed());
    assert!(map.is_disposed());
}

fn sleeping_member(delay: Duration) -> Rc<AsyncDisposableAction> {
    Rc::new(AsyncDisposableAction::new(move || async move {
        tokio::time::sleep(delay).await;
        Ok(())
    }))
}

#[tokio::test(start_paused = true)]
async fn async_members_are_disposed_sequentially() {
    let t1 = Duration::from_millis(300);
    let t2 = Duration::from_millis(500);

    let store = AsyncDisposableStore::new();
    let first = store.add_one(sleeping_member(t1)).await.unwrap();
    let second = store.add_one(sleeping_member(t2)).await.unwrap();

    let started = tokio::time::Instant::now();
    store.dispose().await.unwrap();
    let elapsed = started.elapsed();

    assert!(first.is_disposed());
    assert!(second.is_disposed());
    assert!(elapsed >= t1 + t2);
    assert!(elapsed < t1 + t2 + Duration::from_millis(50));
}

#[tokio::test(start_paused = true)]
async fn scheduled_disposal_into_store() {
    let store = Rc::new(DisposableStore::new());
    let action = Rc::new(DisposableAction::new(|| {}));

    action.dispose_with(&*store).unwrap();
    let scheduled = Rc::clone(&action).dispose_after(Duration::from_secs(5));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!action.is_disposed());

    scheduled.await.unwrap();
    assert!(action.is_disposed());

    // The store still holds the already disposed action; disposing it again is harmless.
    store.dispose().unwrap();
}
