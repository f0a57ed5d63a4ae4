use core::time::Duration;
use std::{collections::HashSet, thread, thread::scope};

use crate::{
    BasicIdDispenser, Coordinator, Error, IdDispenser, IdRange, LockIdDispenser, MemorySession,
    MemoryStore, NodeRecord, PoolConfig, RangeAllocator, RangeLayout, RangePool, RetryPolicy,
};

fn basic(store: &MemoryStore) -> BasicIdDispenser<MemorySession> {
    basic_with(store, PoolConfig::default())
}

fn basic_with(store: &MemoryStore, config: PoolConfig) -> BasicIdDispenser<MemorySession> {
    BasicIdDispenser::connect(store, RetryPolicy::never(), config).unwrap()
}

fn take(dispenser: &impl IdDispenser, n: usize) -> Vec<u64> {
    (0..n).map(|_| dispenser.try_next_id().unwrap()).collect()
}

#[test]
fn issues_first_range_then_rotates() {
    let store = MemoryStore::new();
    let dispenser = basic(&store);
    assert_eq!(dispenser.current_range().unwrap(), Some(IdRange::new(0, 100)));

    let ids = take(&dispenser, 100);
    assert_eq!(ids, (0..100).collect::<Vec<_>>());
    // The end of a range is exclusive; 99 was the last ID and no rotation
    // happened yet.
    assert_eq!(dispenser.current_range().unwrap(), Some(IdRange::new(0, 100)));

    assert_eq!(dispenser.try_next_id().unwrap(), 100);
    assert_eq!(
        dispenser.current_range().unwrap(),
        Some(IdRange::new(100, 200))
    );
    assert_eq!(dispenser.try_next_id().unwrap(), 101);
}

#[test]
fn cursor_is_persisted_after_every_id() {
    let store = MemoryStore::new();
    let dispenser = basic(&store);
    take(&dispenser, 3);

    let alloc = dispenser.into_allocator();
    assert_eq!(alloc.read_record().unwrap().0, NodeRecord::new(3, 100));
}

#[test]
fn range_end_is_never_issued() {
    let store = MemoryStore::new();
    let layout = RangeLayout::new(20, 10).unwrap();
    let dispenser = basic_with(&store, PoolConfig::new("/range", layout));

    let ids = take(&dispenser, 20);
    assert_eq!(ids, (0..20).collect::<Vec<_>>());
    assert!(!ids.contains(&20));
}

#[test]
fn two_instances_draw_from_disjoint_ranges() {
    let store = MemoryStore::new();
    let a = basic(&store);
    let b = basic(&store);

    assert_eq!(a.try_next_id().unwrap(), 0);
    assert_eq!(b.try_next_id().unwrap(), 100);
    assert_eq!(a.try_next_id().unwrap(), 1);

    take(&a, 98);
    // `a` rotates past the range `b` holds.
    assert_eq!(a.try_next_id().unwrap(), 200);
    assert_eq!(b.try_next_id().unwrap(), 101);
}

#[test]
fn ids_increase_by_one_and_jump_on_rotation() {
    let store = MemoryStore::new();
    let a = basic(&store);
    let b = basic(&store);
    let _ = b.try_next_id().unwrap();

    let ids = take(&a, 250);
    for pair in ids.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        assert!(next > prev);
        if next != prev + 1 {
            // Only a rotation may skip, and only onto a range start.
            assert_eq!(prev % 100, 99);
            assert_eq!(next % 100, 0);
        }
    }
    assert_eq!(ids[99], 99);
    assert_eq!(ids[100], 200);
}

#[test]
fn whole_space_is_issued_once_then_exhausted() {
    let store = MemoryStore::new();
    let dispenser = basic(&store);

    let ids = take(&dispenser, 1_000);
    assert!(ids.iter().all(|&id| id < 1_000));
    assert_eq!(ids.iter().copied().collect::<HashSet<_>>().len(), 1_000);

    assert!(matches!(
        dispenser.try_next_id(),
        Err(Error::PoolExhausted { .. })
    ));
}

#[test]
fn exhausted_pool_fails_every_later_call() {
    let store = MemoryStore::new();
    let layout = RangeLayout::new(100, 100).unwrap();
    let dispenser = basic_with(&store, PoolConfig::new("/range", layout));

    assert_eq!(take(&dispenser, 100).last(), Some(&99));
    for _ in 0..3 {
        assert_eq!(
            dispenser.try_next_id(),
            Err(Error::PoolExhausted {
                path: "/range".into()
            })
        );
    }
    assert_eq!(dispenser.current_range().unwrap(), Some(IdRange::new(0, 100)));
}

#[test]
fn crashed_instance_leaves_a_permanent_gap() {
    let store = MemoryStore::new();
    let crashed = basic(&store);
    assert_eq!(take(&crashed, 40).last(), Some(&39));
    drop(crashed);
    assert!(store.children("/range").unwrap().is_empty());

    let survivor = basic(&store);
    let ids = take(&survivor, 900);
    assert_eq!(ids[0], 100);
    assert!(ids.iter().all(|&id| id >= 100));
    assert!(matches!(
        survivor.try_next_id(),
        Err(Error::PoolExhausted { .. })
    ));
}

#[test]
fn closed_dispenser_issues_nothing() {
    let store = MemoryStore::new();
    let dispenser = basic(&store);
    take(&dispenser, 5);
    dispenser.close().unwrap();

    assert_eq!(dispenser.try_next_id(), Err(Error::NotRegistered));
    assert_eq!(dispenser.current_range().unwrap(), None);
    assert_eq!(store.live_sessions().unwrap(), 0);
}

#[test]
fn expired_session_is_reported() {
    let store = MemoryStore::new();
    let dispenser = basic(&store);
    let alloc = dispenser.into_allocator();
    let id = alloc.pool().client().id();
    let dispenser = BasicIdDispenser::from_allocator(alloc);

    assert!(store.expire_session(id).unwrap());
    assert_eq!(
        dispenser.try_next_id(),
        Err(Error::SessionExpired { session: id })
    );
}

#[test]
fn failed_call_does_not_advance_cursor() {
    let store = MemoryStore::new();
    let dispenser = basic(&store);
    take(&dispenser, 10);

    store.set_available(false).unwrap();
    assert!(dispenser.try_next_id().unwrap_err().is_retryable());
    store.set_available(true).unwrap();

    assert_eq!(dispenser.try_next_id().unwrap(), 10);
}

/// Brings `store` back after `after`, from another thread.
fn restore_after(store: &MemoryStore, after: Duration) -> thread::JoinHandle<()> {
    let store = store.clone();
    thread::spawn(move || {
        thread::sleep(after);
        store.set_available(true).unwrap();
    })
}

fn patient(store: &MemoryStore, config: PoolConfig) -> BasicIdDispenser<MemorySession> {
    BasicIdDispenser::connect(
        store,
        RetryPolicy::fixed(5, Duration::from_millis(100)),
        config,
    )
    .unwrap()
}

#[test]
fn transient_outage_is_retried_within_policy() {
    let store = MemoryStore::new();
    let dispenser = patient(&store, PoolConfig::default());
    take(&dispenser, 10);

    store.set_available(false).unwrap();
    let restore = restore_after(&store, Duration::from_millis(50));

    assert_eq!(dispenser.try_next_id().unwrap(), 10);
    restore.join().unwrap();
    assert_eq!(dispenser.try_next_id().unwrap(), 11);
}

#[test]
fn rotation_survives_transient_outage() {
    let store = MemoryStore::new();
    let dispenser = patient(&store, PoolConfig::default());
    take(&dispenser, 100);

    store.set_available(false).unwrap();
    let restore = restore_after(&store, Duration::from_millis(50));

    assert_eq!(dispenser.try_next_id().unwrap(), 100);
    restore.join().unwrap();
    assert_eq!(
        dispenser.current_range().unwrap(),
        Some(IdRange::new(100, 200))
    );
    assert_eq!(dispenser.remaining().unwrap().len(), 8);
}

#[test]
fn outage_outlasting_policy_is_reported_without_advancing() {
    let store = MemoryStore::new();
    let dispenser = BasicIdDispenser::connect(
        &store,
        RetryPolicy::fixed(3, Duration::from_millis(1)),
        PoolConfig::default(),
    )
    .unwrap();
    take(&dispenser, 3);

    store.set_available(false).unwrap();
    assert!(matches!(
        dispenser.try_next_id(),
        Err(Error::Connection { .. })
    ));
    store.set_available(true).unwrap();

    assert_eq!(dispenser.try_next_id().unwrap(), 3);
}

#[test]
fn unregistered_allocator_cannot_issue() {
    let store = MemoryStore::new();
    let pool = RangePool::new(store.open_session().unwrap(), PoolConfig::default());
    pool.ensure_exists().unwrap();
    let dispenser = BasicIdDispenser::from_allocator(RangeAllocator::new(pool));

    assert_eq!(dispenser.try_next_id(), Err(Error::NotRegistered));
    assert_eq!(dispenser.current_range().unwrap(), None);
}

#[test]
fn corrupt_app_node_is_a_serialization_error() {
    let store = MemoryStore::new();
    let alloc =
        RangeAllocator::bootstrap(&store, RetryPolicy::never(), PoolConfig::default()).unwrap();
    let path = alloc.node_path().unwrap().to_owned();
    let (_, version) = alloc.read_record().unwrap();
    let dispenser = BasicIdDispenser::from_allocator(alloc);

    let intruder = store.open_session().unwrap();
    intruder.write(&path, &[0, 1, 2], version).unwrap();

    assert!(matches!(
        dispenser.try_next_id(),
        Err(Error::Serialization { .. })
    ));
}

#[test]
fn lock_dispenser_is_unique_across_threads() {
    const THREADS: usize = 8;
    const IDS_PER_THREAD: usize = 100;

    let store = MemoryStore::new();
    let dispenser =
        LockIdDispenser::connect(&store, RetryPolicy::never(), PoolConfig::default()).unwrap();

    let ids: Vec<u64> = scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let dispenser = dispenser.clone();
                s.spawn(move || take(&dispenser, IDS_PER_THREAD))
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    let distinct: HashSet<_> = ids.iter().copied().collect();
    assert_eq!(distinct.len(), THREADS * IDS_PER_THREAD);
    // One instance consumes its ranges in order without gaps.
    assert_eq!(distinct.iter().max(), Some(&799));
}

#[test]
fn many_instances_on_many_threads_never_collide() {
    const INSTANCES: usize = 4;
    const THREADS_PER_INSTANCE: usize = 2;
    const IDS_PER_THREAD: usize = 100;

    let store = MemoryStore::new();
    let config = PoolConfig::default().with_conflict_retries(u32::MAX);
    let dispensers: Vec<_> = (0..INSTANCES)
        .map(|_| LockIdDispenser::connect(&store, RetryPolicy::never(), config.clone()).unwrap())
        .collect();

    let ids: Vec<u64> = scope(|s| {
        let handles: Vec<_> = dispensers
            .iter()
            .flat_map(|d| (0..THREADS_PER_INSTANCE).map(move |_| d.clone()))
            .map(|dispenser| s.spawn(move || take(&dispenser, IDS_PER_THREAD)))
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    let total = INSTANCES * THREADS_PER_INSTANCE * IDS_PER_THREAD;
    assert_eq!(ids.len(), total);
    assert_eq!(ids.iter().copied().collect::<HashSet<_>>().len(), total);
    assert!(ids.iter().all(|&id| id < 1_000));
}

#[cfg(not(feature = "parking-lot"))]
#[test]
fn poisoned_lock_is_reported() {
    let store = MemoryStore::new();
    let dispenser =
        LockIdDispenser::connect(&store, RetryPolicy::never(), PoolConfig::default()).unwrap();

    let state = dispenser.state.clone();
    let _ = std::thread::spawn(move || {
        let _guard = state.lock().unwrap();
        panic!("poison");
    })
    .join();

    assert_eq!(dispenser.try_next_id(), Err(Error::LockPoisoned));
}

#[test]
fn remaining_reflects_claims_of_every_instance() {
    let store = MemoryStore::new();
    let a = basic(&store);
    assert_eq!(a.remaining().unwrap().len(), 9);

    let b = LockIdDispenser::connect(&store, RetryPolicy::never(), PoolConfig::default()).unwrap();
    assert_eq!(b.remaining().unwrap()[0], IdRange::new(200, 300));
    assert_eq!(a.remaining().unwrap().len(), 8);
}
