use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use rangeid::{
    BasicIdDispenser, IdDispenser, LockIdDispenser, MemoryStore, PoolConfig, RangeLayout,
    RetryPolicy,
};
use std::{thread::scope, time::Instant};

// Number of IDs issued per benchmark iteration (per-thread for
// multi-threaded).
const TOTAL_IDS: usize = 4096;

fn config(ids: usize) -> PoolConfig {
    let max_limit = (ids as u64).next_multiple_of(1_000);
    PoolConfig::new("/range", RangeLayout::new(max_limit, 100).unwrap())
}

fn bench_basic(c: &mut Criterion) {
    let mut group = c.benchmark_group("basic/memory");
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        b.iter_custom(|iters| {
            let mut elapsed = core::time::Duration::ZERO;
            for _ in 0..iters {
                let store = MemoryStore::new();
                let dispenser =
                    BasicIdDispenser::connect(&store, RetryPolicy::never(), config(TOTAL_IDS))
                        .unwrap();
                let start = Instant::now();
                for _ in 0..TOTAL_IDS {
                    black_box(dispenser.try_next_id().unwrap());
                }
                elapsed += start.elapsed();
            }
            elapsed
        });
    });
    group.finish();
}

fn bench_lock_threaded(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock/memory/threaded");
    for threads in [2, 4, 8] {
        let total = TOTAL_IDS * threads;
        group.throughput(Throughput::Elements(total as u64));
        group.bench_function(format!("elems/{TOTAL_IDS}/threads/{threads}"), |b| {
            b.iter_custom(|iters| {
                let mut elapsed = core::time::Duration::ZERO;
                for _ in 0..iters {
                    let store = MemoryStore::new();
                    let dispenser =
                        LockIdDispenser::connect(&store, RetryPolicy::never(), config(total))
                            .unwrap();
                    let start = Instant::now();
                    scope(|s| {
                        for _ in 0..threads {
                            let dispenser = dispenser.clone();
                            s.spawn(move || {
                                for _ in 0..TOTAL_IDS {
                                    black_box(dispenser.try_next_id().unwrap());
                                }
                            });
                        }
                    });
                    elapsed += start.elapsed();
                }
                elapsed
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_basic, bench_lock_threaded);
criterion_main!(benches);
