//! Basic benchmarks for the `hopscotch_table` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::time::Instant;

use alloc_tracker::Allocator;
use criterion::{Criterion, criterion_group, criterion_main};
use foldhash::fast::FixedState;
use hopscotch_table::{HopscotchTable, StdOps};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

#[global_allocator]
static ALLOCATOR: Allocator<std::alloc::System> = Allocator::system();

const BATCH_SIZE: u64 = 1000;

fn entrypoint(c: &mut Criterion) {
    let allocs = alloc_tracker::Session::new();

    let mut group = c.benchmark_group("table_basic");

    let mut allocs_op = allocs.operation("insert_1000_fnv1a");
    group.bench_function("insert_1000_fnv1a", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let mut table = HopscotchTable::new().unwrap();

                for value in 0..BATCH_SIZE {
                    table.insert(black_box(value)).unwrap();
                }

                drop(black_box(table));
            }

            start.elapsed()
        });
    });

    let mut allocs_op = allocs.operation("insert_1000_foldhash");
    group.bench_function("insert_1000_foldhash", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let mut table = HopscotchTable::builder()
                    .ops(StdOps::with_hasher(FixedState::with_seed(1)))
                    .build()
                    .unwrap();

                for value in 0..BATCH_SIZE {
                    table.insert(black_box(value)).unwrap();
                }

                drop(black_box(table));
            }

            start.elapsed()
        });
    });

    let mut allocs_op = allocs.operation("find_hit");
    group.bench_function("find_hit", |b| {
        let mut table = HopscotchTable::new().unwrap();
        table.insert_all(0..BATCH_SIZE).unwrap();

        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for index in 0..iters {
                _ = black_box(table.find(black_box(&(index % BATCH_SIZE))));
            }

            start.elapsed()
        });
    });

    let mut allocs_op = allocs.operation("find_miss");
    group.bench_function("find_miss", |b| {
        let mut table = HopscotchTable::new().unwrap();
        table.insert_all(0..BATCH_SIZE).unwrap();

        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for index in 0..iters {
                _ = black_box(table.contains(black_box(&(BATCH_SIZE + index))));
            }

            start.elapsed()
        });
    });

    let mut allocs_op = allocs.operation("remove_reinsert");
    group.bench_function("remove_reinsert", |b| {
        let mut table = HopscotchTable::new().unwrap();
        table.insert_all(0..BATCH_SIZE).unwrap();

        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for index in 0..iters {
                let value = index % BATCH_SIZE;
                let removed = table.remove(black_box(&value)).unwrap();
                table.insert(black_box(removed)).unwrap();
            }

            start.elapsed()
        });
    });

    group.finish();

    allocs.print_to_stdout();
}
