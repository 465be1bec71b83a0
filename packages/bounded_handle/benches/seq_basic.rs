//! Basic benchmarks for the `bounded_handle` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::iter;
use std::time::Instant;

use alloc_tracker::Allocator;
use bounded_handle::{BoundedHandle, GrowableSeq, View, scoped_with};
use criterion::{Criterion, criterion_group, criterion_main};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

#[global_allocator]
static ALLOCATOR: Allocator<std::alloc::System> = Allocator::system();

type TestItem = u64;
const TEST_VALUE: TestItem = 1024;
const BATCH_SIZE: usize = 1000;

fn entrypoint(c: &mut Criterion) {
    let allocs = alloc_tracker::Session::new();

    let mut group = c.benchmark_group("seq_basic");

    let mut allocs_op = allocs.operation("push_1000");
    group.bench_function("push_1000", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let mut seq = GrowableSeq::new();

                for _ in 0..BATCH_SIZE {
                    _ = black_box(seq.push(black_box(TEST_VALUE)).is_ok());
                }

                drop(black_box(seq));
            }

            start.elapsed()
        });
    });

    let mut allocs_op = allocs.operation("insert_front_100");
    group.bench_function("insert_front_100", |b| {
        b.iter_custom(|iters| {
            let mut seqs = iter::repeat_with(|| GrowableSeq::<TestItem>::with_capacity(100))
                .take(usize::try_from(iters).unwrap())
                .collect::<Result<Vec<_>, _>>()
                .unwrap();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for seq in &mut seqs {
                for _ in 0..100 {
                    seq.push_front(black_box(TEST_VALUE)).unwrap();
                }
            }

            start.elapsed()
        });
    });

    let mut allocs_op = allocs.operation("swap_delete_one");
    group.bench_function("swap_delete_one", |b| {
        b.iter_custom(|iters| {
            let source = vec![TEST_VALUE; BATCH_SIZE];

            let mut seqs = iter::repeat_with(|| GrowableSeq::from_slice(&source))
                .take(usize::try_from(iters).unwrap())
                .collect::<Result<Vec<_>, _>>()
                .unwrap();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for seq in &mut seqs {
                seq.swap_delete(black_box(0), 1);
            }

            start.elapsed()
        });
    });

    let mut allocs_op = allocs.operation("concatenate_1000");
    group.bench_function("concatenate_1000", |b| {
        b.iter_custom(|iters| {
            let source = vec![TEST_VALUE; BATCH_SIZE];

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let mut seq = GrowableSeq::new();
                seq.concatenate(View::new(&source)).unwrap();
                drop(black_box(seq));
            }

            start.elapsed()
        });
    });

    let mut allocs_op = allocs.operation("handle_grow_shrink");
    group.bench_function("handle_grow_shrink", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let mut handle = BoundedHandle::filled(16, &TEST_VALUE).unwrap();
                handle.reallocate(256).unwrap();
                handle.reallocate(8).unwrap();
                drop(black_box(handle));
            }

            start.elapsed()
        });
    });

    let mut allocs_op = allocs.operation("scoped_small");
    group.bench_function("scoped_small", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let sum = scoped_with(32, |index| index as TestItem, |buffer| {
                    buffer.iter().sum::<TestItem>()
                })
                .unwrap();

                black_box(sum);
            }

            start.elapsed()
        });
    });

    group.finish();

    allocs.print_to_stdout();
}
