//! Criterion micro-benchmarks for pool and tracked-pointer operations.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use memkeep_arena::{Pool, TrackedPointer};
use memkeep_bench::{growing_buffer, small_objects};

/// Benchmark: 1K small allocations followed by one bulk release.
fn bench_pool_small_objects_1k(c: &mut Criterion) {
    c.bench_function("pool_small_objects_1k", |b| {
        b.iter(|| {
            let mut pool = Pool::new();
            let total = small_objects(&mut pool, 1000).unwrap();
            black_box(total);
            pool.release_all();
        });
    });
}

/// Benchmark: grow one pool entry from 1 byte to 1MB by doubling.
fn bench_pool_growing_buffer(c: &mut Criterion) {
    c.bench_function("pool_growing_buffer_1mb", |b| {
        b.iter(|| {
            let mut pool = Pool::new();
            black_box(growing_buffer(&mut pool, 20).unwrap());
        });
    });
}

/// Benchmark: allocate, share and release a tracked pointer.
fn bench_tracked_pointer_cycle(c: &mut Criterion) {
    c.bench_function("tracked_pointer_cycle", |b| {
        b.iter(|| {
            let mut ptr = TrackedPointer::new();
            ptr.allocate(1, 64).unwrap();
            for _ in 0..8 {
                ptr.increment_reference().unwrap();
            }
            for _ in 0..9 {
                ptr.decrement_reference().unwrap();
            }
            black_box(ptr.is_null());
        });
    });
}

criterion_group!(
    benches,
    bench_pool_small_objects_1k,
    bench_pool_growing_buffer,
    bench_tracked_pointer_cycle
);
criterion_main!(benches);
