//! Basic benchmarks for the `memory_pool` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::time::Instant;

use criterion::{Criterion, criterion_group, criterion_main};
use memory_pool::{AllocationMode, MemoryPool, source_tag};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_basic");

    group.bench_function("allocate_free_small", |b| {
        let mut pool = MemoryPool::new();

        // Warm up so the slab already exists.
        let warm = pool.allocate(24, source_tag!());
        pool.free(warm);

        b.iter(|| {
            let allocation = pool.allocate(black_box(24), source_tag!());
            pool.free(black_box(allocation));
        });
    });

    group.bench_function("allocate_free_large", |b| {
        let mut pool = MemoryPool::new();

        b.iter(|| {
            let allocation = pool.allocate(black_box(4096), source_tag!());
            pool.free(black_box(allocation));
        });
    });

    group.bench_function("allocate_free_small_system", |b| {
        let mut pool = MemoryPool::builder().mode(AllocationMode::System).build();

        b.iter(|| {
            let allocation = pool.allocate(black_box(24), source_tag!());
            pool.free(black_box(allocation));
        });
    });

    group.bench_function("reallocate_grow", |b| {
        b.iter_custom(|iters| {
            let mut pool = MemoryPool::new();

            let start = Instant::now();

            for _ in 0..iters {
                let mut allocation = pool.allocate(8, source_tag!());

                for size in [16, 32, 48, 64, 128, 256, 512] {
                    allocation = pool.reallocate(Some(allocation), black_box(size), source_tag!());
                }

                pool.free(allocation);
            }

            start.elapsed()
        });
    });

    group.bench_function("truncate_full_slab", |b| {
        let mut pool = MemoryPool::new();

        b.iter(|| {
            for _ in 0..32 {
                drop(black_box(pool.allocate(64, source_tag!())));
            }

            pool.truncate();
        });
    });

    group.finish();
}
