//! Allocation-pattern benchmarks
//!
//! Benchmarks that simulate actual usage patterns over the three allocators.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use region_alloc::allocator::{
    ArenaAllocator, ArenaConfig, PoolAllocator, PoolConfig, StackAllocator, StackConfig,
};

/// Simulate a request/response cycle (allocate, use, recycle).
fn bench_request_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_cycle");
    group.throughput(Throughput::Elements(1));

    group.bench_function("arena_with_reset", |b| {
        let arena = ArenaAllocator::with_config(64 * 1024, ArenaConfig::production()).unwrap();

        b.iter(|| {
            let req = arena.alloc_aligned(256, 8).unwrap();
            let resp = arena.alloc_aligned(512, 8).unwrap();
            black_box((req, resp));
            unsafe { arena.reset() };
        });
    });

    group.bench_function("stack_with_lifo_free", |b| {
        let stack = StackAllocator::with_config(64 * 1024, StackConfig::production()).unwrap();

        b.iter(|| unsafe {
            let req = stack.alloc_aligned(256, 8).unwrap();
            let resp = stack.alloc_aligned(512, 8).unwrap();
            black_box((req, resp));
            stack.free(resp.cast());
            stack.free(req.cast());
        });
    });

    group.bench_function("pool_with_reuse", |b| {
        let pool = PoolAllocator::with_config(64 * 1024, 512, 8, PoolConfig::production()).unwrap();

        b.iter(|| unsafe {
            let req = pool.alloc().unwrap();
            let resp = pool.alloc().unwrap();
            black_box((req, resp));
            pool.free(resp.cast());
            pool.free(req.cast());
        });
    });

    group.finish();
}

/// Grow a scratch buffer in place at the top of the region.
fn bench_top_resize(c: &mut Criterion) {
    let mut group = c.benchmark_group("top_resize");

    group.bench_function("arena_grow_in_place", |b| {
        let arena = ArenaAllocator::with_config(256 * 1024, ArenaConfig::production()).unwrap();

        b.iter(|| unsafe {
            let ptr = arena.alloc_aligned(64, 8).unwrap();
            let mut size = 64;
            while size < 4096 {
                arena.resize_aligned(ptr.cast(), size, size * 2, 8).unwrap();
                size *= 2;
            }
            black_box(ptr);
            arena.reset();
        });
    });

    group.finish();
}

/// Burst of fixed-size objects, released all at once.
fn bench_object_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("object_burst");
    group.throughput(Throughput::Elements(64));

    group.bench_function("pool_burst_64", |b| {
        let pool =
            PoolAllocator::with_config(64 * 1024, 128, 16, PoolConfig::production()).unwrap();

        b.iter(|| {
            for _ in 0..64 {
                black_box(pool.alloc().unwrap());
            }
            unsafe { pool.free_all() };
        });
    });

    group.bench_function("stack_burst_64", |b| {
        let stack = StackAllocator::with_config(64 * 1024, StackConfig::production()).unwrap();

        b.iter(|| {
            let marker = stack.mark();
            for _ in 0..64 {
                black_box(stack.alloc_aligned(128, 16).unwrap());
            }
            unsafe { stack.restore_to_marker(marker).unwrap() };
        });
    });

    group.finish();
}

criterion_group!(benches, bench_request_cycle, bench_top_resize, bench_object_burst);
criterion_main!(benches);
