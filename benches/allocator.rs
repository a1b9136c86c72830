//! Allocator benchmarks
//!
//! Measures arena, fallback and heap memory sources under allocation churn,
//! and a full host create/run/close cycle on each.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use scriptbridge::{ArenaBuffer, BlockAllocator, FallbackAllocator, MemorySource, Registry, ScriptHost, SystemAllocator};
use std::rc::Rc;

const ARENA_SIZE: usize = 1024 * 1024;

const SCRIPT: &str = "
local t = {}
for i = 1, 200 do t[i] = Add(i, i) end
return #t
";

/// Mostly small blocks, like the runtime's strings and table nodes
fn churn_sizes(n: usize) -> Vec<usize> {
    (0..n)
        .map(|i| match i % 8 {
            0..=4 => 16 + (i % 48),
            5 | 6 => 64 + (i % 192),
            _ => 512,
        })
        .collect()
}

fn churn<A: MemorySource>(source: &mut A, sizes: &[usize]) {
    let blocks: Vec<_> = sizes.iter().map(|&size| (source.allocate(size), size)).collect();
    for (block, size) in blocks.into_iter().rev() {
        // SAFETY: each block was just served by `source` with this size
        unsafe { source.deallocate(black_box(block).as_ptr(), size) };
    }
    source.reset();
}

fn bench_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("churn");

    for count in [64, 512, 1024].iter() {
        let sizes = churn_sizes(*count);

        group.bench_with_input(BenchmarkId::new("arena", count), &sizes, |b, sizes| {
            let mut buffer = ArenaBuffer::new(ARENA_SIZE).unwrap();
            let mut arena = BlockAllocator::new(buffer.as_mut_slice());
            b.iter(|| churn(&mut arena, sizes));
        });

        group.bench_with_input(BenchmarkId::new("fallback", count), &sizes, |b, sizes| {
            // Small enough that the larger runs spill
            let mut buffer = ArenaBuffer::new(64 * 1024).unwrap();
            let mut memory = FallbackAllocator::from_buffer(buffer.as_mut_slice());
            b.iter(|| churn(&mut memory, sizes));
        });

        group.bench_with_input(BenchmarkId::new("system", count), &sizes, |b, sizes| {
            let mut heap = SystemAllocator::new();
            b.iter(|| churn(&mut heap, sizes));
        });
    }

    group.finish();
}

fn registry() -> Rc<Registry> {
    let mut registry = Registry::new();
    registry.function("Add", |a: i32, b: i32| a + b).unwrap();
    Rc::new(registry)
}

fn bench_host_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("host_cycle");
    let registry = registry();

    group.bench_function("arena", |b| {
        let mut buffer = ArenaBuffer::new(ARENA_SIZE).unwrap();
        let mut memory = Some(FallbackAllocator::from_buffer(buffer.as_mut_slice()));
        b.iter(|| {
            let source = memory.take().unwrap();
            let mut host = ScriptHost::create(source, registry.clone()).unwrap();
            black_box(host.run(SCRIPT).unwrap());
            let mut source = host.close();
            source.reset();
            memory = Some(source);
        });
    });

    group.bench_function("system", |b| {
        b.iter(|| {
            let mut host = ScriptHost::create(SystemAllocator::new(), registry.clone()).unwrap();
            black_box(host.run(SCRIPT).unwrap());
            host.close()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_churn, bench_host_cycle);
criterion_main!(benches);
