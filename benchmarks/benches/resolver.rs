//! Benchmarks for checkpoint resolution over growing checkpoint histories

use checkpoint::{CheckpointPattern, CheckpointResolver};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

fn resolve_listing_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_listing");
    let resolver = CheckpointResolver::new(CheckpointPattern::new(".h5"));

    for count in [10u64, 1_000, 100_000] {
        // Listing order deliberately unrelated to epoch order
        let names: Vec<String> = (0..count)
            .map(|i| format!("checkpoint-{}.h5", (i * 7919) % count))
            .collect();

        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::from_parameter(count), &names, |b, names| {
            b.iter(|| resolver.resolve_listing(std::path::Path::new("/ckpt"), names).unwrap());
        });
    }

    group.finish();
}

fn resolve_directory_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_directory");
    let resolver = CheckpointResolver::new(CheckpointPattern::new(".h5"));

    for count in [10u64, 1_000, 10_000] {
        let dir = TempDir::new().unwrap();
        for epoch in 1..=count {
            std::fs::write(dir.path().join(format!("checkpoint-{}.h5", epoch)), b"").unwrap();
        }

        group.throughput(Throughput::Elements(count));
        group.bench_function(BenchmarkId::from_parameter(count), |b| {
            b.iter(|| resolver.resolve(dir.path()).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, resolve_listing_benchmark, resolve_directory_benchmark);
criterion_main!(benches);
