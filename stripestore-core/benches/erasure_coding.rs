//! Benchmarks for Reed-Solomon erasure coding
//!
//! Run with: cargo bench --package stripestore-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use stripestore_core::erasure::ErasureCoder;
use stripestore_core::{DATA_SHARDS, PARITY_SHARDS};

/// Generate test data of specified size
fn generate_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

fn coder() -> ErasureCoder {
    ErasureCoder::new(DATA_SHARDS, PARITY_SHARDS, 0).unwrap()
}

/// Benchmark encoding at various block sizes
fn bench_encode(c: &mut Criterion) {
    let coder = coder();

    let mut group = c.benchmark_group("erasure_encode");

    for size in [
        64 * 1024,       // 64 KB
        1024 * 1024,     // 1 MB
        4 * 1024 * 1024, // 4 MB
    ] {
        let data = generate_data(size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::new("encode_data", format!("{}KB", size / 1024)),
            &data,
            |b, data| b.iter(|| coder.encode_data(black_box(data))),
        );
    }

    group.finish();
}

/// Benchmark data-only vs full reconstruction with the maximum number of
/// missing shards
fn bench_decode(c: &mut Criterion) {
    let coder = coder();
    let data = generate_data(4 * 1024 * 1024); // 4 MB
    let shards = coder.encode_data(&data).unwrap();

    let mut group = c.benchmark_group("erasure_decode");
    group.throughput(Throughput::Bytes(data.len() as u64));

    let degraded = || {
        let mut opts: Vec<Option<Vec<u8>>> = shards.iter().cloned().map(Some).collect();
        opts[0] = None;
        opts[DATA_SHARDS] = None;
        opts
    };

    group.bench_function("data_only", |b| {
        b.iter_batched(
            degraded,
            |mut opts| coder.decode_data_blocks(black_box(&mut opts)),
            criterion::BatchSize::LargeInput,
        )
    });

    group.bench_function("data_and_parity", |b| {
        b.iter_batched(
            degraded,
            |mut opts| coder.decode_data_and_parity_blocks(black_box(&mut opts)),
            criterion::BatchSize::LargeInput,
        )
    });

    group.finish();
}

/// Benchmark shard verification
fn bench_verify(c: &mut Criterion) {
    let coder = coder();
    let data = generate_data(4 * 1024 * 1024);
    let shards = coder.encode_data(&data).unwrap();

    c.bench_function("verify_shards_4MB", |b| {
        b.iter(|| coder.verify_shards(black_box(&shards)))
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_verify);
criterion_main!(benches);
