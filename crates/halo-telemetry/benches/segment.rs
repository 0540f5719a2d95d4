//! Criterion benchmarks for the telemetry segment hot paths.
//!
//! The acquisition side publishes one block per 128 samples, so at 30 kHz a
//! publish has roughly 4 ms. These benchmarks track how much of that the
//! segment itself consumes.
//!
//! Run with: cargo bench -p halo-telemetry --bench segment

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use halo_telemetry::{BlockRead, SegmentGeometry, TelemetryConsumer, TelemetryProducer};

fn block(g: SegmentGeometry) -> Vec<Vec<Vec<i32>>> {
    (0..g.stream_count)
        .map(|s| {
            (0..g.channel_count)
                .map(|c| {
                    (0..g.samples_per_block)
                        .map(|n| 32768 + ((s + c + n) % 512) as i32)
                        .collect()
                })
                .collect()
        })
        .collect()
}

/// Publish throughput for common stream/channel layouts.
fn publish_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("telemetry_publish");

    for (name, streams, channels) in [("1x32", 1, 32), ("2x64", 2, 64), ("4x128", 4, 128)] {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("bench_segment");
        let g = SegmentGeometry::new(streams, channels, 128, 30_000).unwrap();
        let mut producer = TelemetryProducer::create(&path, g).unwrap();
        let codes = block(g);
        let mut timestamp = 0u32;

        group.throughput(Throughput::Bytes(g.payload_bytes() as u64));
        group.bench_with_input(BenchmarkId::new("publish", name), &g, |b, _| {
            b.iter(|| {
                timestamp = timestamp.wrapping_add(128);
                producer.publish_block(black_box(&codes), timestamp).unwrap();
            });
        });
    }

    group.finish();
}

/// Latency of copying a fresh block and quantising it for the processor.
fn read_latest_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("telemetry_read");

    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("bench_segment");
    let g = SegmentGeometry::new(1, 32, 128, 30_000).unwrap();
    let mut producer = TelemetryProducer::create(&path, g).unwrap();
    let codes = block(g);
    let mut consumer = TelemetryConsumer::open(&path).unwrap();
    let mut timestamp = 0u32;

    group.throughput(Throughput::Elements(g.cell_count() as u64));
    group.bench_function("read_and_quantise", |b| {
        b.iter(|| {
            timestamp = timestamp.wrapping_add(1);
            producer.publish_block(&codes, timestamp).unwrap();
            if let BlockRead::Fresh(block) = consumer.read_latest_block() {
                black_box(block.waveform());
            }
        });
    });

    group.bench_function("poll_without_new_data", |b| {
        b.iter(|| black_box(consumer.read_latest_block()));
    });

    group.finish();
}

criterion_group!(benches, publish_block, read_latest_block);
criterion_main!(benches);
