//! Codec benchmarks for murmur-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use murmur_protocol::{codec, InboundMessage};

fn frame_with_text(len: usize) -> Vec<u8> {
    let message = InboundMessage::new("device-1", "A".repeat(len), "B".repeat(64));
    serde_json::to_vec(&message).unwrap()
}

fn bench_decode_small(c: &mut Criterion) {
    let frame = frame_with_text(64);

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(frame.len() as u64));
    group.bench_function("small_64B", |b| b.iter(|| codec::decode(black_box(&frame))));
    group.finish();
}

fn bench_decode_large(c: &mut Criterion) {
    let frame = frame_with_text(16 * 1024);

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(frame.len() as u64));
    group.bench_function("large_16KB", |b| b.iter(|| codec::decode(black_box(&frame))));
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let message = InboundMessage::new("device-1", "A".repeat(256), "B".repeat(64));

    c.bench_function("encode_256B", |b| {
        b.iter(|| codec::encode(black_box(&message)).unwrap())
    });
}

criterion_group!(benches, bench_decode_small, bench_decode_large, bench_encode);
criterion_main!(benches);
