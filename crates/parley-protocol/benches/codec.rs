//! Codec benchmarks for parley-protocol.

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use parley_protocol::{codec, ClientEvent, MessageView, ServerEvent};

fn new_message(content_len: usize) -> ServerEvent {
    ServerEvent::NewMessage(MessageView {
        id: "6f1c8f8e-2f55-4a5e-9f43-3c1d2b7f0a11".into(),
        user_id: "conn_bench".into(),
        username: "bench".into(),
        content: "x".repeat(content_len),
        encrypted: false,
        timestamp: Utc::now(),
        channel_id: "general".into(),
    })
}

fn bench_encode_text(c: &mut Criterion) {
    let event = new_message(64);

    let mut group = c.benchmark_group("encode_text");
    group.throughput(Throughput::Elements(1));
    group.bench_function("new_message_64B", |b| {
        b.iter(|| codec::encode_text(black_box(&event)))
    });
    group.finish();
}

fn bench_encode_binary(c: &mut Criterion) {
    let event = new_message(64);

    let mut group = c.benchmark_group("encode_binary");
    group.throughput(Throughput::Elements(1));
    group.bench_function("new_message_64B", |b| b.iter(|| codec::encode(black_box(&event))));
    group.finish();
}

fn bench_decode_text(c: &mut Criterion) {
    let text = codec::encode_text(&ClientEvent::message("general", "x".repeat(256))).unwrap();

    let mut group = c.benchmark_group("decode_text");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("message_256B", |b| {
        b.iter(|| codec::decode_text::<ClientEvent>(black_box(&text)))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_encode_text,
    bench_encode_binary,
    bench_decode_text
);
criterion_main!(benches);
