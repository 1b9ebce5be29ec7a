//! Throughput Benchmark for FlashRESP
//!
//! This benchmark measures the performance of the reply encoder and the
//! RESP decoder under typical request and response shapes.

use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use flashresp::protocol::{parse_one, Decoder, Reply};
use tokio::io::BufReader;
use tokio::runtime::Runtime;

/// Benchmark encoding of common replies
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(1));

    group.bench_function("status_ok", |b| {
        b.iter(|| black_box(Reply::ok().encode()));
    });

    group.bench_function("integer", |b| {
        let reply = Reply::integer(1_234_567);
        b.iter(|| black_box(reply.encode()));
    });

    group.bench_function("bulk_1kb", |b| {
        let reply = Reply::bulk("x".repeat(1024));
        b.iter(|| black_box(reply.encode()));
    });

    group.bench_function("multi_bulk_set", |b| {
        let reply = Reply::multi_bulk(["SET", "user:1001", "some moderately sized value"]);
        let mut buf = BytesMut::with_capacity(128);
        b.iter(|| {
            buf.clear();
            reply.encode_into(&mut buf);
            black_box(&buf);
        });
    });

    group.bench_function("multi_raw_nested", |b| {
        let reply = Reply::multi_raw(vec![
            Reply::integer(1),
            Reply::multi_raw(vec![Reply::bulk("a"), Reply::NullBulk]),
            Reply::status("OK"),
        ]);
        b.iter(|| black_box(reply.encode()));
    });

    group.finish();
}

/// Benchmark single-frame decoding
fn bench_parse_one(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_one");
    group.throughput(Throughput::Elements(1));

    let set = Reply::multi_bulk(["SET", "user:1001", "value"]).encode();
    group.bench_function("multi_bulk_set", |b| {
        b.iter(|| black_box(parse_one(&set).unwrap()));
    });

    group.bench_function("inline_ping", |b| {
        b.iter(|| black_box(parse_one(b"PING\r\n").unwrap()));
    });

    let large = Reply::bulk("x".repeat(64 * 1024)).encode();
    group.bench_function("bulk_64kb", |b| {
        b.iter(|| black_box(parse_one(&large).unwrap()));
    });

    group.finish();
}

/// Benchmark decoding a pipelined stream of frames
fn bench_decode_stream(c: &mut Criterion) {
    const FRAMES: usize = 1_000;

    let rt = Runtime::new().unwrap();
    let mut input = BytesMut::new();
    for i in 0..FRAMES {
        Reply::multi_bulk(["SET".to_string(), format!("key:{}", i), format!("value:{}", i)])
            .encode_into(&mut input);
    }
    let input: Bytes = input.freeze();

    let mut group = c.benchmark_group("decode_stream");
    group.throughput(Throughput::Elements(FRAMES as u64));

    group.bench_function("pipelined_set_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut decoder = Decoder::new(BufReader::new(&input[..]));
                for _ in 0..FRAMES {
                    black_box(decoder.next_payload().await.unwrap());
                }
            })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_parse_one, bench_decode_stream);

criterion_main!(benches);
