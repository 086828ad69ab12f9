//! Frame codec benchmarks: encode and decode of a max-size status reply.

use criterion::{criterion_group, criterion_main, Criterion};
use ocmp_common::proto::{Action, Frame, MsgType, Subsystem, PAYLOAD_MAX};
use std::hint::black_box;

fn codec_benchmark(c: &mut Criterion) {
    let frame = Frame::request(
        Subsystem::Power,
        MsgType::Status,
        Action::Reply,
        1,
        0xFFFF,
        PAYLOAD_MAX,
    )
    .expect("frame fits");
    let bytes = frame.encode();

    c.bench_function("frame_encode_max", |b| {
        b.iter(|| black_box(&frame).encode())
    });

    c.bench_function("frame_decode_max", |b| {
        b.iter(|| Frame::decode(black_box(&bytes)).expect("valid frame"))
    });
}

criterion_group!(benches, codec_benchmark);
criterion_main!(benches);
