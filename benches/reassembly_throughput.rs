//! Benchmarks for the receive-side hot path
//!
//! Measures per-datagram cost of:
//! - fragment decoding from the 632-byte wire form
//! - full reassembly of a frame into the ring (decode, sequence check, copy, commit)
//! - the gap path, where fragments are rejected without touching the ring
//!
//! Platform: Cross-platform, no sockets involved

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use rangecast::reassembly::Reassembler;
use rangecast::test_utils::{SyntheticSource, frame_datagrams, synthetic_stream};
use rangecast::types::wire::FRAGMENT_WIRE_SIZE;
use rangecast::{FRAGMENTS_PER_FRAME, Fragment, ScanFrame, frame_ring};
use std::hint::black_box;

fn bench_decode(c: &mut Criterion) {
    let datagram = frame_datagrams(&SyntheticSource::frame_at(0), 1)[3];

    let mut group = c.benchmark_group("fragment_decode");
    group.throughput(Throughput::Bytes(FRAGMENT_WIRE_SIZE as u64));
    group.bench_function("decode", |b| {
        b.iter(|| black_box(Fragment::decode(black_box(&datagram))))
    });
    group.bench_function("malformed_length", |b| {
        b.iter(|| black_box(Fragment::decode(black_box(&datagram[..100]))))
    });
    group.finish();
}

fn bench_reassemble_frames(c: &mut Criterion) {
    const FRAMES: u32 = 64;
    let stream = synthetic_stream(0, FRAMES);

    let mut group = c.benchmark_group("reassembly");
    group.throughput(Throughput::Elements(u64::from(FRAMES)));

    group.bench_function("complete_frames", |b| {
        let (writer, reader) = frame_ring(FRAMES as usize);
        let mut reassembler = Reassembler::new(writer);
        let mut sink = ScanFrame::new();
        b.iter(|| {
            for datagram in &stream {
                black_box(reassembler.handle_datagram(datagram));
            }
            // Drain so the next iteration finds empty slots
            while reader.try_take_into(&mut sink) {}
        })
    });

    group.bench_function("gap_every_frame", |b| {
        let (writer, _reader) = frame_ring(4);
        let mut reassembler = Reassembler::new(writer);
        // Drop sub-sequence 1 of every frame: the tail is rejected by sequencing
        let gappy: Vec<_> = stream
            .iter()
            .enumerate()
            .filter(|(i, _)| i % FRAGMENTS_PER_FRAME != 1)
            .map(|(_, d)| *d)
            .collect();
        b.iter(|| {
            for datagram in &gappy {
                black_box(reassembler.handle_datagram(datagram));
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_decode, bench_reassemble_frames);
criterion_main!(benches);
