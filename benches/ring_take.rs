//! Benchmarks for the consumer side of the frame ring
//!
//! - `try_take_into` with a caller-owned frame versus allocating `try_take`
//! - the empty-ring poll, which consumers hit most often
//! - `pending` scan cost across ring sizes

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rangecast::test_utils::{SyntheticSource, frame_datagrams};
use rangecast::{FrameWriter, Fragment, ScanFrame, frame_ring};
use std::hint::black_box;

fn fill(writer: &mut FrameWriter, frame: &ScanFrame) {
    for (subseq, datagram) in frame_datagrams(frame, frame.seq).iter().enumerate() {
        let fragment = Fragment::decode(datagram).expect("valid fragment");
        let written =
            if subseq == 0 { writer.begin(&fragment) } else { writer.write_fragment(&fragment) };
        written.expect("slot available");
    }
    writer.commit();
}

fn bench_take(c: &mut Criterion) {
    let frame = SyntheticSource::frame_at(0);
    let mut group = c.benchmark_group("ring_take");

    group.bench_function("take_into", |b| {
        let (mut writer, reader) = frame_ring(1);
        let mut out = ScanFrame::new();
        b.iter(|| {
            fill(&mut writer, &frame);
            black_box(reader.try_take_into(&mut out));
        })
    });

    group.bench_function("take_allocating", |b| {
        let (mut writer, reader) = frame_ring(1);
        b.iter(|| {
            fill(&mut writer, &frame);
            black_box(reader.try_take())
        })
    });

    group.bench_function("empty_poll", |b| {
        let (_writer, reader) = frame_ring(8);
        let mut out = ScanFrame::new();
        b.iter(|| black_box(reader.try_take_into(&mut out)))
    });

    group.finish();
}

fn bench_pending(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_pending");
    for capacity in [8usize, 100, 1000] {
        let (_writer, reader) = frame_ring(capacity);
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &reader, |b, reader| {
            b.iter(|| black_box(reader.pending()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_take, bench_pending);
criterion_main!(benches);
