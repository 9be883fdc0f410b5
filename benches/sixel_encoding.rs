//! Benchmarks for sixel encoding
//!
//! Compares a full encode against the incremental band path for each palette,
//! using a viewport-sized frame where only a small strip changes.
//!
//! Platform: Cross-platform (synthetic frames, CI-safe)

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use termium::sixel::{BandEncoder, PaletteKind, SixelEncoder};
use termium::test_utils::{gradient_frame, with_changed_rows};

const WIDTH: u32 = 624;
const HEIGHT: u32 = 288;

fn bench_full_encode(c: &mut Criterion) {
    let frame = gradient_frame(WIDTH, HEIGHT, 0);
    let mut group = c.benchmark_group("sixel_full_encode");

    for kind in [PaletteKind::Websafe, PaletteKind::Plan9, PaletteKind::Adaptive] {
        group.bench_with_input(BenchmarkId::from_parameter(format!("{kind:?}")), &kind, |b, &kind| {
            let mut encoder = SixelEncoder::new(kind);
            b.iter(|| black_box(encoder.encode(black_box(&frame)).expect("encode")))
        });
    }

    group.finish();
}

fn bench_incremental(c: &mut Criterion) {
    let base = gradient_frame(WIDTH, HEIGHT, 0);
    let changed = with_changed_rows(&base, 120, 6);
    let mut group = c.benchmark_group("sixel_incremental");

    for kind in [PaletteKind::Websafe, PaletteKind::Plan9] {
        group.bench_with_input(BenchmarkId::from_parameter(format!("{kind:?}")), &kind, |b, &kind| {
            let mut encoder = BandEncoder::new(kind);
            encoder.encode_frame(&base).expect("prime");
            let mut flip = false;
            b.iter(|| {
                flip = !flip;
                let frame = if flip { &changed } else { &base };
                let (stream, report) = encoder.encode_frame(black_box(frame)).expect("encode");
                black_box((stream.len(), report))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_full_encode, bench_incremental);
criterion_main!(benches);
