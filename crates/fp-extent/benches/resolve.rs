#![forbid(unsafe_code)]

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use fp_extent::{ExtentMap, Resolution};
use fp_types::{RawRun, Sector};

// ── Synthetic maps (no I/O) ────────────────────────────────────────────

/// Contiguous virtual coverage, physically scattered: run i of
/// `clusters_per_run` clusters lands at volume cluster `i * stride`.
fn scattered_map(runs: u64, clusters_per_run: u64, stride: u64) -> ExtentMap {
    let mut raw: Vec<RawRun> = (0..runs)
        .map(|i| RawRun {
            vcn: i * clusters_per_run,
            lcn: i * stride,
            length: clusters_per_run,
        })
        .collect();
    raw.push(RawRun::sentinel());
    ExtentMap::copy_runs(&raw)
}

fn bench_resolve(c: &mut Criterion) {
    const SPC: u64 = 8;

    let small = scattered_map(4, 64, 1000);
    let large = scattered_map(512, 16, 64);

    c.bench_function("resolve_contained_small_map", |b| {
        b.iter(|| {
            let r = small.resolve(black_box(Sector(72)), black_box(Sector(80)), SPC);
            assert!(matches!(r, Resolution::Mapped(_)));
            r
        });
    });

    c.bench_function("resolve_last_run_large_map", |b| {
        let last_start = 511 * 16 * SPC;
        b.iter(|| {
            let r = large.resolve(
                black_box(Sector(last_start)),
                black_box(Sector(last_start + SPC)),
                SPC,
            );
            assert!(matches!(r, Resolution::Mapped(_)));
            r
        });
    });

    c.bench_function("resolve_straddle_large_map", |b| {
        let boundary = 256 * 16 * SPC;
        b.iter(|| {
            let r = large.resolve(
                black_box(Sector(boundary - 4)),
                black_box(Sector(boundary + 4)),
                SPC,
            );
            assert!(matches!(r, Resolution::Split { at: 4 }));
            r
        });
    });
}

criterion_group!(benches, bench_resolve);
criterion_main!(benches);
