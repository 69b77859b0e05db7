//! Per-frame path benchmarks.
//!
//! The transmit path runs once per frame under the station lock, so
//! `select_rates` + `build_chain` should stay in the sub-microsecond range
//! and independent of the table size.
//!
//! Run with: `cargo bench --bench select_rates`

use std::hint::black_box;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use halow_rc::{
    Bandwidth, Capabilities, GuardInterval, Mcs, RateControlConfig, RateTable, SpatialStreams,
};

fn capability_sets() -> Vec<(&'static str, Capabilities)> {
    let narrow = Capabilities::builder()
        .mcs_up_to(Mcs::Mcs7)
        .bandwidths([Bandwidth::Mhz1, Bandwidth::Mhz2])
        .build()
        .unwrap();
    let full = Capabilities::builder()
        .mcs(Mcs::ALL)
        .bandwidths(Bandwidth::ALL)
        .streams(SpatialStreams::ALL)
        .guards(GuardInterval::ALL)
        .build()
        .unwrap();
    vec![("narrow", narrow), ("full", full)]
}

/// A table that has been through enough traffic to have all four priority
/// rows populated.
fn warmed_table(caps: Capabilities) -> RateTable {
    let mut table = RateTable::seeded(caps, RateControlConfig::default(), 1).unwrap();
    for frame in 0..2_000u32 {
        let candidates = table.select_rates(512);
        let chain = table.build_chain(&candidates);
        table.feedback(&chain, 1, frame % 5 != 0);
        if frame % 50 == 49 {
            table.periodic_update();
        }
    }
    table
}

fn bench_transmit_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("transmit_path");
    for (name, caps) in capability_sets() {
        let mut table = warmed_table(caps);
        group.bench_with_input(
            BenchmarkId::new("select_and_build", name),
            &table.row_count(),
            |b, _| {
                b.iter(|| {
                    let candidates = table.select_rates(black_box(512));
                    black_box(table.build_chain(&candidates))
                })
            },
        );
    }
    group.finish();
}

fn bench_periodic_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("periodic_update");
    for (name, caps) in capability_sets() {
        let mut table = warmed_table(caps);
        group.bench_with_input(BenchmarkId::new("update", name), &table.row_count(), |b, _| {
            b.iter(|| table.periodic_update())
        });
    }
    group.finish();
}

criterion_group!(
    name = rate_control;
    config = Criterion::default()
        .warm_up_time(Duration::from_secs(1))
        .measurement_time(Duration::from_secs(5))
        .noise_threshold(0.10);
    targets = bench_transmit_path, bench_periodic_update
);
criterion_main!(rate_control);
