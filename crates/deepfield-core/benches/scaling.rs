//! Criterion benchmarks for the per-step spatial pipeline.
//!
//! - Scaling tick over a large body population
//! - Rebase of every tracked position

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use deepfield_core::prelude::*;
use glam::DVec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn populated_engine(bodies: u64) -> SimulationEngine {
    let mut rng = StdRng::seed_from_u64(1);
    let mut engine = SimulationEngine::new(&CoreConfig::default());
    for id in 0..bodies {
        let p = DVec3::new(
            rng.gen_range(-2e6..2e6),
            rng.gen_range(-2e6..2e6),
            rng.gen_range(-2e6..2e6),
        );
        let radius = rng.gen_range(10.0..7_000.0);
        // Every generated body has positive sizes.
        let _ = engine.spawn_body(id, p, DVec3::ZERO, radius, 1_000.0, 10_000.0);
    }
    engine
}

fn bench_scaling_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("scaling_tick");
    for bodies in [1_000u64, 10_000, 100_000] {
        let mut engine = populated_engine(bodies);
        group.throughput(Throughput::Elements(bodies));
        group.bench_with_input(BenchmarkId::from_parameter(bodies), &bodies, |b, _| {
            b.iter(|| black_box(engine.scaling.tick(DVec3::ZERO, &engine.origin)))
        });
    }
    group.finish();
}

fn bench_rebase(c: &mut Criterion) {
    let mut group = c.benchmark_group("rebase_all");
    for bodies in [1_000u64, 100_000] {
        let mut engine = populated_engine(bodies);
        group.throughput(Throughput::Elements(bodies));
        let mut sign = 1.0;
        group.bench_with_input(BenchmarkId::from_parameter(bodies), &bodies, |b, _| {
            b.iter(|| {
                sign = -sign;
                black_box(engine.origin.rebase_by(DVec3::new(sign * 10_000.0, 0.0, 0.0)))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_scaling_tick, bench_rebase);
criterion_main!(benches);
