//! Benchmarks for filter design and zero-phase smoothing

use ball_goal_tracker::{
    config::SmoothingConfig,
    depth::DepthMode,
    filters::{ButterworthDesign, SmoothingFilter},
    trajectory::{TrackedPoint, Trajectory},
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::Vector3;

/// Ball-like motion with deterministic high-frequency jitter
fn noisy_series(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| {
            let t = i as f64 / 60.0;
            1.5 + 0.5 * (t * 1.3).sin() + 0.01 * (i as f64 * 2.7).sin()
        })
        .collect()
}

fn benchmark_design(c: &mut Criterion) {
    let mut group = c.benchmark_group("butterworth_design");

    for order in [2, 3, 5, 8] {
        group.bench_with_input(BenchmarkId::new("lowpass", order), &order, |b, &order| {
            b.iter(|| ButterworthDesign::lowpass(black_box(order), 2.0, 60.0));
        });
    }

    group.finish();
}

fn benchmark_smoothing(c: &mut Criterion) {
    let mut group = c.benchmark_group("zero_phase");

    let Ok(filter) = SmoothingFilter::from_config(&SmoothingConfig::default(), DepthMode::Active) else {
        return;
    };

    for len in [100, 1_000, 10_000] {
        let series = noisy_series(len);
        group.bench_with_input(BenchmarkId::new("smooth", len), &series, |b, series| {
            b.iter(|| filter.smooth(black_box(series)));
        });
    }

    let trajectory: Trajectory = noisy_series(1_000)
        .into_iter()
        .enumerate()
        .map(|(i, z)| TrackedPoint::new(Vector3::new(0.1 * z, -0.05 * z, z), Some(i as f64 / 60.0)))
        .collect();
    group.bench_function("smooth_trajectory_1000", |b| {
        b.iter(|| filter.smooth_trajectory(black_box(&trajectory)));
    });

    group.finish();
}

criterion_group!(benches, benchmark_design, benchmark_smoothing);
criterion_main!(benches);
