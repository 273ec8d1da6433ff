//! Benchmark of the binning-based diagnostics: grouping, KS, PSI and the full per-feature evaluation
//!
//! Run with: cargo bench --bench binning_benchmark

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use polars::prelude::*;
use rand::prelude::*;
use rand::SeedableRng;

use ftreval::pipeline::{bin, ks, psi, BinningStrategy, KsConfig, Schema};
use ftreval::report::{evaluate_features, EvaluationConfig};

/// Scores in [0, 100] with a label that leans on the score
fn generate_scores(n_rows: usize, seed: u64) -> (Vec<Option<f64>>, Vec<Option<u8>>) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let scores: Vec<Option<f64>> = (0..n_rows).map(|_| Some(rng.gen::<f64>() * 100.0)).collect();
    let labels = scores
        .iter()
        .map(|s| s.map(|v| (rng.gen::<f64>() * 100.0 < v) as u8))
        .collect();
    (scores, labels)
}

/// Frame of `n_features` numeric features with a binary `target`
fn generate_test_dataframe(n_rows: usize, n_features: usize, seed: u64) -> DataFrame {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);

    let target: Vec<i32> = (0..n_rows)
        .map(|_| if rng.gen::<f64>() > 0.7 { 1 } else { 0 })
        .collect();

    let mut columns: Vec<Column> = vec![Column::new("target".into(), target.clone())];

    for i in 0..n_features {
        let values: Vec<f64> = match i % 3 {
            0 => (0..n_rows).map(|_| rng.gen::<f64>() * 100.0).collect(),
            1 => (0..n_rows)
                .map(|_| {
                    let v = rng.gen::<f64>();
                    (v * v * v) * 100.0
                })
                .collect(),
            _ => (0..n_rows)
                .map(|idx| {
                    let base = if target[idx] == 1 { 70.0 } else { 30.0 };
                    base + rng.gen::<f64>() * 20.0 - 10.0
                })
                .collect(),
        };
        columns.push(Column::new(format!("feature_{}", i).into(), values));
    }

    DataFrame::new(columns).expect("Failed to create DataFrame")
}

fn benchmark_binning_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("binning_strategies");

    for n_rows in [10_000, 100_000] {
        let (scores, _) = generate_scores(n_rows, 42);
        group.throughput(Throughput::Elements(n_rows as u64));

        group.bench_with_input(BenchmarkId::new("equal_frequency", n_rows), &scores, |b, scores| {
            b.iter(|| bin(black_box(scores), black_box(10), BinningStrategy::EqualFrequency));
        });
        group.bench_with_input(BenchmarkId::new("equal_width", n_rows), &scores, |b, scores| {
            b.iter(|| bin(black_box(scores), black_box(10), BinningStrategy::EqualWidth));
        });
    }

    group.finish();
}

fn benchmark_ks_and_psi(c: &mut Criterion) {
    let mut group = c.benchmark_group("ks_psi");

    for n_rows in [10_000, 100_000] {
        let (scores, labels) = generate_scores(n_rows, 7);
        let (other, _) = generate_scores(n_rows, 8);
        group.throughput(Throughput::Elements(n_rows as u64));

        group.bench_with_input(BenchmarkId::new("ks", n_rows), &n_rows, |b, _| {
            b.iter(|| ks(black_box(&scores), black_box(&labels), &KsConfig::default()));
        });
        group.bench_with_input(BenchmarkId::new("psi", n_rows), &n_rows, |b, _| {
            b.iter(|| psi(black_box(&scores), black_box(&other), black_box(10)));
        });
    }

    group.finish();
}

/// Full per-feature evaluation, parallel over features
fn benchmark_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("feature_evaluation");
    group.sample_size(10);

    for (n_rows, n_features) in [(5_000, 10), (20_000, 30)] {
        let df = generate_test_dataframe(n_rows, n_features, 42);
        let compare = generate_test_dataframe(n_rows, n_features, 43);
        let schema = Schema::from_frame(&df, &["target"]);
        let config = EvaluationConfig::default();
        group.throughput(Throughput::Elements(n_features as u64));

        group.bench_with_input(
            BenchmarkId::new("evaluate", format!("{}x{}", n_rows, n_features)),
            &df,
            |b, df| {
                b.iter(|| {
                    evaluate_features(
                        black_box(df),
                        &schema,
                        "target",
                        None,
                        Some(&compare),
                        &config,
                    )
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_binning_strategies,
    benchmark_ks_and_psi,
    benchmark_evaluation
);
criterion_main!(benches);
