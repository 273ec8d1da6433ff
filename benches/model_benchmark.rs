//! Benchmark of cross-validated fitting for both learners
//!
//! Run with: cargo bench --bench model_benchmark

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;
use rand::SeedableRng;

use ftreval::model::{
    BoostedParams, CrossValidator, CvConfig, FeatureMatrix, LabeledMatrix, LinearParams, ModelSpec,
};

/// Logistic sample where the first half of the features carry signal
fn generate_sample(n_rows: usize, n_features: usize, seed: u64) -> LabeledMatrix {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let names: Vec<String> = (0..n_features).map(|i| format!("feature_{}", i)).collect();
    let mut rows = Vec::with_capacity(n_rows);
    let mut labels = Vec::with_capacity(n_rows);
    for _ in 0..n_rows {
        let row: Vec<f64> = (0..n_features).map(|_| rng.gen::<f64>() * 2.0 - 1.0).collect();
        let logit: f64 = row.iter().take(n_features / 2).sum();
        let p = 1.0 / (1.0 + (-logit).exp());
        labels.push((rng.gen::<f64>() < p) as u8);
        rows.push(row);
    }
    let x = FeatureMatrix::from_rows(names, &rows).expect("Failed to build feature matrix");
    LabeledMatrix::new(x, labels, None).expect("Failed to build labelled sample")
}

fn benchmark_linear_cv(c: &mut Criterion) {
    let mut group = c.benchmark_group("linear_cv");
    group.sample_size(10);

    for (n_rows, n_features) in [(5_000, 10), (20_000, 20)] {
        let data = generate_sample(n_rows, n_features, 42);
        let cv = CrossValidator::new(ModelSpec::Linear(LinearParams::default()), CvConfig::default())
            .expect("valid configuration");
        group.throughput(Throughput::Elements(n_rows as u64));

        group.bench_with_input(
            BenchmarkId::new("5_fold", format!("{}x{}", n_rows, n_features)),
            &data,
            |b, data| b.iter(|| cv.fit(black_box(data))),
        );
    }

    group.finish();
}

fn benchmark_boosted_cv(c: &mut Criterion) {
    let mut group = c.benchmark_group("boosted_cv");
    group.sample_size(10);

    let data = generate_sample(5_000, 10, 42);
    for max_depth in [3, 5] {
        let spec = ModelSpec::Boosted(BoostedParams {
            num_rounds: 50,
            max_depth,
            ..Default::default()
        });
        let cv = CrossValidator::new(spec, CvConfig::default()).expect("valid configuration");

        group.bench_with_input(BenchmarkId::new("max_depth", max_depth), &data, |b, data| {
            b.iter(|| cv.fit(black_box(data)))
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_linear_cv, benchmark_boosted_cv);
criterion_main!(benches);
