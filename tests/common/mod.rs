//! Shared test utilities and fixture generators

#![allow(dead_code)]

use std::path::PathBuf;

use ftreval::model::{FeatureMatrix, LabeledMatrix};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

/// `n` scores uniform in [0, 100] with label `x > 50`, flipped for `noise` of the records
pub fn uniform_scores(n: usize, noise: f64, seed: u64) -> (Vec<Option<f64>>, Vec<Option<u8>>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut scores = Vec::with_capacity(n);
    let mut labels = Vec::with_capacity(n);
    for _ in 0..n {
        let x: f64 = rng.gen_range(0.0..100.0);
        let mut label = (x > 50.0) as u8;
        if rng.gen::<f64>() < noise {
            label = 1 - label;
        }
        scores.push(Some(x));
        labels.push(Some(label));
    }
    (scores, labels)
}

/// Gaussian-ish values (sum of uniforms) shifted by `shift`
pub fn sample_values(n: usize, shift: f64, seed: u64) -> Vec<Option<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let s: f64 = (0..4).map(|_| rng.gen::<f64>()).sum();
            Some(s + shift)
        })
        .collect()
}

/// Logistic sample: `signal` drives the label, `noise` does not
pub fn logistic_sample(n: usize, seed: u64) -> LabeledMatrix {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows = Vec::with_capacity(n);
    let mut labels = Vec::with_capacity(n);
    for _ in 0..n {
        let signal: f64 = rng.gen_range(-3.0..3.0);
        let noise: f64 = rng.gen_range(-3.0..3.0);
        let p = 1.0 / (1.0 + (-1.5 * signal).exp());
        labels.push((rng.gen::<f64>() < p) as u8);
        rows.push(vec![signal, noise]);
    }
    let x = FeatureMatrix::from_rows(vec!["signal".to_string(), "noise".to_string()], &rows).unwrap();
    LabeledMatrix::new(x, labels, None).unwrap()
}

/// Application-style frame with numeric, categorical and sparse features
pub fn credit_frame(n: usize, seed: u64) -> DataFrame {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut income = Vec::with_capacity(n);
    let mut age = Vec::with_capacity(n);
    let mut grade = Vec::with_capacity(n);
    let mut sparse = Vec::with_capacity(n);
    let mut bad = Vec::with_capacity(n);
    for i in 0..n {
        let inc: f64 = rng.gen_range(10.0..100.0);
        let a: i64 = rng.gen_range(20..70);
        let p = 1.0 / (1.0 + ((inc - 50.0) / 10.0).exp());
        let label = (rng.gen::<f64>() < p) as i32;
        income.push(if i % 20 == 0 { None } else { Some(inc) });
        age.push(a);
        grade.push(if label == 1 && rng.gen::<f64>() < 0.7 { "C" } else { "A" });
        sparse.push(if i % 50 == 0 { Some(1.0) } else { None });
        bad.push(label);
    }
    df! {
        "income" => income,
        "age" => age,
        "grade" => grade,
        "sparse" => sparse,
        "bad" => bad,
    }
    .unwrap()
}

/// Write `df` as CSV into `dir` and return its path
pub fn write_csv(dir: &TempDir, name: &str, df: &mut DataFrame) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    CsvWriter::new(&mut file).finish(df).unwrap();
    path
}
