//! Integration tests for the Population Stability Index

use ftreval::error::{EvalError, Warning};
use ftreval::pipeline::{
    psi, psi_categorical, psi_frame, psi_with_config, FeatureKind, PsiConfig, ZeroOccupancy,
};

#[path = "common/mod.rs"]
mod common;

#[test]
fn test_psi_of_sample_with_itself_is_zero() {
    let a = common::sample_values(2000, 0.0, 11);
    let value = psi(&a, &a, 10).unwrap();
    assert!(value.abs() < 1e-12, "PSI(a, a) = {}", value);
}

#[test]
fn test_psi_is_symmetric() {
    let a = common::sample_values(3000, 0.0, 1);
    let b = common::sample_values(3000, 0.3, 2);
    let ab = psi(&a, &b, 10).unwrap();
    let ba = psi(&b, &a, 10).unwrap();
    assert!((ab - ba).abs() < 1e-10, "{} vs {}", ab, ba);
    assert!(ab >= 0.0);
}

#[test]
fn test_same_distribution_is_stable() {
    let a = common::sample_values(20_000, 0.0, 21);
    let b = common::sample_values(20_000, 0.0, 22);
    let value = psi(&a, &b, 10).unwrap();
    assert!(value < 0.01, "PSI of identically distributed samples was {}", value);
}

#[test]
fn test_shifted_distribution_is_unstable() {
    let a = common::sample_values(5000, 0.0, 31);
    let b = common::sample_values(5000, 1.0, 32);
    let value = psi(&a, &b, 10).unwrap();
    assert!(value > 0.25, "PSI of shifted samples was {}", value);
}

#[test]
fn test_empty_group_is_smoothed_or_rejected() {
    // Sample B has nothing between 1 and 9
    let a: Vec<Option<f64>> = (0..100).map(|i| Some(i as f64 / 10.0)).collect();
    let b: Vec<Option<f64>> = (0..100)
        .map(|i| Some(if i % 2 == 0 { 0.5 } else { 9.5 }))
        .collect();

    let smoothed = psi_with_config(&a, &b, &PsiConfig::new(10), "x").unwrap();
    assert!(smoothed.value.is_finite());
    assert!(smoothed.value > 0.0);
    assert!(matches!(
        smoothed.warnings.as_slice(),
        [Warning::OccupancySmoothed { groups, .. }] if *groups == 8
    ));

    let strict = PsiConfig {
        zero_occupancy: ZeroOccupancy::Error,
        ..PsiConfig::new(10)
    };
    assert!(matches!(
        psi_with_config(&a, &b, &strict, "x"),
        Err(EvalError::NumericalInstability(_))
    ));
}

#[test]
fn test_missing_group_is_optional() {
    let a = vec![Some(1.0), Some(2.0), None, None];
    let b = vec![Some(1.0), Some(2.0), Some(1.5), None];

    let without = psi_with_config(&a, &b, &PsiConfig::new(2), "x").unwrap();
    assert!(without.rows.iter().all(|r| r.label != "MISSING"));

    let with = psi_with_config(
        &a,
        &b,
        &PsiConfig {
            include_missing: true,
            ..PsiConfig::new(2)
        },
        "x",
    )
    .unwrap();
    assert_eq!(with.rows.len(), without.rows.len() + 1);
    assert!(with.value > 0.0);
}

#[test]
fn test_categorical_psi_joins_levels() {
    let a: Vec<Option<String>> = ["A", "A", "B", "B"].iter().map(|s| Some(s.to_string())).collect();
    let b: Vec<Option<String>> = ["A", "B", "B", "C"].iter().map(|s| Some(s.to_string())).collect();
    let report = psi_categorical(&a, &b, &PsiConfig::default(), "grade").unwrap();
    let labels: Vec<&str> = report.rows.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, vec!["A", "B", "C"]);
    assert_eq!(report.rows[2].count_a, 0);
    assert_eq!(report.warnings.len(), 1);
}

#[test]
fn test_psi_frame_dispatches_on_kind() {
    let df_a = common::credit_frame(2000, 1);
    let df_b = common::credit_frame(2000, 2);

    let numeric = psi_frame(&df_a, &df_b, "income", FeatureKind::Float, &PsiConfig::default()).unwrap();
    assert_eq!(numeric.feature, "income");
    assert!(numeric.value < 0.1);

    let categorical =
        psi_frame(&df_a, &df_b, "grade", FeatureKind::Categorical, &PsiConfig::default()).unwrap();
    assert_eq!(categorical.rows.len(), 2);
}

#[test]
fn test_group_count_is_validated() {
    let a = common::sample_values(10, 0.0, 1);
    assert!(matches!(psi(&a, &a, 1), Err(EvalError::ConfigurationError(_))));
}
