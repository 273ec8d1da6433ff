//! Integration tests for the binner

use ftreval::error::EvalError;
use ftreval::pipeline::{
    bin, bin_with_config, bin_categories, BinningConfig, BinningStrategy, DuplicatePolicy, GroupId,
};

#[path = "common/mod.rs"]
mod common;

#[test]
fn test_equal_frequency_groups_are_balanced() {
    let values = common::sample_values(1000, 0.0, 3);
    for g in [2, 4, 7, 10] {
        let assignment = bin(&values, g, BinningStrategy::EqualFrequency).unwrap();
        let sizes = assignment.group_sizes();
        assert_eq!(sizes.len(), g, "expected {} groups", g);
        let target = 1000.0 / g as f64;
        for (group, size) in sizes {
            assert!(
                (size as f64 - target).abs() <= 1.0,
                "group {} of {} holds {} records",
                group,
                g,
                size
            );
        }
    }
}

#[test]
fn test_heavy_ties_unbalance_equal_frequency_groups() {
    let values: Vec<Option<f64>> = [0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 2.0, 3.0]
        .iter()
        .map(|v| Some(*v))
        .collect();
    let assignment = bin(&values, 2, BinningStrategy::EqualFrequency).unwrap();
    assert_eq!(assignment.bins.group_count(), 2);
    let sizes = assignment.group_sizes();
    assert_eq!(sizes.get(&GroupId::Bin(0)), Some(&8));
    assert_eq!(sizes.get(&GroupId::Bin(1)), Some(&2));
}

#[test]
fn test_groups_are_ordered_by_value() {
    let values = common::sample_values(500, 0.0, 5);
    let assignment = bin(&values, 5, BinningStrategy::EqualFrequency).unwrap();
    let mut max_per_group = vec![f64::NEG_INFINITY; 5];
    let mut min_per_group = vec![f64::INFINITY; 5];
    for (v, g) in values.iter().zip(&assignment.groups) {
        if let (Some(v), GroupId::Bin(g)) = (v, g) {
            max_per_group[*g] = max_per_group[*g].max(*v);
            min_per_group[*g] = min_per_group[*g].min(*v);
        }
    }
    for g in 1..5 {
        assert!(max_per_group[g - 1] < min_per_group[g]);
    }
}

#[test]
fn test_equal_width_includes_maximum() {
    let values: Vec<Option<f64>> = (0..=10).map(|i| Some(i as f64)).collect();
    let assignment = bin(&values, 5, BinningStrategy::EqualWidth).unwrap();
    assert_eq!(assignment.groups[0], GroupId::Bin(0));
    assert_eq!(assignment.groups[10], GroupId::Bin(4));
    assert_eq!(assignment.bins.group_count(), 5);
}

#[test]
fn test_missing_values_get_their_own_group() {
    let values = vec![Some(1.0), None, Some(2.0), Some(f64::NAN), Some(3.0), Some(4.0)];
    let assignment = bin(&values, 2, BinningStrategy::EqualWidth).unwrap();
    assert_eq!(assignment.missing_count(), 2);
    assert_eq!(assignment.groups[1], GroupId::Missing);
    assert_eq!(assignment.groups[3], GroupId::Missing);
}

#[test]
fn test_constant_feature_fails_for_both_strategies() {
    let values = vec![Some(7.0); 20];
    for strategy in [BinningStrategy::EqualWidth, BinningStrategy::EqualFrequency] {
        let err = bin(&values, 4, strategy).unwrap_err();
        assert!(matches!(err, EvalError::DegenerateFeature { .. }));
    }
}

#[test]
fn test_repeated_values_follow_duplicate_policy() {
    // 80% zeros: most quantile edges coincide
    let values: Vec<Option<f64>> = (0..100).map(|i| Some(if i < 80 { 0.0 } else { i as f64 })).collect();

    let strict = BinningConfig::new(10, BinningStrategy::EqualFrequency);
    assert!(matches!(
        bin_with_config(&values, &strict, "balance"),
        Err(EvalError::DegenerateFeature { .. })
    ));

    let dropped = bin_with_config(&values, &strict.clone().with_duplicates(DuplicatePolicy::Drop), "balance").unwrap();
    assert!(dropped.bins.group_count() < 10);
    // Every zero shares the first group
    assert!(values
        .iter()
        .zip(&dropped.groups)
        .filter(|(v, _)| **v == Some(0.0))
        .all(|(_, g)| *g == GroupId::Bin(0)));

    let kept = bin_with_config(&values, &strict.with_duplicates(DuplicatePolicy::Keep), "balance").unwrap();
    assert_eq!(kept.bins.group_count(), 10);
    assert!(kept.group_sizes().len() < 10);
}

#[test]
fn test_group_count_below_two_is_configuration_error() {
    let values = common::sample_values(10, 0.0, 1);
    assert!(matches!(
        bin(&values, 1, BinningStrategy::EqualWidth),
        Err(EvalError::ConfigurationError(_))
    ));
}

#[test]
fn test_categories_form_sorted_groups() {
    let values = vec![Some("B".to_string()), Some("A".to_string()), None, Some("B".to_string())];
    let assignment = bin_categories(&values);
    assert_eq!(assignment.levels, vec!["A", "B"]);
    assert_eq!(
        assignment.groups,
        vec![GroupId::Bin(1), GroupId::Bin(0), GroupId::Missing, GroupId::Bin(1)]
    );
}
