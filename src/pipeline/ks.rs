//! Kolmogorov-Smirnov separation of a score over equal-frequency groups
//!
//! Rows of the table run from the highest-risk end: with `ascending = false`
//! the highest-score group comes first. Cumulative counts are kept as
//! integers, so both cumulative rates reach exactly 1.0 on the last row.

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};
use crate::pipeline::binning::{
    compute_bins, BinningConfig, BinningStrategy, DuplicatePolicy, GroupId, DEFAULT_GROUP_COUNT,
};
use crate::pipeline::frame::numeric_column;
use crate::pipeline::target::{extract_labels, LabelMapping};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KsConfig {
    pub group_count: usize,
    /// Accumulate from the lowest score instead of the highest
    pub ascending: bool,
    /// Tied scores never straddle a cut; this decides what happens to the
    /// collapsed cut-points
    pub duplicates: DuplicatePolicy,
}

impl Default for KsConfig {
    fn default() -> Self {
        Self {
            group_count: DEFAULT_GROUP_COUNT,
            ascending: false,
            duplicates: DuplicatePolicy::Drop,
        }
    }
}

impl KsConfig {
    pub fn new(group_count: usize, ascending: bool) -> Self {
        Self {
            group_count,
            ascending,
            ..Default::default()
        }
    }
}

/// One group of the bin statistic table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KsRow {
    pub group: GroupId,
    pub min_value: f64,
    pub max_value: f64,
    pub size: usize,
    pub bad_count: usize,
    pub good_count: usize,
    pub bad_cumsum: usize,
    pub good_cumsum: usize,
    /// `bad_count / size`
    pub bad_rate: f64,
    pub bad_cumsum_rate: f64,
    pub good_cumsum_rate: f64,
    /// `bad_cumsum_rate - good_cumsum_rate`
    pub ks: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct KsReport {
    pub feature: String,
    /// Largest absolute KS over the rows, in `[0, 1]`
    pub max_ks: f64,
    pub total_bad: usize,
    pub total_good: usize,
    pub rows: Vec<KsRow>,
}

/// KS table of `scores` against binary `labels` (1 = bad).
///
/// Records missing either value are dropped first.
pub fn ks(scores: &[Option<f64>], labels: &[Option<u8>], config: &KsConfig) -> Result<KsReport> {
    ks_named(scores, labels, config, "<score>")
}

/// [`ks`] with a feature name for the report and errors.
pub fn ks_named(
    scores: &[Option<f64>],
    labels: &[Option<u8>],
    config: &KsConfig,
    feature: &str,
) -> Result<KsReport> {
    if scores.len() != labels.len() {
        return Err(EvalError::invalid(format!(
            "Score and label lengths differ ({} vs {})",
            scores.len(),
            labels.len()
        )));
    }

    if let Some(bad) = labels.iter().flatten().find(|l| **l > 1) {
        return Err(EvalError::invalid(format!(
            "Labels must be 0 or 1, found {} (feature '{}')",
            bad, feature
        )));
    }

    let mut pairs: Vec<(f64, u8)> = Vec::with_capacity(scores.len());
    for (score, label) in scores.iter().zip(labels) {
        if let (Some(s), Some(l)) = (score, label) {
            if s.is_nan() {
                continue;
            }
            if s.is_infinite() {
                return Err(EvalError::invalid(format!(
                    "Feature '{}' contains an infinite value",
                    feature
                )));
            }
            pairs.push((*s, *l));
        }
    }
    if pairs.is_empty() {
        return Err(EvalError::invalid(format!(
            "Feature '{}' has no records with both score and label",
            feature
        )));
    }

    let total_bad = pairs.iter().filter(|(_, l)| *l == 1).count();
    let total_good = pairs.len() - total_bad;
    if total_bad == 0 || total_good == 0 {
        return Err(EvalError::NumericalInstability(format!(
            "KS of '{}' needs both classes ({} bad, {} good)",
            feature, total_bad, total_good
        )));
    }

    let values: Vec<f64> = pairs.iter().map(|(s, _)| *s).collect();
    let binning = BinningConfig::new(config.group_count, BinningStrategy::EqualFrequency)
        .with_duplicates(config.duplicates);
    let bins = compute_bins(&values, &binning, feature)?;

    #[derive(Clone)]
    struct Acc {
        min: f64,
        max: f64,
        size: usize,
        bad: usize,
    }
    let mut groups = vec![
        Acc {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            size: 0,
            bad: 0,
        };
        bins.group_count()
    ];
    for (score, label) in &pairs {
        let acc = &mut groups[bins.assign(*score)];
        acc.min = acc.min.min(*score);
        acc.max = acc.max.max(*score);
        acc.size += 1;
        acc.bad += *label as usize;
    }

    let mut order: Vec<usize> = (0..groups.len()).filter(|g| groups[*g].size > 0).collect();
    if !config.ascending {
        order.reverse();
    }

    let mut rows = Vec::with_capacity(order.len());
    let (mut bad_cumsum, mut good_cumsum) = (0usize, 0usize);
    for g in order {
        let acc = &groups[g];
        let good = acc.size - acc.bad;
        bad_cumsum += acc.bad;
        good_cumsum += good;
        let bad_cumsum_rate = bad_cumsum as f64 / total_bad as f64;
        let good_cumsum_rate = good_cumsum as f64 / total_good as f64;
        rows.push(KsRow {
            group: GroupId::Bin(g),
            min_value: acc.min,
            max_value: acc.max,
            size: acc.size,
            bad_count: acc.bad,
            good_count: good,
            bad_cumsum,
            good_cumsum,
            bad_rate: acc.bad as f64 / acc.size as f64,
            bad_cumsum_rate,
            good_cumsum_rate,
            ks: bad_cumsum_rate - good_cumsum_rate,
        });
    }

    let max_ks = rows.iter().map(|r| r.ks.abs()).fold(0.0, f64::max);

    Ok(KsReport {
        feature: feature.to_string(),
        max_ks,
        total_bad,
        total_good,
        rows,
    })
}

/// KS of a score column against a label column of the same frame.
pub fn ks_frame(
    df: &DataFrame,
    score: &str,
    label: &str,
    mapping: Option<&LabelMapping>,
    config: &KsConfig,
) -> Result<KsReport> {
    let scores = numeric_column(df, score)?;
    let labels = extract_labels(df, label, mapping)?;
    ks_named(&scores, &labels, config, score)
}
