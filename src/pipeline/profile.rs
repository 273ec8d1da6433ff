//! Per-feature coverage profile and pre-screen
//!
//! Summarizes each declared feature (coverage, distinct values, dominance of
//! the most frequent value and a kind-specific distribution) and lists the
//! features too sparse or too concentrated to be worth evaluating.

use std::collections::HashMap;

use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};
use crate::pipeline::binning::{compute_bins, BinningConfig, BinningStrategy};
use crate::pipeline::frame::{categorical_column, numeric_column};
use crate::pipeline::schema::{FeatureKind, Schema};
use crate::utils::create_progress_bar;

/// Groups used for the float occupancy histogram
const HISTOGRAM_GROUPS: usize = 10;

/// Kind-specific distribution summary
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Distribution {
    /// Share of exact 0 and 1 values among present values
    Integer { zero_share: f64, one_share: f64 },
    /// Equal-width occupancy fractions, `None` for a constant feature
    Float { histogram: Option<Vec<f64>> },
    /// The two most frequent categories with their shares
    Categorical { top: Vec<(String, f64)> },
}

/// Coverage summary of one feature
#[derive(Debug, Clone, Serialize)]
pub struct FeatureProfile {
    pub name: String,
    pub kind: FeatureKind,
    pub rows: usize,
    /// Fraction of records with a value (1 - missing_rate)
    pub coverage_rate: f64,
    pub missing_rate: f64,
    /// Number of distinct present values
    pub distinct: usize,
    /// Share of the most frequent present value among present values
    pub dominant_share: f64,
    pub distribution: Distribution,
}

/// Thresholds for [`prescreen`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrescreenConfig {
    /// Features covering fewer records than this are dropped
    pub min_coverage: f64,
    /// Features whose most frequent value exceeds this share are dropped
    pub max_dominance: f64,
}

impl Default for PrescreenConfig {
    fn default() -> Self {
        Self {
            min_coverage: 0.05,
            max_dominance: 0.95,
        }
    }
}

impl PrescreenConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [("min_coverage", self.min_coverage), ("max_dominance", self.max_dominance)] {
            if !(0.0..=1.0).contains(&v) {
                return Err(EvalError::config(format!("{} must be in [0, 1], got {}", name, v)));
            }
        }
        Ok(())
    }
}

/// Why a feature did not pass the pre-screen
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DropReason {
    LowCoverage { coverage_rate: f64 },
    Dominated { dominant_share: f64 },
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::LowCoverage { coverage_rate } => {
                write!(f, "coverage {:.1}%", coverage_rate * 100.0)
            }
            DropReason::Dominated { dominant_share } => {
                write!(f, "single value covers {:.1}%", dominant_share * 100.0)
            }
        }
    }
}

/// Profile one column according to its declared kind.
pub fn profile_feature(df: &DataFrame, name: &str, kind: FeatureKind) -> Result<FeatureProfile> {
    let rows = df.height();
    if rows == 0 {
        return Err(EvalError::invalid("Cannot profile an empty sample"));
    }

    let (present, distinct, dominant, distribution) = match kind {
        FeatureKind::Categorical => {
            let values = categorical_column(df, name)?;
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for v in values.iter().flatten() {
                *counts.entry(v.as_str()).or_insert(0) += 1;
            }
            let present: usize = counts.values().sum();
            let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
            let top = ranked
                .iter()
                .take(2)
                .map(|(cat, c)| (cat.to_string(), share(*c, present)))
                .collect();
            let dominant = ranked.first().map(|(_, c)| *c).unwrap_or(0);
            (present, ranked.len(), dominant, Distribution::Categorical { top })
        }
        FeatureKind::Integer | FeatureKind::Float => {
            let values: Vec<f64> = numeric_column(df, name)?
                .into_iter()
                .flatten()
                .filter(|v| !v.is_nan())
                .collect();
            let mut counts: HashMap<u64, usize> = HashMap::new();
            for v in &values {
                // +0.0 and -0.0 share a key
                *counts.entry((v + 0.0).to_bits()).or_insert(0) += 1;
            }
            let dominant = counts.values().copied().max().unwrap_or(0);
            let present = values.len();
            let distribution = if kind == FeatureKind::Integer {
                let zeros = values.iter().filter(|v| **v == 0.0).count();
                let ones = values.iter().filter(|v| **v == 1.0).count();
                Distribution::Integer {
                    zero_share: share(zeros, present),
                    one_share: share(ones, present),
                }
            } else {
                Distribution::Float {
                    histogram: histogram(&values, name),
                }
            };
            (present, counts.len(), dominant, distribution)
        }
    };

    let coverage_rate = present as f64 / rows as f64;
    Ok(FeatureProfile {
        name: name.to_string(),
        kind,
        rows,
        coverage_rate,
        missing_rate: 1.0 - coverage_rate,
        distinct,
        dominant_share: share(dominant, present),
        distribution,
    })
}

/// Profile every feature of `schema`, in parallel.
pub fn profile_features(df: &DataFrame, schema: &Schema) -> Result<Vec<FeatureProfile>> {
    let features: Vec<(&str, FeatureKind)> = schema.iter().collect();
    features
        .par_iter()
        .map(|(name, kind)| profile_feature(df, name, *kind))
        .collect()
}

/// [`profile_features`] with a progress bar on stdout.
pub fn profile_features_with_progress(df: &DataFrame, schema: &Schema) -> Result<Vec<FeatureProfile>> {
    let features: Vec<(&str, FeatureKind)> = schema.iter().collect();
    let pb = create_progress_bar(features.len() as u64, "Profiling");

    let profiles: Result<Vec<FeatureProfile>> = features
        .par_iter()
        .map(|(name, kind)| {
            let profile = profile_feature(df, name, *kind);
            pb.inc(1);
            profile
        })
        .collect();

    pb.finish_and_clear();
    profiles
}

/// Features that fail the coverage or dominance thresholds.
///
/// Coverage is checked first, so a feature reported as `LowCoverage` may also
/// be dominated.
pub fn prescreen(profiles: &[FeatureProfile], config: &PrescreenConfig) -> Result<Vec<(String, DropReason)>> {
    config.validate()?;
    Ok(profiles
        .iter()
        .filter_map(|p| {
            if p.coverage_rate < config.min_coverage {
                Some((
                    p.name.clone(),
                    DropReason::LowCoverage {
                        coverage_rate: p.coverage_rate,
                    },
                ))
            } else if p.dominant_share > config.max_dominance {
                Some((
                    p.name.clone(),
                    DropReason::Dominated {
                        dominant_share: p.dominant_share,
                    },
                ))
            } else {
                None
            }
        })
        .collect())
}

fn histogram(values: &[f64], name: &str) -> Option<Vec<f64>> {
    let config = BinningConfig::new(HISTOGRAM_GROUPS, BinningStrategy::EqualWidth);
    let bins = compute_bins(values, &config, name).ok()?;
    let mut counts = vec![0usize; bins.group_count()];
    for v in values {
        counts[bins.assign(*v)] += 1;
    }
    Some(counts.into_iter().map(|c| share(c, values.len())).collect())
}

fn share(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataFrame {
        df! {
            "flag" => [Some(0i64), Some(1), Some(0), Some(0), None],
            "amount" => [Some(1.5f64), Some(2.5), None, None, Some(9.0)],
            "region" => [Some("n"), Some("s"), Some("n"), None, Some("e")],
        }
        .unwrap()
    }

    #[test]
    fn test_integer_profile() {
        let p = profile_feature(&sample(), "flag", FeatureKind::Integer).unwrap();
        assert!((p.coverage_rate - 0.8).abs() < 1e-12);
        assert!((p.missing_rate - 0.2).abs() < 1e-12);
        assert_eq!(p.distinct, 2);
        assert!((p.dominant_share - 0.75).abs() < 1e-12);
        assert_eq!(
            p.distribution,
            Distribution::Integer {
                zero_share: 0.75,
                one_share: 0.25
            }
        );
    }

    #[test]
    fn test_float_histogram_sums_to_one() {
        let p = profile_feature(&sample(), "amount", FeatureKind::Float).unwrap();
        match p.distribution {
            Distribution::Float { histogram: Some(h) } => {
                assert_eq!(h.len(), HISTOGRAM_GROUPS);
                assert!((h.iter().sum::<f64>() - 1.0).abs() < 1e-12);
            }
            other => panic!("unexpected distribution {:?}", other),
        }
    }

    #[test]
    fn test_categorical_top_two() {
        let p = profile_feature(&sample(), "region", FeatureKind::Categorical).unwrap();
        assert_eq!(p.distinct, 3);
        match p.distribution {
            Distribution::Categorical { top } => {
                assert_eq!(top[0], ("n".to_string(), 0.5));
                assert_eq!(top.len(), 2);
            }
            other => panic!("unexpected distribution {:?}", other),
        }
    }

    #[test]
    fn test_prescreen_flags_sparse_and_dominated() {
        let df = df! {
            "sparse" => [Some(1.0f64), None, None, None, None, None, None, None, None, None,
                         None, None, None, None, None, None, None, None, None, None, None],
            "stuck" => [0.0f64; 21],
            "ok" => (0..21).map(|i| i as f64).collect::<Vec<_>>(),
        }
        .unwrap();
        let schema = Schema::from_frame(&df, &[]);
        let profiles = profile_features(&df, &schema).unwrap();
        let dropped = prescreen(&profiles, &PrescreenConfig::default()).unwrap();

        let names: Vec<&str> = dropped.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["sparse", "stuck"]);
        assert!(matches!(dropped[0].1, DropReason::LowCoverage { .. }));
        assert!(matches!(dropped[1].1, DropReason::Dominated { .. }));
    }

    #[test]
    fn test_prescreen_rejects_out_of_range_threshold() {
        let config = PrescreenConfig {
            min_coverage: 1.5,
            ..Default::default()
        };
        assert!(matches!(prescreen(&[], &config), Err(EvalError::ConfigurationError(_))));
    }
}
