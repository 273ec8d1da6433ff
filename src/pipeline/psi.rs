//! Population Stability Index between two samples of one feature
//!
//! Both samples are grouped with the same boundaries, computed over the union
//! of their value ranges, so occupancy fractions line up group for group.
//! Groups seen in only one sample are kept with zero occupancy on the other
//! side, and zero occupancy is either floored to `epsilon` or rejected.

use std::collections::BTreeMap;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result, Warning};
use crate::pipeline::binning::{
    assign_categories, equal_width_bins, present_values, validate_group_count, value_range, GroupId,
    DEFAULT_GROUP_COUNT,
};
use crate::pipeline::frame::{categorical_column, numeric_column};
use crate::pipeline::schema::FeatureKind;

/// Default occupancy floor applied before the log-ratio
pub const DEFAULT_EPSILON: f64 = 1e-4;

/// Handling of a group that is empty in one of the two samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZeroOccupancy {
    /// Raise the fraction to `epsilon` and report a [`Warning`]
    #[default]
    Smooth,
    /// Fail with [`EvalError::NumericalInstability`]
    Error,
}

impl std::str::FromStr for ZeroOccupancy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "smooth" => Ok(ZeroOccupancy::Smooth),
            "error" | "raise" => Ok(ZeroOccupancy::Error),
            _ => Err(format!(
                "Unknown zero-occupancy policy: '{}'. Use 'smooth' or 'error'.",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PsiConfig {
    /// Equal-width groups over the union range (>= 2)
    pub group_count: usize,
    /// Count missing values as their own group
    pub include_missing: bool,
    pub zero_occupancy: ZeroOccupancy,
    /// Occupancy floor, in (0, 1)
    pub epsilon: f64,
}

impl Default for PsiConfig {
    fn default() -> Self {
        Self {
            group_count: DEFAULT_GROUP_COUNT,
            include_missing: false,
            zero_occupancy: ZeroOccupancy::Smooth,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl PsiConfig {
    pub fn new(group_count: usize) -> Self {
        Self {
            group_count,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_group_count(self.group_count)?;
        if !(self.epsilon > 0.0 && self.epsilon < 1.0) {
            return Err(EvalError::config(format!(
                "epsilon must be in (0, 1), got {}",
                self.epsilon
            )));
        }
        Ok(())
    }
}

/// One group of the PSI table
#[derive(Debug, Clone, Serialize)]
pub struct PsiRow {
    pub group: GroupId,
    /// Value range (`[lo, hi)`), category name or `MISSING`
    pub label: String,
    pub count_a: usize,
    pub count_b: usize,
    /// Occupancy fraction in sample A (before any floor)
    pub frac_a: f64,
    pub frac_b: f64,
    /// `(frac_b - frac_a) * ln(frac_b / frac_a)` on floored fractions
    pub psi: f64,
}

/// PSI value with its per-group table
#[derive(Debug, Clone, Serialize)]
pub struct PsiReport {
    pub feature: String,
    pub value: f64,
    pub rows: Vec<PsiRow>,
    pub warnings: Vec<Warning>,
}

/// PSI of a numeric feature with default settings and `group_count` groups.
pub fn psi(sample_a: &[Option<f64>], sample_b: &[Option<f64>], group_count: usize) -> Result<f64> {
    psi_with_config(sample_a, sample_b, &PsiConfig::new(group_count), "<values>").map(|r| r.value)
}

/// PSI of a numeric feature; `feature` only labels the report and errors.
pub fn psi_with_config(
    sample_a: &[Option<f64>],
    sample_b: &[Option<f64>],
    config: &PsiConfig,
    feature: &str,
) -> Result<PsiReport> {
    config.validate()?;

    let present_a = present_values(sample_a, feature)?;
    let present_b = present_values(sample_b, feature)?;
    if present_a.is_empty() || present_b.is_empty() {
        return Err(EvalError::invalid(format!(
            "Feature '{}' has no non-missing values in one of the samples",
            feature
        )));
    }

    let (min_a, max_a) = value_range(&present_a);
    let (min_b, max_b) = value_range(&present_b);
    let bins = equal_width_bins(min_a.min(min_b), max_a.max(max_b), config.group_count, feature)?;

    let group_of = |v: &Option<f64>| match v {
        Some(x) if !x.is_nan() => GroupId::Bin(bins.assign(*x)),
        _ => GroupId::Missing,
    };
    let groups_a: Vec<GroupId> = sample_a.iter().map(group_of).collect();
    let groups_b: Vec<GroupId> = sample_b.iter().map(group_of).collect();

    let label = |g: GroupId| match g {
        GroupId::Bin(i) => match bins.bounds(i) {
            Some((lo, hi)) => format!("[{:.4}, {:.4})", lo, hi),
            None => i.to_string(),
        },
        GroupId::Missing => g.to_string(),
    };

    build_report(feature, &groups_a, &groups_b, label, config)
}

/// PSI of a categorical feature: categories of both samples form the groups.
pub fn psi_categorical(
    sample_a: &[Option<String>],
    sample_b: &[Option<String>],
    config: &PsiConfig,
    feature: &str,
) -> Result<PsiReport> {
    config.validate()?;

    let mut levels: Vec<String> = sample_a.iter().chain(sample_b.iter()).flatten().cloned().collect();
    levels.sort();
    levels.dedup();
    if levels.is_empty() {
        return Err(EvalError::invalid(format!(
            "Feature '{}' has no non-missing categories",
            feature
        )));
    }

    let a = assign_categories(levels, sample_a);
    let b = assign_categories(a.levels.clone(), sample_b);

    let label = |g: GroupId| match g {
        GroupId::Bin(i) => a.levels.get(i).cloned().unwrap_or_else(|| i.to_string()),
        GroupId::Missing => g.to_string(),
    };

    build_report(feature, &a.groups, &b.groups, label, config)
}

/// PSI of one column shared by two frames, dispatching on its kind.
pub fn psi_frame(
    df_a: &DataFrame,
    df_b: &DataFrame,
    feature: &str,
    kind: FeatureKind,
    config: &PsiConfig,
) -> Result<PsiReport> {
    match kind {
        FeatureKind::Categorical => psi_categorical(
            &categorical_column(df_a, feature)?,
            &categorical_column(df_b, feature)?,
            config,
            feature,
        ),
        FeatureKind::Integer | FeatureKind::Float => psi_with_config(
            &numeric_column(df_a, feature)?,
            &numeric_column(df_b, feature)?,
            config,
            feature,
        ),
    }
}

fn build_report(
    feature: &str,
    groups_a: &[GroupId],
    groups_b: &[GroupId],
    label: impl Fn(GroupId) -> String,
    config: &PsiConfig,
) -> Result<PsiReport> {
    let considered = |g: &&GroupId| config.include_missing || **g != GroupId::Missing;

    // Outer join on group id
    let mut counts: BTreeMap<GroupId, (usize, usize)> = BTreeMap::new();
    for g in groups_a.iter().filter(considered) {
        counts.entry(*g).or_insert((0, 0)).0 += 1;
    }
    for g in groups_b.iter().filter(considered) {
        counts.entry(*g).or_insert((0, 0)).1 += 1;
    }

    let total_a: usize = counts.values().map(|c| c.0).sum();
    let total_b: usize = counts.values().map(|c| c.1).sum();
    if total_a == 0 || total_b == 0 {
        return Err(EvalError::invalid(format!(
            "Feature '{}' has no considered records in one of the samples",
            feature
        )));
    }

    let mut floored = 0usize;
    let mut rows = Vec::with_capacity(counts.len());
    for (group, (count_a, count_b)) in counts {
        let frac_a = count_a as f64 / total_a as f64;
        let frac_b = count_b as f64 / total_b as f64;

        let mut floor = |frac: f64| -> Result<f64> {
            if frac >= config.epsilon {
                return Ok(frac);
            }
            match config.zero_occupancy {
                ZeroOccupancy::Smooth => {
                    floored += 1;
                    Ok(config.epsilon)
                }
                ZeroOccupancy::Error => Err(EvalError::NumericalInstability(format!(
                    "Group {} of feature '{}' has occupancy {} in one sample; log-ratio undefined",
                    group, feature, frac
                ))),
            }
        };
        let a = floor(frac_a)?;
        let b = floor(frac_b)?;

        rows.push(PsiRow {
            group,
            label: label(group),
            count_a,
            count_b,
            frac_a,
            frac_b,
            psi: (b - a) * (b / a).ln(),
        });
    }

    let value = rows.iter().map(|r| r.psi).sum();
    let warnings = if floored > 0 {
        vec![Warning::OccupancySmoothed {
            groups: floored,
            epsilon: config.epsilon,
        }]
    } else {
        Vec::new()
    };

    Ok(PsiReport {
        feature: feature.to_string(),
        value,
        rows,
        warnings,
    })
}
