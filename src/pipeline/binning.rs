//! Discretization of a single feature into ordered, non-overlapping groups
//!
//! Numeric features are split either into equal-width intervals over
//! `[min, max]` or into equal-frequency (quantile) groups. Missing values never
//! enter a numeric range: they are assigned to [`GroupId::Missing`] and the
//! caller decides whether that group takes part in its statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};

/// Default number of groups for PSI/KS tables
pub const DEFAULT_GROUP_COUNT: usize = 10;

/// How group boundaries are placed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BinningStrategy {
    /// `[min, max]` split into intervals of identical width
    EqualWidth,
    /// Quantile cut-points, each group holds roughly `1/group_count` of the values
    #[default]
    EqualFrequency,
}

impl std::fmt::Display for BinningStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinningStrategy::EqualWidth => write!(f, "equal-width"),
            BinningStrategy::EqualFrequency => write!(f, "equal-frequency"),
        }
    }
}

impl std::str::FromStr for BinningStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "equal-width" | "width" => Ok(BinningStrategy::EqualWidth),
            "equal-frequency" | "quantile" => Ok(BinningStrategy::EqualFrequency),
            _ => Err(format!(
                "Unknown binning strategy: '{}'. Use 'equal-width' or 'equal-frequency'.",
                s
            )),
        }
    }
}

/// What to do when two quantile cut-points coincide (heavily repeated values)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Keep every requested group id; collapsed groups stay empty
    Keep,
    /// Remove duplicate edges and return fewer groups
    Drop,
    /// Fail with [`EvalError::DegenerateFeature`]
    #[default]
    Error,
}

impl std::fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuplicatePolicy::Keep => write!(f, "keep"),
            DuplicatePolicy::Drop => write!(f, "drop"),
            DuplicatePolicy::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keep" => Ok(DuplicatePolicy::Keep),
            "drop" => Ok(DuplicatePolicy::Drop),
            "error" | "raise" => Ok(DuplicatePolicy::Error),
            _ => Err(format!(
                "Unknown duplicates policy: '{}'. Use 'keep', 'drop' or 'error'.",
                s
            )),
        }
    }
}

/// Binning options recognized by every binning-based diagnostic
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BinningConfig {
    /// Requested number of groups (>= 2)
    pub group_count: usize,
    pub strategy: BinningStrategy,
    pub duplicates: DuplicatePolicy,
    /// Whether the MISSING group takes part in downstream statistics
    pub include_missing: bool,
}

impl Default for BinningConfig {
    fn default() -> Self {
        Self {
            group_count: DEFAULT_GROUP_COUNT,
            strategy: BinningStrategy::EqualFrequency,
            duplicates: DuplicatePolicy::Error,
            include_missing: false,
        }
    }
}

impl BinningConfig {
    pub fn new(group_count: usize, strategy: BinningStrategy) -> Self {
        Self {
            group_count,
            strategy,
            ..Default::default()
        }
    }

    pub fn with_duplicates(mut self, duplicates: DuplicatePolicy) -> Self {
        self.duplicates = duplicates;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_group_count(self.group_count)
    }
}

pub(crate) fn validate_group_count(group_count: usize) -> Result<()> {
    if group_count < 2 {
        return Err(EvalError::config(format!(
            "group_count must be at least 2, got {}",
            group_count
        )));
    }
    Ok(())
}

/// Identifier of one group
///
/// Numeric groups are ranked from the lowest value range (`Bin(0)`) upwards;
/// the missing group sorts after every numeric group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupId {
    Bin(usize),
    Missing,
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupId::Bin(i) => write!(f, "{}", i),
            GroupId::Missing => write!(f, "MISSING"),
        }
    }
}

impl Serialize for GroupId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            GroupId::Bin(i) => serializer.serialize_u64(*i as u64),
            GroupId::Missing => serializer.serialize_str("MISSING"),
        }
    }
}

/// Group boundaries derived from one set of values
///
/// Equal-width groups are `[edges[i], edges[i + 1])` with the last upper edge
/// placed one ulp above the maximum. Equal-frequency groups are right-closed
/// `(edges[i], edges[i + 1]]` with the lowest edge inclusive, so identical
/// values always share a group. Values outside the edges are clamped into the
/// first or last group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericBins {
    pub strategy: BinningStrategy,
    pub edges: Vec<f64>,
}

impl NumericBins {
    /// Number of groups (one fewer than the number of edges)
    pub fn group_count(&self) -> usize {
        self.edges.len().saturating_sub(1)
    }

    /// Lower and upper boundary of group `group`
    pub fn bounds(&self, group: usize) -> Option<(f64, f64)> {
        if group + 1 < self.edges.len() {
            Some((self.edges[group], self.edges[group + 1]))
        } else {
            None
        }
    }

    /// Group index for a non-missing value
    pub fn assign(&self, value: f64) -> usize {
        let interior = &self.edges[1..self.edges.len() - 1];
        match self.strategy {
            BinningStrategy::EqualWidth => interior.partition_point(|&e| e <= value),
            BinningStrategy::EqualFrequency => interior.partition_point(|&e| e < value),
        }
    }
}

/// Result of binning one feature: a group per record plus the boundaries
#[derive(Debug, Clone)]
pub struct BinAssignment {
    pub bins: NumericBins,
    /// One entry per input record, in input order
    pub groups: Vec<GroupId>,
}

impl BinAssignment {
    /// Records per group, numeric groups first then MISSING (if any)
    pub fn group_sizes(&self) -> BTreeMap<GroupId, usize> {
        let mut sizes = BTreeMap::new();
        for g in &self.groups {
            *sizes.entry(*g).or_insert(0) += 1;
        }
        sizes
    }

    pub fn missing_count(&self) -> usize {
        self.groups.iter().filter(|g| **g == GroupId::Missing).count()
    }
}

/// Bin `values` into `group_count` groups, failing on collapsed quantile edges.
///
/// Identical values always share a group, so heavy ties can leave
/// equal-frequency groups unbalanced even when every edge is distinct.
pub fn bin(
    values: &[Option<f64>],
    group_count: usize,
    strategy: BinningStrategy,
) -> Result<BinAssignment> {
    bin_with_config(values, &BinningConfig::new(group_count, strategy), "<values>")
}

/// Bin `values` according to `config`; `feature` only labels errors.
pub fn bin_with_config(
    values: &[Option<f64>],
    config: &BinningConfig,
    feature: &str,
) -> Result<BinAssignment> {
    let present = present_values(values, feature)?;
    let bins = compute_bins(&present, config, feature)?;

    let groups = values
        .iter()
        .map(|v| match v {
            Some(x) if !x.is_nan() => GroupId::Bin(bins.assign(*x)),
            _ => GroupId::Missing,
        })
        .collect();

    Ok(BinAssignment { bins, groups })
}

/// Compute group boundaries for a set of non-missing values.
pub fn compute_bins(values: &[f64], config: &BinningConfig, feature: &str) -> Result<NumericBins> {
    config.validate()?;

    if values.is_empty() {
        return Err(EvalError::invalid(format!(
            "Feature '{}' has no non-missing values to bin",
            feature
        )));
    }

    match config.strategy {
        BinningStrategy::EqualWidth => {
            let (min, max) = value_range(values);
            equal_width_bins(min, max, config.group_count, feature)
        }
        BinningStrategy::EqualFrequency => {
            let mut sorted = values.to_vec();
            sorted.sort_by(|a, b| a.total_cmp(b));
            quantile_bins(&sorted, config.group_count, config.duplicates, feature)
        }
    }
}

/// Equal-width boundaries over `[min, max]`.
pub fn equal_width_bins(min: f64, max: f64, group_count: usize, feature: &str) -> Result<NumericBins> {
    validate_group_count(group_count)?;

    if max == min {
        return Err(EvalError::degenerate(
            feature,
            format!("constant feature (min == max == {})", min),
        ));
    }

    let step = (max - min) / group_count as f64;
    let mut edges: Vec<f64> = (0..group_count).map(|i| min + step * i as f64).collect();
    edges.push(next_up(max));

    Ok(NumericBins {
        strategy: BinningStrategy::EqualWidth,
        edges,
    })
}

/// Quantile boundaries over already sorted values.
fn quantile_bins(
    sorted: &[f64],
    group_count: usize,
    duplicates: DuplicatePolicy,
    feature: &str,
) -> Result<NumericBins> {
    let n = sorted.len();
    let first = sorted[0];
    let last = sorted[n - 1];

    if first == last {
        return Err(EvalError::degenerate(
            feature,
            format!("constant feature (min == max == {})", first),
        ));
    }

    let mut edges: Vec<f64> = (0..=group_count)
        .map(|k| {
            // Integer numerator keeps positions exact when they land on a record
            let pos = ((n - 1) * k) as f64 / group_count as f64;
            let lo = pos.floor() as usize;
            let frac = pos - lo as f64;
            if frac == 0.0 || lo + 1 >= n {
                sorted[lo]
            } else {
                sorted[lo] + (sorted[lo + 1] - sorted[lo]) * frac
            }
        })
        .collect();

    let duplicated = edges.windows(2).filter(|w| w[0] >= w[1]).count();
    if duplicated > 0 {
        match duplicates {
            DuplicatePolicy::Error => {
                return Err(EvalError::degenerate(
                    feature,
                    format!(
                        "{} quantile edge(s) collapse into their neighbour for {} groups \
                         (heavily repeated values); use duplicates=drop to accept fewer groups",
                        duplicated, group_count
                    ),
                ));
            }
            DuplicatePolicy::Drop => edges.dedup(),
            DuplicatePolicy::Keep => {}
        }
    }

    Ok(NumericBins {
        strategy: BinningStrategy::EqualFrequency,
        edges,
    })
}

/// Collect finite values, rejecting infinities; NaN counts as missing.
pub(crate) fn present_values(values: &[Option<f64>], feature: &str) -> Result<Vec<f64>> {
    let mut present = Vec::with_capacity(values.len());
    for v in values.iter().flatten() {
        if v.is_nan() {
            continue;
        }
        if v.is_infinite() {
            return Err(EvalError::invalid(format!(
                "Feature '{}' contains an infinite value",
                feature
            )));
        }
        present.push(*v);
    }
    Ok(present)
}

pub(crate) fn value_range(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

/// Smallest representable `f64` strictly greater than `x`.
fn next_up(x: f64) -> f64 {
    if x.is_nan() || x == f64::INFINITY {
        return x;
    }
    if x == 0.0 {
        return f64::from_bits(1);
    }
    let bits = x.to_bits();
    if x > 0.0 {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}

/// Categorical grouping: every distinct category becomes one group.
///
/// Levels are sorted so group ids are stable across calls; missing values go
/// to [`GroupId::Missing`].
#[derive(Debug, Clone)]
pub struct CategoryAssignment {
    pub levels: Vec<String>,
    pub groups: Vec<GroupId>,
}

pub fn bin_categories(values: &[Option<String>]) -> CategoryAssignment {
    let mut levels: Vec<String> = values.iter().flatten().cloned().collect();
    levels.sort();
    levels.dedup();
    assign_categories(levels, values)
}

/// Assign `values` onto a fixed, sorted set of `levels`.
///
/// Values absent from `levels` are treated as missing.
pub fn assign_categories(levels: Vec<String>, values: &[Option<String>]) -> CategoryAssignment {
    let groups = values
        .iter()
        .map(|v| match v {
            Some(cat) => levels
                .binary_search(cat)
                .map(GroupId::Bin)
                .unwrap_or(GroupId::Missing),
            None => GroupId::Missing,
        })
        .collect();
    CategoryAssignment { levels, groups }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().map(|v| Some(*v)).collect()
    }

    #[test]
    fn test_equal_frequency_distinct_values_balanced() {
        let values = some(&(0..1000).map(|i| i as f64 * 0.37).collect::<Vec<_>>());
        let assignment = bin(&values, 10, BinningStrategy::EqualFrequency).unwrap();

        let sizes = assignment.group_sizes();
        assert_eq!(sizes.len(), 10);
        for (group, size) in sizes {
            assert!(
                (size as f64 - 100.0).abs() <= 1.0,
                "group {} has {} records",
                group,
                size
            );
        }
    }

    #[test]
    fn test_equal_frequency_uneven_count() {
        let values = some(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        let assignment = bin(&values, 3, BinningStrategy::EqualFrequency).unwrap();
        let sizes: Vec<usize> = assignment.group_sizes().values().copied().collect();
        assert_eq!(sizes.len(), 3);
        assert_eq!(sizes.iter().sum::<usize>(), 7);
        for size in sizes {
            assert!((size as f64 - 7.0 / 3.0).abs() <= 1.0);
        }
    }

    #[test]
    fn test_equal_frequency_ties_fail_by_default() {
        let mut raw = vec![0.0; 80];
        raw.extend((0..20).map(|i| i as f64 + 1.0));
        let result = bin(&some(&raw), 10, BinningStrategy::EqualFrequency);
        assert!(matches!(result, Err(EvalError::DegenerateFeature { .. })));
    }

    #[test]
    fn test_equal_frequency_ties_dropped() {
        let mut raw = vec![0.0; 80];
        raw.extend((0..20).map(|i| i as f64 + 1.0));
        let config = BinningConfig::new(10, BinningStrategy::EqualFrequency)
            .with_duplicates(DuplicatePolicy::Drop);
        let assignment = bin_with_config(&some(&raw), &config, "x").unwrap();

        assert!(assignment.bins.group_count() < 10);
        // All zeros land together
        let zero_groups: std::collections::HashSet<GroupId> = assignment.groups[..80].iter().copied().collect();
        assert_eq!(zero_groups.len(), 1);
    }

    #[test]
    fn test_equal_frequency_ties_kept_leave_empty_groups() {
        let mut raw = vec![0.0; 80];
        raw.extend((0..20).map(|i| i as f64 + 1.0));
        let config = BinningConfig::new(10, BinningStrategy::EqualFrequency)
            .with_duplicates(DuplicatePolicy::Keep);
        let assignment = bin_with_config(&some(&raw), &config, "x").unwrap();

        assert_eq!(assignment.bins.group_count(), 10);
        let used = assignment.group_sizes().len();
        assert!(used < 10, "collapsed groups should be empty, {} used", used);
    }

    #[test]
    fn test_equal_width_includes_maximum() {
        let values = some(&[0.0, 2.5, 5.0, 7.5, 10.0]);
        let assignment = bin(&values, 4, BinningStrategy::EqualWidth).unwrap();

        assert_eq!(assignment.groups[0], GroupId::Bin(0));
        assert_eq!(assignment.groups[1], GroupId::Bin(1));
        assert_eq!(assignment.groups[4], GroupId::Bin(3));
        assert!(assignment.bins.edges[4] > 10.0);
    }

    #[test]
    fn test_constant_feature_is_degenerate() {
        let values = some(&[3.0; 20]);
        for strategy in [BinningStrategy::EqualWidth, BinningStrategy::EqualFrequency] {
            let result = bin(&values, 5, strategy);
            assert!(
                matches!(result, Err(EvalError::DegenerateFeature { .. })),
                "{} should reject constant input",
                strategy
            );
        }
    }

    #[test]
    fn test_missing_values_get_their_own_group() {
        let values = vec![Some(1.0), None, Some(2.0), Some(f64::NAN), Some(3.0), Some(4.0)];
        let assignment = bin(&values, 2, BinningStrategy::EqualWidth).unwrap();
        assert_eq!(assignment.groups[1], GroupId::Missing);
        assert_eq!(assignment.groups[3], GroupId::Missing);
        assert_eq!(assignment.missing_count(), 2);
    }

    #[test]
    fn test_group_count_below_two_rejected() {
        let values = some(&[1.0, 2.0, 3.0]);
        let result = bin(&values, 1, BinningStrategy::EqualFrequency);
        assert!(matches!(result, Err(EvalError::ConfigurationError(_))));
    }

    #[test]
    fn test_all_missing_is_invalid_input() {
        let values = vec![None, None, Some(f64::NAN)];
        let result = bin(&values, 2, BinningStrategy::EqualWidth);
        assert!(matches!(result, Err(EvalError::InvalidInput(_))));
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("quantile".parse::<BinningStrategy>().unwrap(), BinningStrategy::EqualFrequency);
        assert_eq!("Equal-Width".parse::<BinningStrategy>().unwrap(), BinningStrategy::EqualWidth);
        assert!("cart".parse::<BinningStrategy>().is_err());
        assert_eq!("drop".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::Drop);
    }

    #[test]
    fn test_next_up() {
        assert!(next_up(1.0) > 1.0);
        assert!(next_up(-1.0) > -1.0);
        assert!(next_up(0.0) > 0.0);
        assert_eq!(next_up(1.0), 1.0 + f64::EPSILON);
    }

    #[test]
    fn test_categories_sorted_levels() {
        let values = vec![Some("b".to_string()), None, Some("a".to_string()), Some("b".to_string())];
        let assignment = bin_categories(&values);
        assert_eq!(assignment.levels, vec!["a", "b"]);
        assert_eq!(
            assignment.groups,
            vec![GroupId::Bin(1), GroupId::Missing, GroupId::Bin(0), GroupId::Bin(1)]
        );
    }
}
