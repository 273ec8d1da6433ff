//! Single-factor significance
//!
//! Fits `label ~ feature` (optionally with a constant) by unpenalized
//! logistic regression and reports the feature coefficient's Wald
//! z-statistic. Records missing the feature or the label are dropped first.

use faer::Mat;
use polars::prelude::*;
use rayon::prelude::*;
use serde::Serialize;

use crate::error::{EvalError, Result};
use crate::model::linear::irls;
use crate::pipeline::frame::numeric_column;
use crate::pipeline::target::{extract_labels, LabelMapping};

const MAX_ITER: usize = 100;
const TOLERANCE: f64 = 1e-8;

/// Coefficient estimate of one single-factor fit
#[derive(Debug, Clone, Serialize)]
pub struct Significance {
    pub feature: String,
    pub coef: f64,
    pub std_err: f64,
    /// `coef / std_err`
    pub z_value: f64,
    /// Records that entered the fit
    pub records: usize,
}

/// z-value of `values` as the single predictor of `labels`.
pub fn significance(values: &[Option<f64>], labels: &[Option<u8>], include_intercept: bool) -> Result<f64> {
    significance_named(values, labels, include_intercept, "<values>").map(|s| s.z_value)
}

/// [`significance`] with the full coefficient summary.
pub fn significance_named(
    values: &[Option<f64>],
    labels: &[Option<u8>],
    include_intercept: bool,
    feature: &str,
) -> Result<Significance> {
    if values.len() != labels.len() {
        return Err(EvalError::invalid(format!(
            "Feature '{}' has {} values for {} labels",
            feature,
            values.len(),
            labels.len()
        )));
    }

    if let Some(bad) = labels.iter().flatten().find(|l| **l > 1) {
        return Err(EvalError::invalid(format!(
            "Labels must be 0 or 1, found {} (feature '{}')",
            bad, feature
        )));
    }

    let pairs: Vec<(f64, f64)> = values
        .iter()
        .zip(labels)
        .filter_map(|(v, l)| match (v, l) {
            (Some(v), Some(l)) if v.is_finite() => Some((*v, *l as f64)),
            _ => None,
        })
        .collect();
    if pairs.is_empty() {
        return Err(EvalError::invalid(format!(
            "Feature '{}' has no records with both value and label",
            feature
        )));
    }

    let first = pairs[0].0;
    if pairs.iter().all(|(v, _)| *v == first) {
        return Err(EvalError::FitFailure(format!(
            "feature '{}' is constant ({}); its coefficient is not identifiable",
            feature, first
        )));
    }

    let offset = usize::from(include_intercept);
    let design = Mat::from_fn(pairs.len(), 1 + offset, |i, j| {
        if include_intercept && j == 0 {
            1.0
        } else {
            pairs[i].0
        }
    });
    let y: Vec<f64> = pairs.iter().map(|(_, l)| *l).collect();
    let penalty = vec![0.0; 1 + offset];

    let fit = irls(&design, &y, None, &penalty, MAX_ITER, TOLERANCE).map_err(|e| match e {
        EvalError::FitFailure(reason) => EvalError::FitFailure(format!("feature '{}': {}", feature, reason)),
        other => other,
    })?;

    let coef = fit.coef[offset];
    let std_err = fit.std_err[offset];
    Ok(Significance {
        feature: feature.to_string(),
        coef,
        std_err,
        z_value: coef / std_err,
        records: pairs.len(),
    })
}

/// Single-factor significance of every feature against one label, in parallel.
///
/// Each feature keeps its own result so one failing fit does not hide the
/// others.
pub fn significance_frame(
    df: &DataFrame,
    features: &[String],
    label: &str,
    mapping: Option<&LabelMapping>,
    include_intercept: bool,
) -> Result<Vec<(String, Result<Significance>)>> {
    let labels = extract_labels(df, label, mapping)?;
    Ok(features
        .par_iter()
        .map(|f| {
            let result = numeric_column(df, f)
                .and_then(|values| significance_named(&values, &labels, include_intercept, f));
            (f.clone(), result)
        })
        .collect())
}
