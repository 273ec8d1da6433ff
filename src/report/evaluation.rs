//! Per-feature evaluation rows
//!
//! Collects profile, KS separation, single-factor z-value and (optionally)
//! PSI against a comparison sample into one row per feature. A diagnostic
//! that fails for one feature (constant values, separable label) is noted on
//! that row instead of aborting the whole evaluation.

use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, Warning};
use crate::pipeline::{
    extract_labels, ks_named, numeric_column, prescreen, profile_features, psi_frame, significance_named,
    DropReason, FeatureKind, KsConfig, LabelMapping, PrescreenConfig, PsiConfig, Schema,
};

/// Settings for [`evaluate_features`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub ks: KsConfig,
    pub psi: PsiConfig,
    pub prescreen: PrescreenConfig,
    /// Fit the single-factor model with a constant
    pub include_intercept: bool,
}

/// Diagnostics of one feature
#[derive(Debug, Clone, Serialize)]
pub struct FeatureEvaluation {
    pub feature: String,
    pub kind: FeatureKind,
    pub coverage_rate: f64,
    pub distinct: usize,
    pub dominant_share: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_ks: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psi: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drop_reason: Option<DropReason>,
    /// Diagnostics that could not be computed, and why
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl FeatureEvaluation {
    pub fn is_dropped(&self) -> bool {
        self.drop_reason.is_some()
    }
}

/// Evaluate every feature of `schema` against `label`.
///
/// KS and z-values are computed for numeric features only; PSI is computed
/// for every feature when `compare` is given. Rows keep schema order.
pub fn evaluate_features(
    df: &DataFrame,
    schema: &Schema,
    label: &str,
    mapping: Option<&LabelMapping>,
    compare: Option<&DataFrame>,
    config: &EvaluationConfig,
) -> Result<(Vec<FeatureEvaluation>, Vec<Warning>)> {
    let labels = extract_labels(df, label, mapping)?;
    let profiles = profile_features(df, schema)?;
    let drops = prescreen(&profiles, &config.prescreen)?;

    let rows: Vec<(FeatureEvaluation, Vec<Warning>)> = profiles
        .par_iter()
        .map(|profile| {
            let name = profile.name.as_str();
            let mut notes = Vec::new();
            let mut warnings = Vec::new();
            let (mut max_ks, mut z_value, mut psi) = (None, None, None);

            if profile.kind.is_numeric() {
                match numeric_column(df, name) {
                    Ok(values) => {
                        match ks_named(&values, &labels, &config.ks, name) {
                            Ok(report) => max_ks = Some(report.max_ks),
                            Err(e) => notes.push(format!("ks: {}", e)),
                        }
                        match significance_named(&values, &labels, config.include_intercept, name) {
                            Ok(s) => z_value = Some(s.z_value),
                            Err(e) => notes.push(format!("z-value: {}", e)),
                        }
                    }
                    Err(e) => notes.push(e.to_string()),
                }
            }

            if let Some(other) = compare {
                match psi_frame(df, other, name, profile.kind, &config.psi) {
                    Ok(report) => {
                        psi = Some(report.value);
                        warnings.extend(report.warnings);
                    }
                    Err(e) => notes.push(format!("psi: {}", e)),
                }
            }

            let drop_reason = drops.iter().find(|(f, _)| f == name).map(|(_, r)| r.clone());
            let evaluation = FeatureEvaluation {
                feature: name.to_string(),
                kind: profile.kind,
                coverage_rate: profile.coverage_rate,
                distinct: profile.distinct,
                dominant_share: profile.dominant_share,
                max_ks,
                z_value,
                psi,
                drop_reason,
                notes,
            };
            (evaluation, warnings)
        })
        .collect();

    let mut evaluations = Vec::with_capacity(rows.len());
    let mut warnings = Vec::new();
    for (evaluation, w) in rows {
        evaluations.push(evaluation);
        warnings.extend(w);
    }
    Ok((evaluations, warnings))
}
