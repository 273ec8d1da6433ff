//! Binary label extraction
//!
//! Labels are `1` for a bad outcome (the positive class) and `0` for good.
//! Columns that are not already 0/1 can be mapped with a [`LabelMapping`].

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};

/// Tolerance for floating point comparison when checking binary 0/1 values
const TOLERANCE: f64 = 1e-9;

/// Mapping from raw label values to bad (1) / good (0)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelMapping {
    /// Value that maps to 1 (bad)
    pub bad_value: String,
    /// Value that maps to 0 (good)
    pub good_value: String,
}

impl LabelMapping {
    pub fn new(bad_value: impl Into<String>, good_value: impl Into<String>) -> Self {
        Self {
            bad_value: bad_value.into(),
            good_value: good_value.into(),
        }
    }
}

/// Validate that the label column is binary (contains only 0 and 1)
///
/// Handles integer and float storage (0.0/1.0 within tolerance); nulls are
/// tolerated here and rejected later by [`require_complete`] where the label
/// must be present.
pub fn validate_binary_label(df: &DataFrame, label: &str) -> Result<()> {
    let label_col = df
        .column(label)
        .map_err(|_| EvalError::invalid(format!("Label column '{}' not found", label)))?;

    if label_col.len() == 0 {
        return Err(EvalError::invalid(format!("Label column '{}' is empty", label)));
    }

    if label_col.null_count() == label_col.len() {
        return Err(EvalError::invalid(format!(
            "Label column '{}' contains only null values",
            label
        )));
    }

    if !label_col.dtype().is_primitive_numeric() && label_col.dtype() != &DataType::Boolean {
        return Err(EvalError::invalid(format!(
            "Label column '{}' has dtype {}; supply a LabelMapping for non-numeric labels",
            label,
            label_col.dtype()
        )));
    }

    let float_col = label_col.cast(&DataType::Float64)?;
    let unique = float_col.unique()?;
    let unique_values: Vec<f64> = unique.f64()?.into_iter().flatten().collect();

    let valid = unique_values.len() <= 2
        && unique_values
            .iter()
            .all(|&v| v.abs() < TOLERANCE || (v - 1.0).abs() < TOLERANCE);

    if !valid {
        return Err(EvalError::invalid(format!(
            "Label column '{}' must be binary (0/1). Found {} unique values: {:?}",
            label,
            unique_values.len(),
            unique_values
        )));
    }

    Ok(())
}

/// Extract labels as `Some(0)`/`Some(1)`, `None` for null or unmapped values.
pub fn extract_labels(
    df: &DataFrame,
    label: &str,
    mapping: Option<&LabelMapping>,
) -> Result<Vec<Option<u8>>> {
    match mapping {
        None => {
            validate_binary_label(df, label)?;
            let float_col = df.column(label)?.cast(&DataType::Float64)?;
            Ok(float_col
                .f64()?
                .into_iter()
                .map(|v| v.map(|x| if (x - 1.0).abs() < TOLERANCE { 1 } else { 0 }))
                .collect())
        }
        Some(mapping) => {
            let label_col = df
                .column(label)
                .map_err(|_| EvalError::invalid(format!("Label column '{}' not found", label)))?;
            let string_col = label_col.cast(&DataType::String)?;
            Ok(string_col
                .str()?
                .into_iter()
                .map(|v| match v {
                    Some(s) if s == mapping.bad_value => Some(1),
                    Some(s) if s == mapping.good_value => Some(0),
                    _ => None,
                })
                .collect())
        }
    }
}

/// Labels for supervised fitting: every record must carry one.
pub fn require_complete(labels: &[Option<u8>]) -> Result<Vec<u8>> {
    labels
        .iter()
        .enumerate()
        .map(|(i, l)| {
            l.ok_or_else(|| EvalError::invalid(format!("Label is missing for record {}", i)))
        })
        .collect()
}

/// Count of (bad, good) among present labels
pub fn label_counts(labels: &[Option<u8>]) -> (usize, usize) {
    labels.iter().flatten().fold((0, 0), |(bad, good), &l| {
        if l == 1 {
            (bad + 1, good)
        } else {
            (bad, good + 1)
        }
    })
}
