//! Sample weight extraction and validation

use polars::prelude::*;

use crate::error::{EvalError, Result};
use crate::utils::print_warning;

/// Extract per-row sample weights, `None` when no weight column is given.
///
/// # Arguments
/// * `df` - The DataFrame to extract weights from
/// * `weight_column` - Optional name of the weight column
///
/// # Behavior
/// - Null weights default to 1.0 with a warning
/// - NaN, infinite or negative weights are rejected
pub fn sample_weights(df: &DataFrame, weight_column: Option<&str>) -> Result<Option<Vec<f64>>> {
    let Some(col_name) = weight_column else {
        return Ok(None);
    };

    let column = df
        .column(col_name)
        .map_err(|_| EvalError::invalid(format!("Weight column '{}' not found", col_name)))?;

    if !column.dtype().is_primitive_numeric() {
        return Err(EvalError::invalid(format!(
            "Weight column '{}' must be numeric, found {}",
            col_name,
            column.dtype()
        )));
    }

    let float_col = column.cast(&DataType::Float64)?;
    let mut null_count = 0usize;
    let weights: Vec<f64> = float_col
        .f64()?
        .into_iter()
        .map(|w| match w {
            Some(w) => w,
            None => {
                null_count += 1;
                1.0
            }
        })
        .collect();

    validate_weights(&weights, col_name)?;

    if null_count > 0 {
        print_warning(&format!(
            "Weight column '{}' contains {} null value(s), defaulting to weight 1.0",
            col_name, null_count
        ));
    }

    Ok(Some(weights))
}

/// Reject NaN, infinite, negative or all-zero weights.
pub fn validate_weights(weights: &[f64], name: &str) -> Result<()> {
    for &w in weights {
        if w.is_nan() {
            return Err(EvalError::invalid(format!(
                "Weight column '{}' contains NaN value. All weights must be valid numbers.",
                name
            )));
        }
        if w.is_infinite() {
            return Err(EvalError::invalid(format!(
                "Weight column '{}' contains infinite value. All weights must be finite.",
                name
            )));
        }
        if w < 0.0 {
            return Err(EvalError::invalid(format!(
                "Weight column '{}' contains negative value: {}. All weights must be non-negative.",
                name, w
            )));
        }
    }
    if !weights.is_empty() && total_weight(weights) == 0.0 {
        return Err(EvalError::invalid(format!(
            "Weight column '{}' sums to zero",
            name
        )));
    }
    Ok(())
}

/// Calculate the total weight (sum of all weights).
#[inline]
pub fn total_weight(weights: &[f64]) -> f64 {
    weights.iter().sum()
}
