//! Typed column access over polars DataFrames

use polars::prelude::*;

use crate::error::{EvalError, Result};

/// Read a column as optional `f64` values (nulls stay `None`).
pub fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let col = df
        .column(name)
        .map_err(|_| EvalError::invalid(format!("Column '{}' not found", name)))?;

    if !col.dtype().is_primitive_numeric() && col.dtype() != &DataType::Boolean {
        return Err(EvalError::invalid(format!(
            "Column '{}' has dtype {} and cannot be read as numeric",
            name,
            col.dtype()
        )));
    }

    let float_col = col.cast(&DataType::Float64)?;
    Ok(float_col.f64()?.into_iter().collect())
}

/// Read a column as optional category labels.
pub fn categorical_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let col = df
        .column(name)
        .map_err(|_| EvalError::invalid(format!("Column '{}' not found", name)))?;
    let string_col = col.cast(&DataType::String)?;
    Ok(string_col
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect())
}

/// Column names in frame order, skipping `exclude` (label, weight, ids).
pub fn feature_names(df: &DataFrame, exclude: &[&str]) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|s| s.to_string())
        .filter(|name| !exclude.contains(&name.as_str()))
        .collect()
}
