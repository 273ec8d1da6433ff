//! Dataset loader for CSV and Parquet files

use anyhow::{Context, Result};
use polars::prelude::*;
use std::path::Path;

use crate::pipeline::schema::Schema;
use crate::utils::{create_spinner, finish_with_success};

/// Load a dataset from a file (CSV or Parquet based on extension)
pub fn load_dataset(path: &Path) -> Result<LazyFrame> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let lf = match extension.as_str() {
        "csv" => LazyCsvReader::new(path)
            .with_has_header(true)
            .finish()
            .with_context(|| format!("Failed to load CSV file: {}", path.display()))?,
        "parquet" => LazyFrame::scan_parquet(path, Default::default())
            .with_context(|| format!("Failed to load Parquet file: {}", path.display()))?,
        _ => anyhow::bail!(
            "Unsupported file format: {}. Supported formats: csv, parquet",
            extension
        ),
    };

    Ok(lf)
}

/// Read a declared schema (`{"feature": "integer" | "float" | "categorical"}`).
pub fn load_schema(path: &Path) -> Result<Schema> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema file: {}", path.display()))?;
    Schema::from_json_str(&json).with_context(|| format!("Invalid schema file: {}", path.display()))
}

/// Collect a dataset and resolve its feature schema once.
///
/// With a declared schema the columns are validated and cast to their
/// declared kinds; otherwise kinds follow the storage dtypes. `exclude` names
/// non-feature columns (label, weight).
pub fn load_sample(path: &Path, schema: Option<&Schema>, exclude: &[&str]) -> Result<(DataFrame, Schema)> {
    let spinner = create_spinner(&format!("Loading {}", path.display()));
    let df = load_dataset(path)?
        .collect()
        .with_context(|| format!("Failed to read rows from {}", path.display()))?;

    let (df, schema) = match schema {
        Some(declared) => {
            let typed = declared
                .apply(&df)
                .with_context(|| format!("Schema does not match {}", path.display()))?;
            (typed, declared.clone())
        }
        None => {
            let derived = Schema::from_frame(&df, exclude);
            (df, derived)
        }
    };

    finish_with_success(
        &spinner,
        &format!("Loaded {} rows x {} columns", df.height(), df.width()),
    );
    Ok((df, schema))
}
