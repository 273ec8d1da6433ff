//! Declared feature typing
//!
//! Every feature carries a fixed [`FeatureKind`], either declared up front in
//! a JSON mapping (`{"age": "integer", "region": "categorical"}`) or derived
//! once from the storage dtypes of the loaded frame. Validators check a column
//! against its declared kind and report typed failures.

use std::collections::BTreeMap;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};

/// Declared type tag of one feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Integer,
    Float,
    Categorical,
}

impl FeatureKind {
    /// Kind implied by a storage dtype, `None` for nested/temporal types.
    pub fn from_dtype(dtype: &DataType) -> Option<FeatureKind> {
        if dtype.is_integer() || dtype == &DataType::Boolean {
            Some(FeatureKind::Integer)
        } else if dtype.is_float() {
            Some(FeatureKind::Float)
        } else if dtype.is_string() || dtype.is_categorical() || dtype.is_enum() {
            Some(FeatureKind::Categorical)
        } else {
            None
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, FeatureKind::Categorical)
    }
}

impl std::fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureKind::Integer => write!(f, "integer"),
            FeatureKind::Float => write!(f, "float"),
            FeatureKind::Categorical => write!(f, "categorical"),
        }
    }
}

impl std::str::FromStr for FeatureKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "integer" | "int" => Ok(FeatureKind::Integer),
            "float" | "double" => Ok(FeatureKind::Float),
            "categorical" | "category" | "str" | "string" => Ok(FeatureKind::Categorical),
            _ => Err(format!(
                "Unknown feature kind: '{}'. Use 'integer', 'float' or 'categorical'.",
                s
            )),
        }
    }
}

/// Feature name to kind, resolved once per dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    kinds: BTreeMap<String, FeatureKind>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feature(mut self, name: impl Into<String>, kind: FeatureKind) -> Self {
        self.kinds.insert(name.into(), kind);
        self
    }

    /// Parse a JSON declaration (`{"feature": "integer" | "float" | "categorical"}`).
    pub fn from_json_str(json: &str) -> Result<Schema> {
        serde_json::from_str(json)
            .map_err(|e| EvalError::config(format!("Invalid schema declaration: {}", e)))
    }

    /// Derive kinds from the frame's storage dtypes, skipping `exclude`.
    ///
    /// Columns whose dtype maps to no kind (dates, lists) are left out.
    pub fn from_frame(df: &DataFrame, exclude: &[&str]) -> Schema {
        let kinds = df
            .get_columns()
            .iter()
            .filter(|c| !exclude.contains(&c.name().as_str()))
            .filter_map(|c| FeatureKind::from_dtype(c.dtype()).map(|k| (c.name().to_string(), k)))
            .collect();
        Schema { kinds }
    }

    pub fn kind(&self, name: &str) -> Option<FeatureKind> {
        self.kinds.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, FeatureKind)> {
        self.kinds.iter().map(|(n, k)| (n.as_str(), *k))
    }

    /// Declared features in `df` column order whose kind is numeric.
    pub fn numeric_features(&self, df: &DataFrame) -> Vec<String> {
        self.features_in_frame_order(df, |k| k.is_numeric())
    }

    pub fn categorical_features(&self, df: &DataFrame) -> Vec<String> {
        self.features_in_frame_order(df, |k| !k.is_numeric())
    }

    fn features_in_frame_order(&self, df: &DataFrame, keep: impl Fn(FeatureKind) -> bool) -> Vec<String> {
        df.get_column_names()
            .iter()
            .filter_map(|n| {
                self.kind(n.as_str())
                    .filter(|k| keep(*k))
                    .map(|_| n.to_string())
            })
            .collect()
    }

    /// Check every declared feature exists in `df` and matches its kind.
    pub fn validate(&self, df: &DataFrame) -> Result<()> {
        for (name, kind) in self.iter() {
            validate_column(df, name, kind)?;
        }
        Ok(())
    }

    /// Cast declared columns to their canonical dtype
    /// (`Int64`, `Float64` or `String`) after validating them.
    pub fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        self.validate(df)?;
        let mut out = df.clone();
        for (name, kind) in self.iter() {
            let target = match kind {
                FeatureKind::Integer => DataType::Int64,
                FeatureKind::Float => DataType::Float64,
                FeatureKind::Categorical => DataType::String,
            };
            let cast = out.column(name)?.cast(&target)?;
            out.with_column(cast)?;
        }
        Ok(out)
    }
}

/// Validate one column against its declared kind.
///
/// - `integer`: integer or boolean storage, or floats that are all whole numbers
/// - `float`: any numeric storage
/// - `categorical`: string/categorical storage, or integer codes
pub fn validate_column(df: &DataFrame, name: &str, kind: FeatureKind) -> Result<()> {
    let col = df
        .column(name)
        .map_err(|_| EvalError::invalid(format!("Declared feature '{}' not found", name)))?;
    let dtype = col.dtype();

    let mismatch = || {
        EvalError::invalid(format!(
            "Feature '{}' is declared {} but stored as {}",
            name, kind, dtype
        ))
    };

    match kind {
        FeatureKind::Integer => {
            if dtype.is_integer() || dtype == &DataType::Boolean {
                Ok(())
            } else if dtype.is_float() {
                let as_float = col.cast(&DataType::Float64)?;
                let fractional = as_float
                    .f64()?
                    .into_iter()
                    .flatten()
                    .find(|v| v.is_finite() && v.fract() != 0.0);
                match fractional {
                    Some(v) => Err(EvalError::invalid(format!(
                        "Feature '{}' is declared integer but contains {}",
                        name, v
                    ))),
                    None => Ok(()),
                }
            } else {
                Err(mismatch())
            }
        }
        FeatureKind::Float => {
            if dtype.is_primitive_numeric() || dtype == &DataType::Boolean {
                Ok(())
            } else {
                Err(mismatch())
            }
        }
        FeatureKind::Categorical => {
            if dtype.is_string() || dtype.is_categorical() || dtype.is_enum() || dtype.is_integer()
            {
                Ok(())
            } else {
                Err(mismatch())
            }
        }
    }
}
