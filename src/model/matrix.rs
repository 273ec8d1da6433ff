//! Feature matrices with a fixed feature ordering
//!
//! Values are stored row-major as `f64` with `NaN` marking a missing cell.
//! The feature ordering captured here travels with every fitted model and
//! must be reproduced verbatim at predict time.

use polars::prelude::*;

use crate::error::{EvalError, Result};
use crate::pipeline::frame::numeric_column;
use crate::pipeline::target::{extract_labels, require_complete, LabelMapping};
use crate::pipeline::weights::{sample_weights, validate_weights};

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    names: Vec<String>,
    n_rows: usize,
    data: Vec<f64>,
}

impl FeatureMatrix {
    /// Build from per-feature columns, `None` meaning missing.
    pub fn from_columns(names: Vec<String>, columns: Vec<Vec<Option<f64>>>) -> Result<Self> {
        if names.len() != columns.len() {
            return Err(EvalError::invalid(format!(
                "{} feature names for {} columns",
                names.len(),
                columns.len()
            )));
        }
        check_unique(&names)?;

        let n_rows = columns.first().map(|c| c.len()).unwrap_or(0);
        if let Some((i, c)) = columns.iter().enumerate().find(|(_, c)| c.len() != n_rows) {
            return Err(EvalError::invalid(format!(
                "Column '{}' has {} rows, expected {}",
                names[i],
                c.len(),
                n_rows
            )));
        }

        let k = names.len();
        let mut data = vec![f64::NAN; n_rows * k];
        for (j, column) in columns.iter().enumerate() {
            for (i, v) in column.iter().enumerate() {
                if let Some(x) = v {
                    if x.is_infinite() {
                        return Err(EvalError::invalid(format!(
                            "Feature '{}' contains an infinite value",
                            names[j]
                        )));
                    }
                    data[i * k + j] = *x;
                }
            }
        }

        Ok(Self { names, n_rows, data })
    }

    /// Build from rows of dense values (`NaN` for missing).
    pub fn from_rows(names: Vec<String>, rows: &[Vec<f64>]) -> Result<Self> {
        check_unique(&names)?;
        let k = names.len();
        let mut data = Vec::with_capacity(rows.len() * k);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != k {
                return Err(EvalError::invalid(format!(
                    "Row {} has {} values, expected {}",
                    i,
                    row.len(),
                    k
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            names,
            n_rows: rows.len(),
            data,
        })
    }

    /// Numeric feature columns of `df`, in the order given.
    pub fn from_frame(df: &DataFrame, features: &[String]) -> Result<Self> {
        let columns = features
            .iter()
            .map(|f| numeric_column(df, f))
            .collect::<Result<Vec<_>>>()?;
        let mut matrix = Self::from_columns(features.to_vec(), columns)?;
        // A frame with no feature columns still has rows
        if features.is_empty() {
            matrix.n_rows = df.height();
        }
        Ok(matrix)
    }

    pub fn feature_names(&self) -> &[String] {
        &self.names
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_features(&self) -> usize {
        self.names.len()
    }

    pub fn get(&self, row: usize, feature: usize) -> f64 {
        self.data[row * self.names.len() + feature]
    }

    pub fn row(&self, row: usize) -> &[f64] {
        let k = self.names.len();
        &self.data[row * k..(row + 1) * k]
    }

    pub fn column(&self, feature: usize) -> Vec<f64> {
        (0..self.n_rows).map(|i| self.get(i, feature)).collect()
    }

    /// Count of missing cells
    pub fn missing_cells(&self) -> usize {
        self.data.iter().filter(|v| v.is_nan()).count()
    }

    /// Copy of the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        let mut data = Vec::with_capacity(rows.len() * self.names.len());
        for &r in rows {
            data.extend_from_slice(self.row(r));
        }
        Self {
            names: self.names.clone(),
            n_rows: rows.len(),
            data,
        }
    }

    /// Fail unless this matrix's feature ordering equals `expected`.
    pub fn check_schema(&self, expected: &[String]) -> Result<()> {
        if self.names != expected {
            return Err(EvalError::SchemaMismatch {
                expected: expected.to_vec(),
                found: self.names.clone(),
            });
        }
        Ok(())
    }
}

fn check_unique(names: &[String]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for n in names {
        if !seen.insert(n.as_str()) {
            return Err(EvalError::invalid(format!("Duplicate feature name '{}'", n)));
        }
    }
    Ok(())
}

/// Features with their complete binary labels and optional sample weights
#[derive(Debug, Clone)]
pub struct LabeledMatrix {
    pub features: FeatureMatrix,
    pub labels: Vec<u8>,
    pub weights: Option<Vec<f64>>,
}

impl LabeledMatrix {
    pub fn new(features: FeatureMatrix, labels: Vec<u8>, weights: Option<Vec<f64>>) -> Result<Self> {
        if features.n_rows() == 0 {
            return Err(EvalError::invalid("Sample has no rows"));
        }
        if labels.len() != features.n_rows() {
            return Err(EvalError::invalid(format!(
                "Feature matrix has {} rows but {} labels were given",
                features.n_rows(),
                labels.len()
            )));
        }
        if let Some(l) = labels.iter().find(|l| **l > 1) {
            return Err(EvalError::invalid(format!("Labels must be 0 or 1, found {}", l)));
        }
        if let Some(w) = &weights {
            if w.len() != labels.len() {
                return Err(EvalError::invalid(format!(
                    "{} weights for {} rows",
                    w.len(),
                    labels.len()
                )));
            }
            validate_weights(w, "<weights>")?;
        }
        Ok(Self {
            features,
            labels,
            weights,
        })
    }

    /// Features, label and optional weight column of one frame.
    ///
    /// Every row must carry a label.
    pub fn from_frame(
        df: &DataFrame,
        features: &[String],
        label: &str,
        mapping: Option<&LabelMapping>,
        weight_column: Option<&str>,
    ) -> Result<Self> {
        let matrix = FeatureMatrix::from_frame(df, features)?;
        let labels = require_complete(&extract_labels(df, label, mapping)?)?;
        let weights = sample_weights(df, weight_column)?;
        Self::new(matrix, labels, weights)
    }

    pub fn n_rows(&self) -> usize {
        self.labels.len()
    }

    pub fn weight(&self, row: usize) -> f64 {
        self.weights.as_ref().map(|w| w[row]).unwrap_or(1.0)
    }

    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            features: self.features.select_rows(rows),
            labels: rows.iter().map(|&r| self.labels[r]).collect(),
            weights: self
                .weights
                .as_ref()
                .map(|w| rows.iter().map(|&r| w[r]).collect()),
        }
    }
}
