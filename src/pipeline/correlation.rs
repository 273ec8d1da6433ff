//! Feature correlation matrix
//!
//! Pairwise-complete weighted Pearson correlation: each pair uses only the
//! rows where both features are present. With `X` the centered values
//! (0 where missing), `M` the presence mask and `w` the row weights, all
//! pairwise sums come out of four matrix products:
//!
//! - `N   = (M∘w)' M`   weight of rows where both are present
//! - `Sx  = (X∘w)' M`   sum of feature i over those rows
//! - `Sxx = (X²∘w)' M`
//! - `Sxy = (X∘w)' X`

use faer::Mat;
use polars::prelude::*;
use rayon::prelude::*;
use serde::Serialize;

use crate::error::{EvalError, Result};
use crate::pipeline::frame::numeric_column;

/// Pairs whose variance product falls below this are undefined
const MIN_VARIANCE: f64 = 1e-12;

/// A feature pair whose absolute correlation exceeds a threshold
#[derive(Debug, Clone, Serialize)]
pub struct CorrelatedPair {
    pub feature1: String,
    pub feature2: String,
    pub correlation: f64,
}

/// Symmetric correlation matrix over named features
#[derive(Debug, Clone)]
pub struct CorrelationMatrix {
    names: Vec<String>,
    /// NaN where the correlation is undefined
    values: Mat<f64>,
}

impl CorrelationMatrix {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Correlation by position; `None` when undefined (constant or < 2 shared rows)
    pub fn value(&self, i: usize, j: usize) -> Option<f64> {
        let v = self.values[(i, j)];
        (!v.is_nan()).then_some(v)
    }

    /// Correlation by feature name
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.names.iter().position(|n| n == a)?;
        let j = self.names.iter().position(|n| n == b)?;
        self.value(i, j)
    }

    /// Row-major copy, `None` for undefined cells
    pub fn to_rows(&self) -> Vec<Vec<Option<f64>>> {
        (0..self.len())
            .map(|i| (0..self.len()).map(|j| self.value(i, j)).collect())
            .collect()
    }

    /// Upper-triangle pairs with `|r| > threshold`, strongest first.
    pub fn pairs_above(&self, threshold: f64) -> Vec<CorrelatedPair> {
        let n = self.len();
        let mut pairs = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                if let Some(r) = self.value(i, j) {
                    if r.abs() > threshold {
                        pairs.push(CorrelatedPair {
                            feature1: self.names[i].clone(),
                            feature2: self.names[j].clone(),
                            correlation: r,
                        });
                    }
                }
            }
        }
        pairs.sort_by(|a, b| b.correlation.abs().total_cmp(&a.correlation.abs()));
        pairs
    }
}

/// Correlation of `columns` (all the same length), optionally row-weighted.
pub fn correlation_matrix(
    names: Vec<String>,
    columns: &[Vec<Option<f64>>],
    weights: Option<&[f64]>,
) -> Result<CorrelationMatrix> {
    if names.len() != columns.len() {
        return Err(EvalError::invalid(format!(
            "{} names for {} columns",
            names.len(),
            columns.len()
        )));
    }
    let k = columns.len();
    let n = columns.first().map(|c| c.len()).unwrap_or(0);
    if let Some(c) = columns.iter().find(|c| c.len() != n) {
        return Err(EvalError::invalid(format!(
            "correlation columns differ in length ({} vs {})",
            c.len(),
            n
        )));
    }
    if weights.is_some_and(|w| w.len() != n) {
        return Err(EvalError::invalid("weights do not match the row count"));
    }
    let w = |row: usize| weights.map(|w| w[row]).unwrap_or(1.0);

    // Center on the column mean; the correlation itself is shift invariant
    let centers: Vec<f64> = columns
        .par_iter()
        .map(|c| {
            let (sum, count) = c
                .iter()
                .flatten()
                .filter(|v| v.is_finite())
                .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            if count == 0 {
                0.0
            } else {
                sum / count as f64
            }
        })
        .collect();

    let present = |row: usize, col: usize| columns[col][row].filter(|v| v.is_finite());
    let x = Mat::from_fn(n, k, |i, j| present(i, j).map(|v| v - centers[j]).unwrap_or(0.0));
    let mask = Mat::from_fn(n, k, |i, j| if present(i, j).is_some() { 1.0 } else { 0.0 });
    let xw = Mat::from_fn(n, k, |i, j| x[(i, j)] * w(i));
    let x2w = Mat::from_fn(n, k, |i, j| x[(i, j)] * x[(i, j)] * w(i));
    let mw = Mat::from_fn(n, k, |i, j| mask[(i, j)] * w(i));

    let counts = mw.transpose() * &mask;
    let sx = xw.transpose() * &mask;
    let sxx = x2w.transpose() * &mask;
    let sxy = xw.transpose() * &x;

    let values = Mat::from_fn(k, k, |i, j| {
        if i == j {
            return if column_varies(&columns[i]) { 1.0 } else { f64::NAN };
        }
        let nij = counts[(i, j)];
        if nij <= 0.0 {
            return f64::NAN;
        }
        // Sx[(i, j)] sums feature i over rows where j is present too
        let (si, sj) = (sx[(i, j)], sx[(j, i)]);
        let var_i = nij * sxx[(i, j)] - si * si;
        let var_j = nij * sxx[(j, i)] - sj * sj;
        if var_i <= MIN_VARIANCE || var_j <= MIN_VARIANCE {
            return f64::NAN;
        }
        ((nij * sxy[(i, j)] - si * sj) / (var_i.sqrt() * var_j.sqrt())).clamp(-1.0, 1.0)
    });

    Ok(CorrelationMatrix { names, values })
}

fn column_varies(column: &[Option<f64>]) -> bool {
    let mut values = column.iter().flatten().filter(|v| v.is_finite());
    match values.next() {
        Some(first) => values.any(|v| v != first),
        None => false,
    }
}

/// Correlation matrix of `features` read from `df`.
pub fn correlation_frame(df: &DataFrame, features: &[String], weights: Option<&[f64]>) -> Result<CorrelationMatrix> {
    let columns: Result<Vec<Vec<Option<f64>>>> = features.par_iter().map(|f| numeric_column(df, f)).collect();
    correlation_matrix(features.to_vec(), &columns?, weights)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_perfect_and_inverse_correlation() {
        let a: Vec<Option<f64>> = (0..10).map(|i| Some(i as f64)).collect();
        let b: Vec<Option<f64>> = (0..10).map(|i| Some(3.0 * i as f64 + 1.0)).collect();
        let c: Vec<Option<f64>> = (0..10).map(|i| Some(-(i as f64))).collect();
        let m = correlation_matrix(names(&["a", "b", "c"]), &[a, b, c], None).unwrap();
        assert!((m.get("a", "b").unwrap() - 1.0).abs() < 1e-12);
        assert!((m.get("a", "c").unwrap() + 1.0).abs() < 1e-12);
        assert_eq!(m.get("b", "b"), Some(1.0));
    }

    #[test]
    fn test_known_value() {
        // r(x, y) for x = 1..5, y = [2, 4, 5, 4, 5] is 0.7745967
        let x: Vec<Option<f64>> = (1..=5).map(|i| Some(i as f64)).collect();
        let y = vec![Some(2.0), Some(4.0), Some(5.0), Some(4.0), Some(5.0)];
        let m = correlation_matrix(names(&["x", "y"]), &[x, y], None).unwrap();
        assert!((m.value(0, 1).unwrap() - 0.774_596_669_2).abs() < 1e-9);
        assert_eq!(m.value(0, 1), m.value(1, 0));
    }

    #[test]
    fn test_pairwise_complete_rows() {
        // The outlier row is missing in b, so it must not affect r(a, b)
        let a = vec![Some(1.0), Some(2.0), Some(3.0), Some(100.0)];
        let b = vec![Some(2.0), Some(4.0), Some(6.0), None];
        let m = correlation_matrix(names(&["a", "b"]), &[a, b], None).unwrap();
        assert!((m.get("a", "b").unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_column_is_undefined() {
        let a: Vec<Option<f64>> = (0..5).map(|i| Some(i as f64)).collect();
        let flat = vec![Some(2.0); 5];
        let m = correlation_matrix(names(&["a", "flat"]), &[a, flat], None).unwrap();
        assert_eq!(m.get("a", "flat"), None);
        assert_eq!(m.get("flat", "flat"), None);
        assert!(m.pairs_above(0.0).is_empty());
    }

    #[test]
    fn test_weights_match_duplication() {
        let x = vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)];
        let y = vec![Some(1.0), Some(3.0), Some(2.0), Some(5.0)];
        let weighted = correlation_matrix(names(&["x", "y"]), &[x, y], Some(&[1.0, 2.0, 1.0, 1.0])).unwrap();
        let xd = vec![Some(1.0), Some(2.0), Some(2.0), Some(3.0), Some(4.0)];
        let yd = vec![Some(1.0), Some(3.0), Some(3.0), Some(2.0), Some(5.0)];
        let dup = correlation_matrix(names(&["x", "y"]), &[xd, yd], None).unwrap();
        assert!((weighted.value(0, 1).unwrap() - dup.value(0, 1).unwrap()).abs() < 1e-12);
    }

    #[test]
    fn test_pairs_above_sorted_by_strength() {
        let df = df! {
            "a" => [1.0, 2.0, 3.0, 4.0, 5.0],
            "b" => [2.0, 4.1, 5.9, 8.2, 9.9],
            "c" => [5.0, 3.0, 4.0, 1.0, 2.0],
        }
        .unwrap();
        let m = correlation_frame(&df, &names(&["a", "b", "c"]), None).unwrap();
        let pairs = m.pairs_above(0.7);
        assert_eq!(pairs[0].feature1, "a");
        assert_eq!(pairs[0].feature2, "b");
        assert!(pairs.windows(2).all(|w| w[0].correlation.abs() >= w[1].correlation.abs()));
    }
}
