//! Logistic regression adapter
//!
//! Fitted by iteratively reweighted least squares: each Newton step solves
//! `(X' W X + P) d = X' s (y - p) - P b` with a faer Cholesky factorization,
//! where `W = s p (1 - p)`, `s` are the sample weights and `P` the ridge
//! penalty (never applied to the constant). Wald z-values come from the
//! inverse of the final information matrix.

use faer::prelude::*;
use faer::{Mat, Side};

use crate::error::{EvalError, Result, Warning};
use crate::model::matrix::{FeatureMatrix, LabeledMatrix};
use crate::model::metrics::{evaluate, PerformanceRecord};
use crate::model::params::{ImportanceType, LinearParams};

/// Name the constant term is reported under
pub const INTERCEPT_NAME: &str = "const";

/// Fitted probabilities this close to the label on every row mean the
/// classes are perfectly separated
const SEPARATION_TOLERANCE: f64 = 1e-10;

/// Raw IRLS solution over a design matrix
#[derive(Debug, Clone)]
pub(crate) struct IrlsFit {
    pub coef: Vec<f64>,
    pub std_err: Vec<f64>,
    pub iterations: usize,
}

/// Fit `y ~ design` by IRLS.
///
/// `penalty[j]` is the ridge weight of coefficient `j`.
pub(crate) fn irls(
    design: &Mat<f64>,
    y: &[f64],
    weights: Option<&[f64]>,
    penalty: &[f64],
    max_iter: usize,
    tolerance: f64,
) -> Result<IrlsFit> {
    let n = design.nrows();
    let k = design.ncols();
    if n == 0 || k == 0 {
        return Err(EvalError::invalid("Logistic fit needs at least one row and one column"));
    }

    let sw = |i: usize| weights.map(|w| w[i]).unwrap_or(1.0);
    let unpenalized = penalty.iter().all(|p| *p == 0.0);
    let mut beta = vec![0.0; k];

    for iteration in 1..=max_iter {
        let p: Vec<f64> = (0..n)
            .map(|i| {
                let eta: f64 = (0..k).map(|j| design[(i, j)] * beta[j]).sum();
                sigmoid(eta)
            })
            .collect();

        let mut hessian = Mat::<f64>::zeros(k, k);
        let mut gradient = Mat::<f64>::zeros(k, 1);
        for i in 0..n {
            let w = sw(i);
            if w == 0.0 {
                continue;
            }
            let h = w * p[i] * (1.0 - p[i]);
            let r = w * (y[i] - p[i]);
            for a in 0..k {
                let xa = design[(i, a)];
                gradient[(a, 0)] += xa * r;
                for b in 0..=a {
                    hessian[(a, b)] += xa * design[(i, b)] * h;
                }
            }
        }
        for a in 0..k {
            for b in 0..a {
                hessian[(b, a)] = hessian[(a, b)];
            }
            hessian[(a, a)] += penalty[a];
            gradient[(a, 0)] -= penalty[a] * beta[a];
        }

        let chol = hessian.cholesky(Side::Lower).map_err(|_| {
            EvalError::FitFailure(format!(
                "information matrix is singular at iteration {} (collinear or constant column)",
                iteration
            ))
        })?;
        let step = chol.solve(&gradient);

        let mut max_step: f64 = 0.0;
        for j in 0..k {
            let d = step[(j, 0)];
            if !d.is_finite() {
                return Err(EvalError::FitFailure(format!(
                    "non-finite Newton step at iteration {}",
                    iteration
                )));
            }
            beta[j] += d;
            max_step = max_step.max(d.abs());
        }

        if unpenalized && is_separated(design, y, weights, &beta) {
            return Err(EvalError::FitFailure(
                "perfect separation: the label is fully determined by the features".to_string(),
            ));
        }

        if max_step < tolerance {
            let p: Vec<f64> = (0..n)
                .map(|i| sigmoid((0..k).map(|j| design[(i, j)] * beta[j]).sum()))
                .collect();
            let std_err = standard_errors(design, &p, weights, penalty)?;
            return Ok(IrlsFit {
                coef: beta,
                std_err,
                iterations: iteration,
            });
        }
    }

    Err(EvalError::FitFailure(format!(
        "logistic regression did not converge within {} iterations",
        max_iter
    )))
}

fn is_separated(design: &Mat<f64>, y: &[f64], weights: Option<&[f64]>, beta: &[f64]) -> bool {
    (0..design.nrows()).all(|i| {
        if weights.is_some_and(|w| w[i] == 0.0) {
            return true;
        }
        let eta: f64 = (0..design.ncols()).map(|j| design[(i, j)] * beta[j]).sum();
        (y[i] - sigmoid(eta)).abs() < SEPARATION_TOLERANCE
    })
}

fn standard_errors(design: &Mat<f64>, p: &[f64], weights: Option<&[f64]>, penalty: &[f64]) -> Result<Vec<f64>> {
    let k = design.ncols();
    let mut info = Mat::<f64>::zeros(k, k);
    for (i, pi) in p.iter().enumerate() {
        let h = weights.map(|w| w[i]).unwrap_or(1.0) * pi * (1.0 - pi);
        for a in 0..k {
            for b in 0..k {
                info[(a, b)] += design[(i, a)] * design[(i, b)] * h;
            }
        }
    }
    for a in 0..k {
        info[(a, a)] += penalty[a];
    }
    let chol = info
        .cholesky(Side::Lower)
        .map_err(|_| EvalError::FitFailure("information matrix is singular at the solution".to_string()))?;
    let covariance = chol.solve(&Mat::<f64>::identity(k, k));
    (0..k)
        .map(|j| {
            let var = covariance[(j, j)];
            if var.is_finite() && var > 0.0 {
                Ok(var.sqrt())
            } else {
                Err(EvalError::FitFailure(format!(
                    "non-positive variance for coefficient {}",
                    j
                )))
            }
        })
        .collect()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Design matrix with an optional leading constant column; `NaN` becomes 0.
fn design_matrix(x: &FeatureMatrix, intercept: bool) -> Mat<f64> {
    let offset = usize::from(intercept);
    Mat::from_fn(x.n_rows(), x.n_features() + offset, |i, j| {
        if intercept && j == 0 {
            1.0
        } else {
            let v = x.get(i, j - offset);
            if v.is_nan() {
                0.0
            } else {
                v
            }
        }
    })
}

/// Fitted logistic regression
#[derive(Debug, Clone)]
pub struct LogisticModel {
    feature_names: Vec<String>,
    params: LinearParams,
    /// Constant first when fitted with an intercept, then one per feature
    coef: Vec<f64>,
    std_err: Vec<f64>,
    iterations: usize,
    performance: PerformanceRecord,
    warnings: Vec<Warning>,
}

impl LogisticModel {
    /// Fit on `train`, scoring `eval` (when given) for the test metrics.
    pub fn fit(train: &LabeledMatrix, eval: Option<&LabeledMatrix>, params: &LinearParams) -> Result<Self> {
        params.validate()?;
        let names = train.features.feature_names().to_vec();
        if let Some(eval) = eval {
            eval.features.check_schema(&names)?;
        }

        let mut warnings = Vec::new();
        let missing = train.features.missing_cells()
            + eval.map(|e| e.features.missing_cells()).unwrap_or(0);
        if missing > 0 {
            if !params.fill_missing {
                return Err(EvalError::invalid(format!(
                    "{} missing value(s) in logistic regression input and fill_missing is off",
                    missing
                )));
            }
            warnings.push(Warning::MissingFilledWithZero { cells: missing });
        }

        let design = design_matrix(&train.features, params.fit_intercept);
        let y: Vec<f64> = train.labels.iter().map(|l| *l as f64).collect();
        let mut penalty = vec![params.l2_penalty; design.ncols()];
        if params.fit_intercept {
            penalty[0] = 0.0;
        }

        let fit = irls(
            &design,
            &y,
            train.weights.as_deref(),
            &penalty,
            params.max_iter,
            params.tolerance,
        )?;

        let mut model = Self {
            feature_names: names,
            params: params.clone(),
            coef: fit.coef,
            std_err: fit.std_err,
            iterations: fit.iterations,
            performance: PerformanceRecord::default(),
            warnings,
        };

        let train_pred = model.predict_unchecked(&train.features);
        model.performance.train = evaluate(Some(&train.labels), Some(&train_pred), train.weights.as_deref());
        if let Some(eval) = eval {
            let test_pred = model.predict_unchecked(&eval.features);
            model.performance.test = evaluate(Some(&eval.labels), Some(&test_pred), eval.weights.as_deref());
        }
        Ok(model)
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn params(&self) -> &LinearParams {
        &self.params
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn performance(&self) -> &PerformanceRecord {
        &self.performance
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn intercept(&self) -> Option<f64> {
        self.params.fit_intercept.then(|| self.coef[0])
    }

    /// Probability of the bad outcome for each row of `x`.
    ///
    /// Missing cells contribute 0, the same fill `fit` applies, and no
    /// warning is raised here; use [`FeatureMatrix::missing_cells`] to count
    /// them beforehand. With `fill_missing` off they are rejected instead.
    pub fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>> {
        x.check_schema(&self.feature_names)?;
        if !self.params.fill_missing && x.missing_cells() > 0 {
            return Err(EvalError::invalid(format!(
                "{} missing value(s) at predict time and fill_missing is off",
                x.missing_cells()
            )));
        }
        Ok(self.predict_unchecked(x))
    }

    fn predict_unchecked(&self, x: &FeatureMatrix) -> Vec<f64> {
        let offset = usize::from(self.params.fit_intercept);
        let intercept = self.intercept().unwrap_or(0.0);
        (0..x.n_rows())
            .map(|i| {
                let eta: f64 = x
                    .row(i)
                    .iter()
                    .zip(&self.coef[offset..])
                    .map(|(v, b)| if v.is_nan() { 0.0 } else { v * b })
                    .sum();
                sigmoid(intercept + eta)
            })
            .collect()
    }

    /// Coefficients keyed by name, `const` first when present.
    pub fn coefficients(&self) -> Vec<(String, f64)> {
        self.term_names().into_iter().zip(self.coef.iter().copied()).collect()
    }

    /// Wald z-values (`coef / std_err`) keyed by name.
    pub fn tvalues(&self) -> Vec<(String, f64)> {
        self.term_names()
            .into_iter()
            .zip(self.coef.iter().zip(&self.std_err).map(|(b, se)| b / se))
            .collect()
    }

    pub fn std_errors(&self) -> Vec<(String, f64)> {
        self.term_names().into_iter().zip(self.std_err.iter().copied()).collect()
    }

    /// `coef` or `tvalue`; tree importance types are not defined here.
    pub fn importance(&self, kind: ImportanceType) -> Result<Vec<(String, f64)>> {
        match kind {
            ImportanceType::Coef => Ok(self.coefficients()),
            ImportanceType::TValue => Ok(self.tvalues()),
            other => Err(EvalError::config(format!(
                "Importance type '{}' is not available for the linear model; use coef or tvalue",
                other
            ))),
        }
    }

    fn term_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.coef.len());
        if self.params.fit_intercept {
            names.push(INTERCEPT_NAME.to_string());
        }
        names.extend(self.feature_names.iter().cloned());
        names
    }
}
