//! K-fold cross-validated training
//!
//! [`CrossValidator`] holds the configuration; `fit` partitions the rows,
//! trains one learner per fold (each scoring its held-out rows as the eval
//! split) and returns the fitted [`CrossValidatedModel`]. Folds are fitted
//! in parallel on the rayon pool; they share only the read-only input.

use std::collections::HashMap;
use std::time::Instant;

use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result, Warning};
use crate::model::matrix::{FeatureMatrix, LabeledMatrix};
use crate::model::metrics::{mean_std, Metrics};
use crate::model::params::ImportanceType;
use crate::model::split::{kfold_partition, training_rows};
use crate::model::{Classifier, FittedModel, ModelKind, ModelSpec};
use crate::utils::create_progress_bar;

/// Cross-validation options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CvConfig {
    /// Number of folds (>= 2, at most the row count)
    pub fold_count: usize,
    pub shuffle: bool,
    /// Seed of the fold shuffle
    pub seed: u64,
    /// Exclude folds whose fit fails instead of aborting
    pub tolerate_fold_failures: bool,
    /// Folds not finished by then are discarded
    #[serde(skip)]
    pub deadline: Option<Instant>,
}

impl Default for CvConfig {
    fn default() -> Self {
        Self {
            fold_count: 5,
            shuffle: true,
            seed: 0,
            tolerate_fold_failures: false,
            deadline: None,
        }
    }
}

impl CvConfig {
    pub fn new(fold_count: usize, shuffle: bool) -> Self {
        Self {
            fold_count,
            shuffle,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.fold_count < 2 {
            return Err(EvalError::config(format!(
                "fold_count must be at least 2, got {}",
                self.fold_count
            )));
        }
        Ok(())
    }
}

/// How complete a cross-validated fit is
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CvStatus {
    /// Every fold contributed
    Complete,
    /// Listed folds failed to fit and were excluded
    Partial { failed: Vec<usize> },
    /// The deadline expired; only `completed` folds contributed
    Cancelled { completed: usize },
}

/// Mean and standard deviation of the fold metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub train: Metrics,
    pub test: Metrics,
    pub train_std: Metrics,
    pub test_std: Metrics,
    pub contributing_folds: usize,
}

enum FoldOutcome {
    Fitted(FittedModel),
    Failed(EvalError),
    /// Not started or interrupted by the deadline
    Expired,
}

/// Unfitted cross-validation driver
#[derive(Debug, Clone)]
pub struct CrossValidator {
    spec: ModelSpec,
    config: CvConfig,
}

impl CrossValidator {
    pub fn new(spec: ModelSpec, config: CvConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { spec, config })
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn config(&self) -> &CvConfig {
        &self.config
    }

    /// Fit one learner per fold.
    pub fn fit(&self, data: &LabeledMatrix) -> Result<CrossValidatedModel> {
        self.fit_inner(data, None)
    }

    /// [`fit`](Self::fit) with a progress bar across folds.
    pub fn fit_with_progress(&self, data: &LabeledMatrix) -> Result<CrossValidatedModel> {
        let pb = create_progress_bar(self.config.fold_count as u64, "Fitting folds");
        let result = self.fit_inner(data, Some(&pb));
        pb.finish_and_clear();
        result
    }

    fn fit_inner(&self, data: &LabeledMatrix, pb: Option<&ProgressBar>) -> Result<CrossValidatedModel> {
        let k = self.config.fold_count;
        let folds = kfold_partition(data.n_rows(), k, self.config.shuffle, self.config.seed)?;
        let spec = self.spec.with_deadline(self.config.deadline);
        let deadline = self.config.deadline;

        let outcomes: Vec<FoldOutcome> = (0..k)
            .into_par_iter()
            .map(|fold| {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    return FoldOutcome::Expired;
                }
                let train = data.select_rows(&training_rows(&folds, fold));
                let held_out = data.select_rows(&folds[fold]);
                let outcome = match spec.fit(&train, Some(&held_out)) {
                    Ok(model) => FoldOutcome::Fitted(model),
                    Err(EvalError::Cancelled { .. }) => FoldOutcome::Expired,
                    Err(e) => FoldOutcome::Failed(e),
                };
                if let Some(pb) = pb {
                    pb.inc(1);
                }
                outcome
            })
            .collect();

        let mut models = Vec::with_capacity(k);
        let mut failed = Vec::new();
        let mut expired = false;
        for (fold, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                FoldOutcome::Fitted(model) => models.push((fold, model)),
                FoldOutcome::Failed(EvalError::FitFailure(_)) if self.config.tolerate_fold_failures => {
                    failed.push(fold)
                }
                FoldOutcome::Failed(e) => return Err(e),
                FoldOutcome::Expired => expired = true,
            }
        }

        if models.is_empty() {
            if expired {
                return Err(EvalError::Cancelled {
                    completed: 0,
                    requested: k,
                });
            }
            return Err(EvalError::FitFailure(format!("all {} folds failed to fit", k)));
        }

        let status = if expired {
            CvStatus::Cancelled {
                completed: models.len(),
            }
        } else if !failed.is_empty() {
            CvStatus::Partial { failed }
        } else {
            CvStatus::Complete
        };

        Ok(CrossValidatedModel {
            kind: self.spec.kind(),
            feature_names: data.features.feature_names().to_vec(),
            folds,
            models,
            status,
        })
    }
}

/// Fitted cross-validation result owning one learner per contributing fold
#[derive(Debug, Clone)]
pub struct CrossValidatedModel {
    kind: ModelKind,
    feature_names: Vec<String>,
    folds: Vec<Vec<usize>>,
    /// `(fold index, learner)` in fold order
    models: Vec<(usize, FittedModel)>,
    status: CvStatus,
}

impl CrossValidatedModel {
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn status(&self) -> &CvStatus {
        &self.status
    }

    /// Held-out rows of every fold, including folds that did not contribute
    pub fn folds(&self) -> &[Vec<usize>] {
        &self.folds
    }

    pub fn models(&self) -> impl Iterator<Item = &FittedModel> {
        self.models.iter().map(|(_, m)| m)
    }

    /// Indices of the folds whose learner contributed
    pub fn contributing_folds(&self) -> Vec<usize> {
        self.models.iter().map(|(f, _)| *f).collect()
    }

    pub fn n_models(&self) -> usize {
        self.models.len()
    }

    /// Warnings raised by any fold, tagged with the fold index.
    pub fn warnings(&self) -> Vec<(usize, Warning)> {
        self.models
            .iter()
            .flat_map(|(f, m)| m.warnings().iter().cloned().map(move |w| (*f, w)))
            .collect()
    }

    /// Predictions of every learner, one vector per contributing fold.
    pub fn fold_predictions(&self, x: &FeatureMatrix) -> Result<Vec<Vec<f64>>> {
        self.models.iter().map(|(_, m)| m.predict(x)).collect()
    }

    /// Arithmetic mean of the learners' predictions per row.
    pub fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>> {
        x.check_schema(&self.feature_names)?;
        let per_fold = self.fold_predictions(x)?;
        let k = per_fold.len() as f64;
        Ok((0..x.n_rows())
            .map(|i| per_fold.iter().map(|p| p[i]).sum::<f64>() / k)
            .collect())
    }

    /// Importance averaged over folds.
    ///
    /// A name missing from one fold's vector counts as 0 for that fold and
    /// still enters the denominator. Names keep their first-seen order.
    pub fn importance(&self, kind: ImportanceType) -> Result<Vec<(String, f64)>> {
        let mut order: Vec<String> = Vec::new();
        let mut totals: HashMap<String, f64> = HashMap::new();
        for (_, model) in &self.models {
            for (name, value) in model.importance(kind)? {
                if !totals.contains_key(&name) {
                    order.push(name.clone());
                }
                *totals.entry(name).or_insert(0.0) += value;
            }
        }
        let k = self.models.len() as f64;
        Ok(order
            .into_iter()
            .map(|name| {
                let mean = totals.get(&name).copied().unwrap_or(0.0) / k;
                (name, mean)
            })
            .collect())
    }

    /// Per-split mean and standard deviation of the fold metrics.
    pub fn performance_summary(&self) -> PerformanceSummary {
        let train: Vec<Metrics> = self.models.iter().map(|(_, m)| m.performance().train).collect();
        let test: Vec<Metrics> = self.models.iter().map(|(_, m)| m.performance().test).collect();
        let (train, train_std) = summarize(&train);
        let (test, test_std) = summarize(&test);
        PerformanceSummary {
            train,
            test,
            train_std,
            test_std,
            contributing_folds: self.models.len(),
        }
    }
}

/// `(mean, std)` of each metric over folds, skipping unavailable values
fn summarize(metrics: &[Metrics]) -> (Metrics, Metrics) {
    let column = |pick: fn(&Metrics) -> Option<f64>| {
        let values: Vec<Option<f64>> = metrics.iter().map(pick).collect();
        mean_std(&values)
    };
    let (auc, auc_std) = column(|m| m.auc);
    let (avg_precision, avg_precision_std) = column(|m| m.avg_precision);
    let (logloss, logloss_std) = column(|m| m.logloss);
    (
        Metrics {
            auc,
            avg_precision,
            logloss,
        },
        Metrics {
            auc: auc_std,
            avg_precision: avg_precision_std,
            logloss: logloss_std,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::params::{BoostedParams, LinearParams};

    fn data(n: usize) -> LabeledMatrix {
        let rows: Vec<Vec<f64>> = (0..n).map(|i| vec![(i % 40) as f64 / 4.0]).collect();
        let labels = (0..n).map(|i| (((i % 40) * 7) % 10 < (i % 40) / 4) as u8).collect();
        let x = FeatureMatrix::from_rows(vec!["x".to_string()], &rows).unwrap();
        LabeledMatrix::new(x, labels, None).unwrap()
    }

    fn linear() -> ModelSpec {
        ModelSpec::Linear(LinearParams::default())
    }

    #[test]
    fn test_rejects_bad_fold_counts() {
        assert!(matches!(
            CrossValidator::new(linear(), CvConfig::new(1, true)),
            Err(EvalError::ConfigurationError(_))
        ));
        let cv = CrossValidator::new(linear(), CvConfig::new(5, true)).unwrap();
        let tiny = data(4);
        assert!(matches!(cv.fit(&tiny), Err(EvalError::ConfigurationError(_))));
    }

    #[test]
    fn test_fit_produces_k_models() {
        let cv = CrossValidator::new(linear(), CvConfig::new(4, true)).unwrap();
        let model = cv.fit(&data(160)).unwrap();
        assert_eq!(model.n_models(), 4);
        assert_eq!(model.status(), &CvStatus::Complete);
        let summary = model.performance_summary();
        assert_eq!(summary.contributing_folds, 4);
        assert!(summary.test.auc.is_some());
        assert!(summary.test_std.auc.is_some());
    }

    #[test]
    fn test_linear_importance_has_const_first() {
        let cv = CrossValidator::new(linear(), CvConfig::new(3, false)).unwrap();
        let model = cv.fit(&data(120)).unwrap();
        let coef = model.importance(ImportanceType::Coef).unwrap();
        assert_eq!(coef[0].0, "const");
        assert_eq!(coef[1].0, "x");
        assert!(coef[1].1 > 0.0);
    }

    #[test]
    fn test_missing_importance_counts_as_zero() {
        let params = BoostedParams {
            num_rounds: 5,
            early_stopping_rounds: None,
            subsample: 1.0,
            colsample_bytree: 1.0,
            ..Default::default()
        };
        let rows: Vec<Vec<f64>> = (0..120).map(|i| vec![(i % 40) as f64, 0.0]).collect();
        let labels = (0..120).map(|i| ((i % 40) >= 20) as u8).collect();
        let x = FeatureMatrix::from_rows(vec!["x".to_string(), "flat".to_string()], &rows).unwrap();
        let d = LabeledMatrix::new(x, labels, None).unwrap();
        let model = CrossValidator::new(ModelSpec::Boosted(params), CvConfig::new(3, true))
            .unwrap()
            .fit(&d)
            .unwrap();
        let imp = model.importance(ImportanceType::Weight).unwrap();
        assert_eq!(imp.len(), 1);
        assert_eq!(imp[0].0, "x");
    }

    #[test]
    fn test_expired_deadline_before_any_fold() {
        let config = CvConfig {
            deadline: Some(Instant::now()),
            ..CvConfig::new(3, true)
        };
        let cv = CrossValidator::new(linear(), config).unwrap();
        assert!(matches!(
            cv.fit(&data(60)),
            Err(EvalError::Cancelled { completed: 0, requested: 3 })
        ));
    }

    #[test]
    fn test_fold_failure_aborts_unless_tolerated() {
        // Perfectly separable: every unpenalized fold fit fails
        let rows: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64]).collect();
        let labels = (0..30).map(|i| (i >= 15) as u8).collect();
        let x = FeatureMatrix::from_rows(vec!["x".to_string()], &rows).unwrap();
        let d = LabeledMatrix::new(x, labels, None).unwrap();

        let strict = CrossValidator::new(linear(), CvConfig::new(3, true)).unwrap();
        assert!(matches!(strict.fit(&d), Err(EvalError::FitFailure(_))));

        let tolerant = CvConfig {
            tolerate_fold_failures: true,
            ..CvConfig::new(3, true)
        };
        let err = CrossValidator::new(linear(), tolerant).unwrap().fit(&d).unwrap_err();
        assert!(err.to_string().contains("all 3 folds"));
    }

    #[test]
    fn test_tolerated_failures_leave_partial_model() {
        // Rows 0..10 overlap the classes; without them the rest separate at x = 25
        let overlap = [12.0, 38.0, 15.0, 35.0, 20.0, 30.0, 18.0, 32.0, 22.0, 28.0];
        let overlap_labels = [1u8, 0, 1, 0, 1, 0, 0, 1, 0, 1];
        let mut rows: Vec<Vec<f64>> = overlap.iter().map(|v| vec![*v]).collect();
        let mut labels = overlap_labels.to_vec();
        for i in 10..40 {
            rows.push(vec![i as f64]);
            labels.push((i >= 25) as u8);
        }
        let x = FeatureMatrix::from_rows(vec!["x".to_string()], &rows).unwrap();
        let d = LabeledMatrix::new(x, labels, None).unwrap();

        let strict = CrossValidator::new(linear(), CvConfig::new(4, false)).unwrap();
        assert!(matches!(strict.fit(&d), Err(EvalError::FitFailure(_))));

        let tolerant = CvConfig {
            tolerate_fold_failures: true,
            ..CvConfig::new(4, false)
        };
        let model = CrossValidator::new(linear(), tolerant).unwrap().fit(&d).unwrap();
        assert_eq!(model.status(), &CvStatus::Partial { failed: vec![0] });
        assert_eq!(model.n_models(), 3);
        assert_eq!(model.contributing_folds(), vec![1, 2, 3]);
        assert_eq!(model.performance_summary().contributing_folds, 3);
        assert_eq!(model.predict(&d.features).unwrap().len(), 40);
    }
}
