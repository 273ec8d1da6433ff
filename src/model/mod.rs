//! Model adapters - uniform fit/predict/evaluate over the two learners

pub mod boosted;
pub mod cv;
pub mod linear;
pub mod matrix;
pub mod metrics;
pub mod params;
pub mod split;

pub use boosted::BoostedModel;
pub use cv::{CrossValidatedModel, CrossValidator, CvConfig, CvStatus, PerformanceSummary};
pub use linear::{LogisticModel, INTERCEPT_NAME};
pub use matrix::{FeatureMatrix, LabeledMatrix};
pub use metrics::{evaluate, Metrics, PerformanceRecord};
pub use params::{parse_key_values, BoostedParams, EvalMetric, ImportanceType, LinearParams};
pub use split::{holdout_split, kfold_partition};

use std::time::Instant;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{EvalError, Result, Warning};

/// Learner variant selected by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Linear,
    Boosted,
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelKind::Linear => write!(f, "lr"),
            ModelKind::Boosted => write!(f, "xgb"),
        }
    }
}

impl std::str::FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lr" | "linear" | "logistic" => Ok(ModelKind::Linear),
            "xgb" | "boosted" | "gbdt" => Ok(ModelKind::Boosted),
            _ => Err(format!("Unknown model type: '{}'. Use 'lr' or 'xgb'.", s)),
        }
    }
}

/// Learner variant together with its hyper-parameters
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSpec {
    Linear(LinearParams),
    Boosted(BoostedParams),
}

impl ModelSpec {
    /// Default parameters for `kind`.
    pub fn new(kind: ModelKind) -> Self {
        match kind {
            ModelKind::Linear => ModelSpec::Linear(LinearParams::default()),
            ModelKind::Boosted => ModelSpec::Boosted(BoostedParams::default()),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            ModelSpec::Linear(_) => ModelKind::Linear,
            ModelSpec::Boosted(_) => ModelKind::Boosted,
        }
    }

    /// Apply flat key/value overrides to the variant's parameters.
    pub fn set_params(&mut self, params: &Map<String, Value>) -> Result<()> {
        match self {
            ModelSpec::Linear(p) => p.set_params(params),
            ModelSpec::Boosted(p) => p.set_params(params),
        }
    }

    /// Copy of this spec whose boosted fit stops at `deadline`.
    pub(crate) fn with_deadline(&self, deadline: Option<Instant>) -> Self {
        match self {
            ModelSpec::Boosted(p) if deadline.is_some() => {
                let deadline = match p.deadline {
                    Some(own) => deadline.map(|d| d.min(own)),
                    None => deadline,
                };
                ModelSpec::Boosted(BoostedParams {
                    deadline,
                    ..p.clone()
                })
            }
            other => other.clone(),
        }
    }

    /// Fit on `train`, using `eval` for early stopping and test metrics.
    pub fn fit(&self, train: &LabeledMatrix, eval: Option<&LabeledMatrix>) -> Result<FittedModel> {
        match self {
            ModelSpec::Linear(p) => LogisticModel::fit(train, eval, p).map(FittedModel::Linear),
            ModelSpec::Boosted(p) => BoostedModel::fit(train, eval, p).map(FittedModel::Boosted),
        }
    }

    /// Fit from separate features and labels.
    ///
    /// `test` and `test_labels` must be given together.
    pub fn fit_with(
        &self,
        train: &FeatureMatrix,
        train_labels: &[u8],
        test: Option<&FeatureMatrix>,
        test_labels: Option<&[u8]>,
    ) -> Result<FittedModel> {
        let train = LabeledMatrix::new(train.clone(), train_labels.to_vec(), None)?;
        let eval = match (test, test_labels) {
            (Some(x), Some(y)) => Some(LabeledMatrix::new(x.clone(), y.to_vec(), None)?),
            (None, None) => None,
            _ => {
                return Err(EvalError::invalid(
                    "test features and test labels must both be present or both absent",
                ))
            }
        };
        self.fit(&train, eval.as_ref())
    }
}

/// Shared contract of every fitted learner
pub trait Classifier {
    /// Feature ordering captured at fit time
    fn feature_names(&self) -> &[String];

    /// Probability of the bad outcome per row; the column order must match.
    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>>;

    /// Importance vector keyed by feature name.
    fn importance(&self, kind: ImportanceType) -> Result<Vec<(String, f64)>>;

    fn performance(&self) -> &PerformanceRecord;

    /// Fallbacks applied while fitting.
    fn warnings(&self) -> &[Warning] {
        &[]
    }

    /// Metrics of `predictions` against `labels`; unavailable unless both are given.
    fn evaluate(&self, labels: Option<&[u8]>, predictions: Option<&[f64]>) -> Metrics {
        evaluate(labels, predictions, None)
    }
}

impl Classifier for LogisticModel {
    fn feature_names(&self) -> &[String] {
        LogisticModel::feature_names(self)
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>> {
        LogisticModel::predict(self, x)
    }

    fn importance(&self, kind: ImportanceType) -> Result<Vec<(String, f64)>> {
        LogisticModel::importance(self, kind)
    }

    fn performance(&self) -> &PerformanceRecord {
        LogisticModel::performance(self)
    }

    fn warnings(&self) -> &[Warning] {
        LogisticModel::warnings(self)
    }
}

impl Classifier for BoostedModel {
    fn feature_names(&self) -> &[String] {
        BoostedModel::feature_names(self)
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>> {
        BoostedModel::predict(self, x)
    }

    fn importance(&self, kind: ImportanceType) -> Result<Vec<(String, f64)>> {
        BoostedModel::importance(self, kind)
    }

    fn performance(&self) -> &PerformanceRecord {
        BoostedModel::performance(self)
    }
}

/// One fitted learner of either variant
#[derive(Debug, Clone)]
pub enum FittedModel {
    Linear(LogisticModel),
    Boosted(BoostedModel),
}

impl FittedModel {
    pub fn kind(&self) -> ModelKind {
        match self {
            FittedModel::Linear(_) => ModelKind::Linear,
            FittedModel::Boosted(_) => ModelKind::Boosted,
        }
    }

    fn inner(&self) -> &dyn Classifier {
        match self {
            FittedModel::Linear(m) => m,
            FittedModel::Boosted(m) => m,
        }
    }
}

impl Classifier for FittedModel {
    fn feature_names(&self) -> &[String] {
        self.inner().feature_names()
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>> {
        self.inner().predict(x)
    }

    fn importance(&self, kind: ImportanceType) -> Result<Vec<(String, f64)>> {
        self.inner().importance(kind)
    }

    fn performance(&self) -> &PerformanceRecord {
        self.inner().performance()
    }

    fn warnings(&self) -> &[Warning] {
        self.inner().warnings()
    }
}
