//! Hyper-parameter payloads for the model variants
//!
//! Each variant has a typed parameter struct with the defaults below. They
//! can also be updated from a flat key/value mapping (as read from JSON or
//! `--param key=value` flags); unknown keys and badly typed values are
//! rejected with [`EvalError::ConfigurationError`].

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EvalError, Result};

/// Named importance vector a fitted model can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportanceType {
    /// Number of splits using the feature
    Weight,
    /// Mean loss reduction of the feature's splits
    Gain,
    /// Mean hessian mass routed through the feature's splits
    Cover,
    TotalGain,
    TotalCover,
    /// Fitted logistic coefficients
    Coef,
    /// Wald z-values of the logistic coefficients
    #[serde(rename = "tvalue")]
    TValue,
}

impl std::fmt::Display for ImportanceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ImportanceType::Weight => "weight",
            ImportanceType::Gain => "gain",
            ImportanceType::Cover => "cover",
            ImportanceType::TotalGain => "total_gain",
            ImportanceType::TotalCover => "total_cover",
            ImportanceType::Coef => "coef",
            ImportanceType::TValue => "tvalue",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for ImportanceType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "weight" => Ok(ImportanceType::Weight),
            "gain" => Ok(ImportanceType::Gain),
            "cover" => Ok(ImportanceType::Cover),
            "total_gain" => Ok(ImportanceType::TotalGain),
            "total_cover" => Ok(ImportanceType::TotalCover),
            "coef" | "coefs" => Ok(ImportanceType::Coef),
            "tvalue" | "tvalues" | "zvalue" => Ok(ImportanceType::TValue),
            _ => Err(format!(
                "Unknown importance type: '{}'. Use weight, gain, cover, total_gain, total_cover, coef or tvalue.",
                s
            )),
        }
    }
}

/// Metric watched on the evaluation split for early stopping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalMetric {
    #[default]
    Logloss,
    Auc,
    /// Misclassification rate at a 0.5 threshold
    Error,
}

impl EvalMetric {
    /// Whether larger values are better
    pub fn maximize(&self) -> bool {
        matches!(self, EvalMetric::Auc)
    }
}

impl std::fmt::Display for EvalMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalMetric::Logloss => write!(f, "logloss"),
            EvalMetric::Auc => write!(f, "auc"),
            EvalMetric::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for EvalMetric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "logloss" => Ok(EvalMetric::Logloss),
            "auc" => Ok(EvalMetric::Auc),
            "error" => Ok(EvalMetric::Error),
            _ => Err(format!(
                "Unknown eval metric: '{}'. Use 'logloss', 'auc' or 'error'.",
                s
            )),
        }
    }
}

/// Training objective of the boosted variant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Objective {
    /// Logistic loss, predictions are probabilities
    #[default]
    #[serde(rename = "binary:logistic")]
    BinaryLogistic,
}

impl std::str::FromStr for Objective {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "binary:logistic" => Ok(Objective::BinaryLogistic),
            _ => Err(format!("Unsupported objective: '{}'. Use 'binary:logistic'.", s)),
        }
    }
}

/// Logistic regression options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearParams {
    /// Add a constant term, reported as `const`
    pub fit_intercept: bool,
    /// Replace missing values with 0 (with a warning) instead of failing
    pub fill_missing: bool,
    /// Ridge penalty on the non-constant coefficients (0 = unpenalized)
    pub l2_penalty: f64,
    /// Newton/IRLS iteration limit
    pub max_iter: usize,
    /// Convergence threshold on the largest coefficient step
    pub tolerance: f64,
}

impl Default for LinearParams {
    fn default() -> Self {
        Self {
            fit_intercept: true,
            fill_missing: true,
            l2_penalty: 0.0,
            max_iter: 100,
            tolerance: 1e-8,
        }
    }
}

impl LinearParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.l2_penalty >= 0.0 && self.l2_penalty.is_finite()) {
            return Err(EvalError::config(format!(
                "l2_penalty must be a non-negative number, got {}",
                self.l2_penalty
            )));
        }
        if self.max_iter == 0 {
            return Err(EvalError::config("max_iter must be at least 1"));
        }
        if !(self.tolerance > 0.0) {
            return Err(EvalError::config(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }

    /// Apply flat overrides (`ifconst`/`ifnull` accepted as aliases).
    pub fn set_params(&mut self, params: &Map<String, Value>) -> Result<()> {
        for (key, value) in params {
            match key.as_str() {
                "fit_intercept" | "ifconst" => self.fit_intercept = as_bool(key, value)?,
                "fill_missing" | "ifnull" => self.fill_missing = as_bool(key, value)?,
                "l2_penalty" => self.l2_penalty = as_f64(key, value)?,
                "max_iter" => self.max_iter = as_usize(key, value)?,
                "tolerance" => self.tolerance = as_f64(key, value)?,
                _ => return Err(unknown_key(key, "linear")),
            }
        }
        self.validate()
    }
}

/// Gradient-boosted tree options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostedParams {
    pub objective: Objective,
    /// Learning rate applied to every tree's leaf weights
    pub eta: f64,
    pub max_depth: usize,
    /// Row fraction sampled per round
    pub subsample: f64,
    /// Feature fraction sampled per tree
    pub colsample_bytree: f64,
    /// Minimum loss reduction needed to keep a split
    pub gamma: f64,
    /// L2 regularization on leaf weights
    pub lambda: f64,
    /// Minimum hessian mass per child
    pub min_child_weight: f64,
    pub num_rounds: usize,
    /// Stop once the eval metric has not improved for this many rounds
    pub early_stopping_rounds: Option<usize>,
    pub eval_metric: EvalMetric,
    pub seed: u64,
    /// Wall-clock limit for the whole boosting loop
    #[serde(skip)]
    pub deadline: Option<Instant>,
}

impl Default for BoostedParams {
    fn default() -> Self {
        Self {
            objective: Objective::BinaryLogistic,
            eta: 0.1,
            max_depth: 5,
            subsample: 0.7,
            colsample_bytree: 0.7,
            gamma: 0.2,
            lambda: 1.0,
            min_child_weight: 1.0,
            num_rounds: 200,
            early_stopping_rounds: Some(10),
            eval_metric: EvalMetric::Logloss,
            seed: 0,
            deadline: None,
        }
    }
}

impl BoostedParams {
    pub fn validate(&self) -> Result<()> {
        let fraction = |name: &str, v: f64| {
            if v > 0.0 && v <= 1.0 {
                Ok(())
            } else {
                Err(EvalError::config(format!("{} must be in (0, 1], got {}", name, v)))
            }
        };
        fraction("eta", self.eta)?;
        fraction("subsample", self.subsample)?;
        fraction("colsample_bytree", self.colsample_bytree)?;

        for (name, v) in [
            ("gamma", self.gamma),
            ("lambda", self.lambda),
            ("min_child_weight", self.min_child_weight),
        ] {
            if !(v >= 0.0 && v.is_finite()) {
                return Err(EvalError::config(format!(
                    "{} must be a non-negative number, got {}",
                    name, v
                )));
            }
        }
        if self.max_depth == 0 {
            return Err(EvalError::config("max_depth must be at least 1"));
        }
        if self.num_rounds == 0 {
            return Err(EvalError::config("num_rounds must be at least 1"));
        }
        if self.early_stopping_rounds == Some(0) {
            return Err(EvalError::config("early_stopping_rounds must be at least 1"));
        }
        Ok(())
    }

    /// Apply flat overrides using the usual boosting key names.
    ///
    /// `nthread` is accepted and ignored (folds and splits run on the rayon
    /// pool); `boosting`/`booster` must be `gbtree`.
    pub fn set_params(&mut self, params: &Map<String, Value>) -> Result<()> {
        for (key, value) in params {
            match key.as_str() {
                "objective" => {
                    self.objective = as_str(key, value)?.parse().map_err(EvalError::config)?
                }
                "eta" | "learning_rate" => self.eta = as_f64(key, value)?,
                "max_depth" => self.max_depth = as_usize(key, value)?,
                "subsample" => self.subsample = as_f64(key, value)?,
                "colsample_bytree" => self.colsample_bytree = as_f64(key, value)?,
                "gamma" | "min_split_loss" => self.gamma = as_f64(key, value)?,
                "lambda" | "reg_lambda" => self.lambda = as_f64(key, value)?,
                "min_child_weight" => self.min_child_weight = as_f64(key, value)?,
                "num_rounds" | "num_boost_round" => self.num_rounds = as_usize(key, value)?,
                "early_stopping_rounds" => {
                    self.early_stopping_rounds = match value {
                        Value::Null => None,
                        _ => Some(as_usize(key, value)?),
                    }
                }
                "eval_metric" => {
                    self.eval_metric = as_str(key, value)?.parse().map_err(EvalError::config)?
                }
                "seed" => self.seed = as_usize(key, value)? as u64,
                "nthread" => {
                    as_usize(key, value)?;
                }
                "boosting" | "booster" => {
                    let b = as_str(key, value)?;
                    if b != "gbtree" {
                        return Err(EvalError::config(format!(
                            "Unsupported booster '{}'; only 'gbtree' is available",
                            b
                        )));
                    }
                }
                _ => return Err(unknown_key(key, "boosted")),
            }
        }
        self.validate()
    }
}

/// Parse `key=value` pairs into a flat mapping.
///
/// Values are read as JSON when possible (`0.1`, `true`, `null`), otherwise
/// kept as strings (`eval_metric=auc`).
pub fn parse_key_values(pairs: &[String]) -> Result<Map<String, Value>> {
    let mut map = Map::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| EvalError::config(format!("Expected key=value, got '{}'", pair)))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        map.insert(key.trim().to_string(), value);
    }
    Ok(map)
}

fn unknown_key(key: &str, variant: &str) -> EvalError {
    EvalError::config(format!("Unknown {} model parameter '{}'", variant, key))
}

fn as_f64(key: &str, value: &Value) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| EvalError::config(format!("Parameter '{}' must be a number, got {}", key, value)))
}

fn as_usize(key: &str, value: &Value) -> Result<usize> {
    value
        .as_u64()
        .map(|v| v as usize)
        .ok_or_else(|| {
            EvalError::config(format!(
                "Parameter '{}' must be a non-negative integer, got {}",
                key, value
            ))
        })
}

fn as_bool(key: &str, value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| EvalError::config(format!("Parameter '{}' must be true or false, got {}", key, value)))
}

fn as_str<'a>(key: &str, value: &'a Value) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| EvalError::config(format!("Parameter '{}' must be a string, got {}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_boosted_defaults_are_valid() {
        let p = BoostedParams::default();
        assert!(p.validate().is_ok());
        assert_eq!(p.num_rounds, 200);
        assert_eq!(p.early_stopping_rounds, Some(10));
    }

    #[test]
    fn test_boosted_set_params() {
        let mut p = BoostedParams::default();
        p.set_params(&map(json!({
            "eta": 0.3,
            "max_depth": 3,
            "eval_metric": "auc",
            "early_stopping_rounds": null,
            "nthread": 20,
            "boosting": "gbtree"
        })))
        .unwrap();
        assert_eq!(p.eta, 0.3);
        assert_eq!(p.max_depth, 3);
        assert_eq!(p.eval_metric, EvalMetric::Auc);
        assert_eq!(p.early_stopping_rounds, None);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let mut p = BoostedParams::default();
        let err = p.set_params(&map(json!({"alpha_beta": 1}))).unwrap_err();
        assert!(matches!(err, EvalError::ConfigurationError(_)));
        assert!(err.to_string().contains("alpha_beta"));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let mut p = LinearParams::default();
        assert!(p.set_params(&map(json!({"ifconst": "yes"}))).is_err());
        let mut b = BoostedParams::default();
        assert!(b.set_params(&map(json!({"max_depth": -1}))).is_err());
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut b = BoostedParams::default();
        assert!(b.set_params(&map(json!({"subsample": 1.5}))).is_err());
    }

    #[test]
    fn test_linear_aliases() {
        let mut p = LinearParams::default();
        p.set_params(&map(json!({"ifconst": false, "ifnull": false}))).unwrap();
        assert!(!p.fit_intercept);
        assert!(!p.fill_missing);
    }

    #[test]
    fn test_parse_key_values() {
        let m = parse_key_values(&["eta=0.05".to_string(), "eval_metric=auc".to_string()]).unwrap();
        assert_eq!(m["eta"], json!(0.05));
        assert_eq!(m["eval_metric"], json!("auc"));
        assert!(parse_key_values(&["novalue".to_string()]).is_err());
    }

    #[test]
    fn test_importance_type_round_trip_names() {
        for t in ["weight", "gain", "cover", "total_gain", "total_cover", "coef", "tvalue"] {
            let parsed: ImportanceType = t.parse().unwrap();
            assert_eq!(parsed.to_string(), t);
        }
    }
}
