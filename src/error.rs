//! Error types for feature evaluation and model fitting.
//!
//! Every statistical and model operation in the library returns
//! [`Result`], so callers can match on the failure mode instead of parsing
//! messages. The driver wraps these in `anyhow` with context.

use thiserror::Error;

/// Errors raised by binning, diagnostics and model adapters.
#[derive(Debug, Error)]
pub enum EvalError {
    /// Malformed or empty sample, mismatched row counts, unsupported names.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The feature cannot be split into the requested groups.
    ///
    /// Raised for constant features (zero range) and for quantile edges that
    /// collapse when duplicate edges are not allowed to be dropped.
    #[error("Degenerate feature '{feature}': {reason}")]
    DegenerateFeature {
        /// Feature (or score) name, `"<values>"` when unnamed
        feature: String,
        /// Why no valid grouping exists
        reason: String,
    },

    /// A log-ratio or cumulative rate would be undefined.
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    /// The underlying statistical or tree fit did not converge.
    #[error("Fit failure: {0}")]
    FitFailure(String),

    /// Predict-time feature set/order differs from the one captured at fit time.
    #[error("Schema mismatch: expected features {expected:?}, found {found:?}")]
    SchemaMismatch {
        /// Feature ordering captured at fit time
        expected: Vec<String>,
        /// Feature ordering supplied at predict time
        found: Vec<String>,
    },

    /// Out-of-range configuration value (fold count, group count, hyper-parameter).
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// A deadline expired before the work finished.
    #[error("Cancelled after {completed} of {requested} unit(s) completed")]
    Cancelled {
        /// Units (folds or boosting rounds) that finished before the deadline
        completed: usize,
        /// Units that were requested
        requested: usize,
    },

    /// DataFrame access failed (missing column, failed cast).
    #[error(transparent)]
    Polars(#[from] polars::prelude::PolarsError),
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, EvalError>;

impl EvalError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        EvalError::InvalidInput(msg.into())
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        EvalError::ConfigurationError(msg.into())
    }

    pub(crate) fn degenerate(feature: &str, reason: impl Into<String>) -> Self {
        EvalError::DegenerateFeature {
            feature: feature.to_string(),
            reason: reason.into(),
        }
    }
}

/// A documented fallback that was applied instead of failing.
///
/// Returned next to the value it affected so callers can surface it; the
/// driver echoes these through [`crate::utils::print_warning`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// Missing feature values were replaced with zero before a linear fit.
    MissingFilledWithZero {
        /// Number of cells that were filled
        cells: usize,
    },
    /// PSI occupancy fractions below the floor were raised to it.
    OccupancySmoothed {
        /// Number of (group, sample) cells that were floored
        groups: usize,
        /// Floor that was applied
        epsilon: f64,
    },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::MissingFilledWithZero { cells } => write!(
                f,
                "{} missing value(s) filled with 0 for logistic regression fitting",
                cells
            ),
            Warning::OccupancySmoothed { groups, epsilon } => write!(
                f,
                "{} zero-occupancy group(s) floored to {} in PSI",
                groups, epsilon
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_display() {
        let err = EvalError::degenerate("age", "constant feature (min == max == 3)");
        assert_eq!(
            err.to_string(),
            "Degenerate feature 'age': constant feature (min == max == 3)"
        );
    }

    #[test]
    fn test_cancelled_display() {
        let err = EvalError::Cancelled {
            completed: 2,
            requested: 5,
        };
        assert_eq!(err.to_string(), "Cancelled after 2 of 5 unit(s) completed");
    }

    #[test]
    fn test_schema_mismatch_display_lists_both_orderings() {
        let err = EvalError::SchemaMismatch {
            expected: vec!["a".into(), "b".into()],
            found: vec!["b".into(), "a".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("[\"a\", \"b\"]"));
        assert!(msg.contains("[\"b\", \"a\"]"));
    }

    #[test]
    fn test_warning_display() {
        let w = Warning::MissingFilledWithZero { cells: 3 };
        assert!(w.to_string().contains("3 missing value(s)"));
    }
}
