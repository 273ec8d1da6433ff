//! ftreval: Feature Evaluation Library
//!
//! Binning-based diagnostics for candidate scoring features (PSI, KS,
//! single-factor significance) and cross-validated logistic / boosted-tree
//! models over labelled samples.

pub mod cli;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod utils;

pub use error::{EvalError, Result, Warning};
