//! Command-line argument definitions using clap

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::model::{ImportanceType, ModelKind};
use crate::pipeline::{DuplicatePolicy, LabelMapping, ZeroOccupancy};

/// ftreval - Evaluate scoring features and train cross-validated classifiers
#[derive(Parser, Debug)]
#[command(name = "ftreval")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Profile features and report KS, z-value and (optionally) PSI per feature
    Evaluate(EvaluateArgs),

    /// Train a cross-validated logistic or gradient-boosted model
    Train(TrainArgs),
}

/// Input dataset and label options shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Input file path (CSV or Parquet)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Binary label column (1 = bad, 0 = good)
    #[arg(short, long)]
    pub label: String,

    /// Label value that represents BAD (maps to 1).
    /// Required with --good-value when the label is not binary 0/1.
    #[arg(long, requires = "good_value")]
    pub bad_value: Option<String>,

    /// Label value that represents GOOD (maps to 0).
    #[arg(long, requires = "bad_value")]
    pub good_value: Option<String>,

    /// Column containing sample weights. Default: equal weights of 1.0.
    #[arg(short = 'w', long)]
    pub weight_column: Option<String>,

    /// JSON file declaring feature types ({"age": "integer", "grade": "categorical"}).
    /// Without it, types are taken from the storage types of the input once at load time.
    #[arg(long)]
    pub schema: Option<PathBuf>,

    /// Columns to ignore (comma-separated), e.g. identifiers or dates
    #[arg(long, value_delimiter = ',')]
    pub drop_columns: Vec<String>,
}

impl DataArgs {
    pub fn label_mapping(&self) -> Option<LabelMapping> {
        match (&self.bad_value, &self.good_value) {
            (Some(bad), Some(good)) => Some(LabelMapping::new(bad, good)),
            _ => None,
        }
    }

    /// Columns that are never features: label, weight and dropped columns
    pub fn excluded_columns(&self) -> Vec<&str> {
        let mut excluded = vec![self.label.as_str()];
        excluded.extend(self.weight_column.as_deref());
        excluded.extend(self.drop_columns.iter().map(|s| s.as_str()));
        excluded
    }
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Second dataset (e.g. out-of-time sample) to compute PSI against
    #[arg(long)]
    pub compare: Option<PathBuf>,

    /// Number of groups for the KS and PSI tables
    #[arg(long, default_value = "10", value_parser = validate_group_count)]
    pub group_count: usize,

    /// Order KS rows from the lowest value up (default: highest value = highest risk first)
    #[arg(long, default_value = "false")]
    pub ascending: bool,

    /// Handling of coinciding quantile edges in KS: keep, drop or error
    #[arg(long, default_value = "drop")]
    pub duplicates: DuplicatePolicy,

    /// Zero-occupancy PSI groups: smooth (floor to epsilon) or error
    #[arg(long, default_value = "smooth")]
    pub zero_occupancy: ZeroOccupancy,

    /// Fit the single-factor significance model without a constant
    #[arg(long, default_value = "false")]
    pub no_intercept: bool,

    /// Minimum coverage (share of non-missing records) to keep a feature
    #[arg(long, default_value = "0.05", value_parser = validate_rate)]
    pub min_coverage: f64,

    /// Maximum share of the most frequent value to keep a feature
    #[arg(long, default_value = "0.95", value_parser = validate_rate)]
    pub max_dominance: f64,

    /// Report numeric feature pairs whose absolute correlation exceeds this
    #[arg(long, value_parser = validate_rate)]
    pub corr_threshold: Option<f64>,

    /// Print the full KS (and PSI) tables of these features (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub detail: Vec<String>,

    /// Output JSON path. Defaults to '<input>_evaluation.json' next to the input.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl EvaluateArgs {
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| derived_path(&self.data.input, "evaluation"))
    }
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Model type: lr (logistic regression) or xgb (gradient-boosted trees)
    #[arg(short, long, default_value = "lr")]
    pub model: ModelKind,

    /// Features to train on (comma-separated). Default: every numeric feature.
    #[arg(long, value_delimiter = ',')]
    pub features: Vec<String>,

    /// Number of cross-validation folds
    #[arg(short = 'k', long, default_value = "5", value_parser = validate_fold_count)]
    pub folds: usize,

    /// Seed for fold shuffling, hold-out split and tree sampling
    #[arg(long, default_value = "0")]
    pub seed: u64,

    /// Use consecutive folds instead of shuffled ones
    #[arg(long, default_value = "false")]
    pub no_shuffle: bool,

    /// Model parameter override as key=value (repeatable), e.g. --param eta=0.05
    #[arg(short = 'p', long = "param")]
    pub params: Vec<String>,

    /// JSON file with model parameter overrides, applied before --param
    #[arg(long)]
    pub params_file: Option<PathBuf>,

    /// Importance type to report. Default: coef for lr, gain for xgb.
    #[arg(long)]
    pub importance: Option<ImportanceType>,

    /// Exclude folds whose fit fails instead of aborting
    #[arg(long, default_value = "false")]
    pub tolerate_fold_failures: bool,

    /// Stop fitting after this many seconds; completed folds are kept
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Hold out this fraction of rows for an out-of-sample check of the averaged model
    #[arg(long, value_parser = validate_holdout)]
    pub holdout: Option<f64>,

    /// Output JSON path. Defaults to '<input>_training.json' next to the input.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl TrainArgs {
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| derived_path(&self.data.input, "training"))
    }

    pub fn importance_type(&self) -> ImportanceType {
        self.importance.unwrap_or(match self.model {
            ModelKind::Linear => ImportanceType::Coef,
            ModelKind::Boosted => ImportanceType::Gain,
        })
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}

/// `<dir>/<stem>_<suffix>.json` next to `input`
fn derived_path(input: &Path, suffix: &str) -> PathBuf {
    let parent = input.parent().unwrap_or_else(|| Path::new("."));
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    parent.join(format!("{}_{}.json", stem, suffix))
}

/// Validator for group_count
fn validate_group_count(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if value < 2 {
        Err(format!("group_count must be at least 2, got {}", value))
    } else {
        Ok(value)
    }
}

/// Validator for the fold count
fn validate_fold_count(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if value < 2 {
        Err(format!("folds must be at least 2, got {}", value))
    } else {
        Ok(value)
    }
}

/// Validator for rates in [0, 1]
fn validate_rate(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if !(0.0..=1.0).contains(&value) {
        Err(format!("value must be between 0.0 and 1.0, got {}", value))
    } else {
        Ok(value)
    }
}

/// Validator for the hold-out fraction
fn validate_holdout(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if value > 0.0 && value < 1.0 {
        Ok(value)
    } else {
        Err(format!("holdout must be strictly between 0.0 and 1.0, got {}", value))
    }
}
