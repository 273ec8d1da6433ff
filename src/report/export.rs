//! JSON export of evaluation and training results

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use crate::model::{CrossValidatedModel, CvStatus, ImportanceType, ModelKind, PerformanceSummary};
use crate::pipeline::FeatureKind;
use crate::report::evaluation::FeatureEvaluation;

/// Metadata about the run
#[derive(Debug, Serialize)]
pub struct RunMetadata {
    /// Timestamp of the run (ISO 8601 format)
    pub timestamp: String,
    pub ftreval_version: String,
    pub input_file: String,
    pub label_column: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_column: Option<String>,
}

impl RunMetadata {
    pub fn new(input_file: &str, label_column: &str, weight_column: Option<&str>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            ftreval_version: env!("CARGO_PKG_VERSION").to_string(),
            input_file: input_file.to_string(),
            label_column: label_column.to_string(),
            weight_column: weight_column.map(|s| s.to_string()),
        }
    }
}

/// Counts over the evaluated features
#[derive(Debug, Serialize)]
pub struct EvaluationSummary {
    pub total_features: usize,
    pub numeric_features: usize,
    pub categorical_features: usize,
    pub features_dropped: usize,
    pub features_kept: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison_file: Option<String>,
}

/// Feature evaluation export
#[derive(Debug, Serialize)]
pub struct EvaluationExport<'a> {
    pub metadata: RunMetadata,
    pub summary: EvaluationSummary,
    pub features: &'a [FeatureEvaluation],
}

/// Cross-validated training export
#[derive(Debug, Serialize)]
pub struct TrainingExport {
    pub metadata: RunMetadata,
    pub model: ModelKind,
    pub features: Vec<String>,
    pub fold_count: usize,
    pub status: CvStatus,
    pub performance: PerformanceSummary,
    pub importance_type: ImportanceType,
    pub importance: Vec<ImportanceEntry>,
}

#[derive(Debug, Serialize)]
pub struct ImportanceEntry {
    pub feature: String,
    pub value: f64,
}

/// Write the feature evaluation to `output_path` as pretty JSON.
pub fn export_evaluation(
    evaluations: &[FeatureEvaluation],
    metadata: RunMetadata,
    comparison_file: Option<&str>,
    output_path: &Path,
) -> Result<()> {
    let numeric_features = evaluations.iter().filter(|e| e.kind.is_numeric()).count();
    let categorical_features = evaluations
        .iter()
        .filter(|e| e.kind == FeatureKind::Categorical)
        .count();
    let features_dropped = evaluations.iter().filter(|e| e.is_dropped()).count();

    let export = EvaluationExport {
        metadata,
        summary: EvaluationSummary {
            total_features: evaluations.len(),
            numeric_features,
            categorical_features,
            features_dropped,
            features_kept: evaluations.len() - features_dropped,
            comparison_file: comparison_file.map(|s| s.to_string()),
        },
        features: evaluations,
    };
    write_json(&export, output_path, "feature evaluation")
}

/// Write the cross-validated model summary to `output_path` as pretty JSON.
pub fn export_training(
    model: &CrossValidatedModel,
    importance_type: ImportanceType,
    metadata: RunMetadata,
    output_path: &Path,
) -> Result<()> {
    let importance = model
        .importance(importance_type)
        .context("Failed to compute fold-averaged importance")?
        .into_iter()
        .map(|(feature, value)| ImportanceEntry { feature, value })
        .collect();

    let export = TrainingExport {
        metadata,
        model: model.kind(),
        features: model.feature_names().to_vec(),
        fold_count: model.folds().len(),
        status: model.status().clone(),
        performance: model.performance_summary(),
        importance_type,
        importance,
    };
    write_json(&export, output_path, "training summary")
}

fn write_json<T: Serialize>(value: &T, output_path: &Path, what: &str) -> Result<()> {
    let json = serde_json::to_string_pretty(value).with_context(|| format!("Failed to serialize {} to JSON", what))?;
    std::fs::write(output_path, json)
        .with_context(|| format!("Failed to write {} to {}", what, output_path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CrossValidator, CvConfig, FeatureMatrix, LabeledMatrix, LinearParams, ModelSpec};

    #[test]
    fn test_export_training_json() {
        let rows: Vec<Vec<f64>> = (0..80).map(|i| vec![(i % 40) as f64 / 4.0]).collect();
        let labels = (0..80).map(|i| (((i % 40) * 7) % 10 < (i % 40) / 4) as u8).collect();
        let x = FeatureMatrix::from_rows(vec!["x".to_string()], &rows).unwrap();
        let data = LabeledMatrix::new(x, labels, None).unwrap();
        let model = CrossValidator::new(ModelSpec::Linear(LinearParams::default()), CvConfig::new(2, false))
            .unwrap()
            .fit(&data)
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.json");
        export_training(&model, ImportanceType::Coef, RunMetadata::new("in.csv", "y", None), &path).unwrap();

        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["model"], "linear");
        assert_eq!(json["fold_count"], 2);
        assert_eq!(json["status"]["status"], "complete");
        assert_eq!(json["importance"][0]["feature"], "const");
        assert!(json["performance"]["test"]["auc"].is_number());
        assert!(json["metadata"].get("weight_column").is_none());
    }
}
