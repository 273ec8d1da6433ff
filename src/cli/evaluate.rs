//! `evaluate` subcommand: per-feature diagnostics

use std::time::Instant;

use anyhow::{Context, Result};

use crate::cli::args::EvaluateArgs;
use crate::cli::{feature_schema, print_warnings};
use crate::pipeline::{
    correlation_frame, ks_frame, load_sample, load_schema, psi_frame, sample_weights, KsConfig, PrescreenConfig,
    PsiConfig, Schema,
};
use crate::report::{
    correlation_table, display_table, evaluation_table, export_evaluation, evaluate_features, ks_table, psi_table,
    EvaluationConfig, FeatureEvaluation, RunMetadata,
};
use crate::utils::{
    create_spinner, finish_with_success, finish_with_warning, print_banner, print_completion, print_config,
    print_count, print_info, print_step_header, print_step_time, print_success, ConfigLine,
};

pub fn run_evaluate(args: &EvaluateArgs) -> Result<()> {
    let data = &args.data;
    let output_path = args.output_path();
    let mapping = data.label_mapping();

    print_banner(env!("CARGO_PKG_VERSION"));
    let mut options = vec![
        ConfigLine {
            label: "Groups",
            value: args.group_count.to_string(),
        },
        ConfigLine {
            label: "KS duplicates",
            value: args.duplicates.to_string(),
        },
        ConfigLine {
            label: "Min coverage",
            value: format!("{:.2}", args.min_coverage),
        },
        ConfigLine {
            label: "Max dominance",
            value: format!("{:.2}", args.max_dominance),
        },
    ];
    if let Some(threshold) = args.corr_threshold {
        options.push(ConfigLine {
            label: "Correlation",
            value: format!("|r| > {:.2}", threshold),
        });
    }
    if let Some(compare) = &args.compare {
        options.push(ConfigLine {
            label: "PSI against",
            value: compare.display().to_string(),
        });
    }
    print_config(&data.input, &data.label, Some(&output_path), &options);

    // Step 1: Load
    print_step_header(1, "Load Data");
    let step_start = Instant::now();
    let declared = data.schema.as_deref().map(load_schema).transpose()?;
    let excluded = data.excluded_columns();
    let (df, schema) = load_sample(&data.input, declared.as_ref(), &excluded)?;
    let schema = feature_schema(&schema, &excluded);
    let compare = match &args.compare {
        Some(path) => Some(load_sample(path, Some(&schema), &excluded)?.0),
        None => None,
    };
    print_count("feature(s) to evaluate", schema.len(), None);
    print_step_time(step_start.elapsed());

    // Step 2: Diagnostics
    print_step_header(2, "Feature Diagnostics");
    let step_start = Instant::now();
    let config = EvaluationConfig {
        ks: KsConfig {
            duplicates: args.duplicates,
            ..KsConfig::new(args.group_count, args.ascending)
        },
        psi: PsiConfig {
            zero_occupancy: args.zero_occupancy,
            ..PsiConfig::new(args.group_count)
        },
        prescreen: PrescreenConfig {
            min_coverage: args.min_coverage,
            max_dominance: args.max_dominance,
        },
        include_intercept: !args.no_intercept,
    };
    let spinner = create_spinner("Computing KS, z-values and PSI...");
    let (evaluations, warnings) =
        evaluate_features(&df, &schema, &data.label, mapping.as_ref(), compare.as_ref(), &config)
            .context("Feature evaluation failed")?;
    let failed = evaluations.iter().filter(|e| !e.notes.is_empty()).count();
    if failed == 0 {
        finish_with_success(&spinner, "Diagnostics complete");
    } else {
        finish_with_warning(
            &spinner,
            &format!("Diagnostics complete; {} feature(s) with diagnostics that could not be computed", failed),
        );
    }
    print_warnings(warnings.iter());

    let dropped = evaluations.iter().filter(|e| e.is_dropped()).count();
    if dropped == 0 {
        print_info("Every feature passes the coverage and dominance pre-screen");
    } else {
        print_count("feature(s) failing the pre-screen", dropped, None);
    }
    print_step_time(step_start.elapsed());

    display_table("📋", "FEATURE EVALUATION", &evaluation_table(&evaluations));
    if let Some(threshold) = args.corr_threshold {
        show_correlations(&df, &evaluations, data.weight_column.as_deref(), threshold)?;
    }
    for feature in &args.detail {
        show_detail(&df, compare.as_ref(), &schema, feature, args, &config)?;
    }

    // Step 3: Save
    print_step_header(3, "Save Results");
    let metadata = RunMetadata::new(
        &data.input.display().to_string(),
        &data.label,
        data.weight_column.as_deref(),
    );
    let comparison = args.compare.as_ref().map(|p| p.display().to_string());
    export_evaluation(&evaluations, metadata, comparison.as_deref(), &output_path)?;
    print_success(&format!("Saved to {}", output_path.display()));

    print_completion("Evaluation");
    Ok(())
}

/// Correlated pairs among the numeric features that passed the pre-screen
fn show_correlations(
    df: &polars::prelude::DataFrame,
    evaluations: &[FeatureEvaluation],
    weight_column: Option<&str>,
    threshold: f64,
) -> Result<()> {
    let kept: Vec<String> = evaluations
        .iter()
        .filter(|e| e.kind.is_numeric() && !e.is_dropped())
        .map(|e| e.feature.clone())
        .collect();
    if kept.len() < 2 {
        print_info("Fewer than two numeric features kept; no correlations to report");
        return Ok(());
    }

    let weights = sample_weights(df, weight_column)?;
    let matrix = correlation_frame(df, &kept, weights.as_deref()).context("Correlation matrix failed")?;
    let pairs = matrix.pairs_above(threshold);
    if pairs.is_empty() {
        print_info(&format!("No feature pairs with |r| > {:.2}", threshold));
    } else {
        display_table(
            "🔗",
            &format!("CORRELATED PAIRS (|r| > {:.2})", threshold),
            &correlation_table(&pairs),
        );
    }
    Ok(())
}

fn show_detail(
    df: &polars::prelude::DataFrame,
    compare: Option<&polars::prelude::DataFrame>,
    schema: &Schema,
    feature: &str,
    args: &EvaluateArgs,
    config: &EvaluationConfig,
) -> Result<()> {
    let kind = schema
        .kind(feature)
        .with_context(|| format!("--detail feature '{}' is not an evaluated feature", feature))?;

    if kind.is_numeric() {
        let mapping = args.data.label_mapping();
        let report = ks_frame(df, feature, &args.data.label, mapping.as_ref(), &config.ks)
            .with_context(|| format!("KS table of '{}'", feature))?;
        display_table(
            "📈",
            &format!("KS: {} (max {:.4})", feature, report.max_ks),
            &ks_table(&report),
        );
    }
    if let Some(other) = compare {
        let report = psi_frame(df, other, feature, kind, &config.psi)
            .with_context(|| format!("PSI table of '{}'", feature))?;
        print_warnings(report.warnings.iter());
        display_table("📉", &format!("PSI: {}", feature), &psi_table(&report));
    }
    Ok(())
}
