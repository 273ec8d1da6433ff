//! `train` subcommand: cross-validated model fitting

use std::time::Instant;

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};

use crate::cli::args::TrainArgs;
use crate::cli::feature_schema;
use crate::model::{
    evaluate, holdout_split, parse_key_values, CrossValidator, CvConfig, CvStatus, LabeledMatrix, ModelSpec,
};
use crate::pipeline::{load_sample, load_schema};
use crate::report::{cv_summary_table, display_table, export_training, importance_table, status_line, RunMetadata};
use crate::utils::{
    print_banner, print_completion, print_config, print_count, print_info, print_step_header, print_step_time,
    print_success, print_warning, ConfigLine,
};

pub fn run_train(args: &TrainArgs) -> Result<()> {
    let data = &args.data;
    let output_path = args.output_path();
    let importance_type = args.importance_type();

    let mut spec = ModelSpec::new(args.model);
    if let ModelSpec::Boosted(params) = &mut spec {
        params.seed = args.seed;
    }
    if let Some(path) = &args.params_file {
        spec.set_params(&read_params_file(path)?)
            .with_context(|| format!("Invalid parameters in {}", path.display()))?;
    }
    spec.set_params(&parse_key_values(&args.params)?)?;

    print_banner(env!("CARGO_PKG_VERSION"));
    let mut options = vec![
        ConfigLine {
            label: "Model",
            value: args.model.to_string(),
        },
        ConfigLine {
            label: "Folds",
            value: format!("{} ({})", args.folds, if args.no_shuffle { "ordered" } else { "shuffled" }),
        },
        ConfigLine {
            label: "Importance",
            value: importance_type.to_string(),
        },
    ];
    if let Some(fraction) = args.holdout {
        options.push(ConfigLine {
            label: "Hold-out",
            value: format!("{:.0}%", fraction * 100.0),
        });
    }
    if let Some(timeout) = args.timeout {
        options.push(ConfigLine {
            label: "Timeout",
            value: format!("{}s", timeout),
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

    let features = if args.features.is_empty() {
        schema.numeric_features(&df)
    } else {
        for f in &args.features {
            match schema.kind(f) {
                Some(kind) if kind.is_numeric() => {}
                Some(kind) => bail!("Feature '{}' is {}; only numeric features can be modelled", f, kind),
                None => bail!("Feature '{}' is not a column of {}", f, data.input.display()),
            }
        }
        args.features.clone()
    };
    if features.is_empty() {
        bail!("No numeric features to train on");
    }

    let sample = LabeledMatrix::from_frame(
        &df,
        &features,
        &data.label,
        data.label_mapping().as_ref(),
        data.weight_column.as_deref(),
    )?;
    print_count("training feature(s)", features.len(), None);
    print_step_time(step_start.elapsed());

    let (train, holdout) = match args.holdout {
        Some(fraction) => {
            let (train_rows, test_rows) = holdout_split(sample.n_rows(), fraction, args.seed)?;
            print_info(&format!(
                "{} rows for cross-validation, {} held out",
                train_rows.len(),
                test_rows.len()
            ));
            (sample.select_rows(&train_rows), Some(sample.select_rows(&test_rows)))
        }
        None => (sample, None),
    };

    // Step 2: Cross-validated fit
    print_step_header(2, "Cross-Validated Training");
    let step_start = Instant::now();
    let config = CvConfig {
        fold_count: args.folds,
        shuffle: !args.no_shuffle,
        seed: args.seed,
        tolerate_fold_failures: args.tolerate_fold_failures,
        deadline: args.timeout().map(|t| Instant::now() + t),
    };
    let model = CrossValidator::new(spec, config)?
        .fit_with_progress(&train)
        .context("Cross-validated training failed")?;

    let line = status_line(model.status(), args.folds);
    match model.status() {
        CvStatus::Complete => print_success(&line),
        _ => print_warning(&line),
    }
    for (fold, warning) in model.warnings() {
        print_warning(&format!("fold {}: {}", fold, warning));
    }
    print_step_time(step_start.elapsed());

    display_table("📊", "FOLD PERFORMANCE", &cv_summary_table(&model.performance_summary()));
    let importance = model.importance(importance_type)?;
    display_table(
        "🏷️ ",
        &format!("IMPORTANCE ({})", importance_type),
        &importance_table(&importance, importance_type),
    );

    if let Some(holdout) = &holdout {
        let preds = model.predict(&holdout.features)?;
        let metrics = evaluate(Some(&holdout.labels), Some(&preds), holdout.weights.as_deref());
        let fmt = |v: Option<f64>| v.map(|v| format!("{:.4}", v)).unwrap_or_else(|| "-".to_string());
        print_info(&format!(
            "Hold-out: AUC {} | Avg Precision {} | Logloss {}",
            fmt(metrics.auc),
            fmt(metrics.avg_precision),
            fmt(metrics.logloss)
        ));
    }

    // Step 3: Save
    print_step_header(3, "Save Results");
    let metadata = RunMetadata::new(
        &data.input.display().to_string(),
        &data.label,
        data.weight_column.as_deref(),
    );
    export_training(&model, importance_type, metadata, &output_path)?;
    print_success(&format!("Saved to {}", output_path.display()));

    print_completion("Training");
    Ok(())
}

fn read_params_file(path: &std::path::Path) -> Result<Map<String, Value>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read parameter file: {}", path.display()))?;
    let value: Value = serde_json::from_str(&json)
        .with_context(|| format!("Parameter file is not valid JSON: {}", path.display()))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => bail!("Parameter file must hold a JSON object: {}", path.display()),
    }
}
