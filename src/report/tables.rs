//! Terminal tables for diagnostics and model summaries

use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, CellAlignment, Color, Table};
use console::style;

use crate::model::{CvStatus, ImportanceType, Metrics, PerformanceSummary};
use crate::pipeline::{CorrelatedPair, KsReport, PsiReport};
use crate::report::evaluation::FeatureEvaluation;

/// PSI above this is a significant shift
const PSI_SHIFT: f64 = 0.25;
/// PSI above this is worth watching
const PSI_WATCH: f64 = 0.1;

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|n| Cell::new(n).add_attribute(Attribute::Bold))
        .collect()
}

fn num(v: f64, decimals: usize) -> Cell {
    Cell::new(format!("{:.*}", decimals, v)).set_alignment(CellAlignment::Right)
}

fn opt(v: Option<f64>, decimals: usize) -> Cell {
    match v {
        Some(v) => num(v, decimals),
        None => Cell::new("-").fg(Color::DarkGrey).set_alignment(CellAlignment::Right),
    }
}

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table
}

/// Per-group KS table, rows in report order
pub fn ks_table(report: &KsReport) -> Table {
    let mut table = new_table();
    table.set_header(header(&[
        "Group", "Min", "Max", "Size", "Bad", "Good", "Bad Rate", "Cum Bad %", "Cum Good %", "KS",
    ]));

    let best = report
        .rows
        .iter()
        .map(|r| r.ks.abs())
        .fold(f64::NEG_INFINITY, f64::max);
    for row in &report.rows {
        let ks = num(row.ks, 4);
        let ks = if row.ks.abs() == best {
            ks.fg(Color::Green).add_attribute(Attribute::Bold)
        } else {
            ks
        };
        table.add_row(vec![
            Cell::new(row.group),
            num(row.min_value, 4),
            num(row.max_value, 4),
            Cell::new(row.size),
            Cell::new(row.bad_count),
            Cell::new(row.good_count),
            num(row.bad_rate, 4),
            num(row.bad_cumsum_rate, 4),
            num(row.good_cumsum_rate, 4),
            ks,
        ]);
    }
    table
}

/// Per-group PSI table
pub fn psi_table(report: &PsiReport) -> Table {
    let mut table = new_table();
    table.set_header(header(&["Group", "Range", "Count A", "Count B", "Frac A", "Frac B", "PSI"]));
    for row in &report.rows {
        table.add_row(vec![
            Cell::new(row.group),
            Cell::new(&row.label),
            Cell::new(row.count_a),
            Cell::new(row.count_b),
            num(row.frac_a, 4),
            num(row.frac_b, 4),
            num(row.psi, 5),
        ]);
    }
    table.add_row(vec![
        Cell::new("Total").add_attribute(Attribute::Bold),
        Cell::new(""),
        Cell::new(""),
        Cell::new(""),
        Cell::new(""),
        Cell::new(""),
        num(report.value, 5).fg(psi_color(report.value)).add_attribute(Attribute::Bold),
    ]);
    table
}

fn psi_color(value: f64) -> Color {
    if value > PSI_SHIFT {
        Color::Red
    } else if value > PSI_WATCH {
        Color::Yellow
    } else {
        Color::Green
    }
}

/// One row per evaluated feature
pub fn evaluation_table(rows: &[FeatureEvaluation]) -> Table {
    let mut table = new_table();
    let with_psi = rows.iter().any(|r| r.psi.is_some());
    let mut names = vec!["Feature", "Kind", "Coverage", "Distinct", "Dominant", "KS", "z-value"];
    if with_psi {
        names.push("PSI");
    }
    names.push("Status");
    table.set_header(header(&names));

    for row in rows {
        let mut cells = vec![
            Cell::new(&row.feature),
            Cell::new(row.kind),
            num(row.coverage_rate, 3),
            Cell::new(row.distinct),
            num(row.dominant_share, 3),
            opt(row.max_ks, 4),
            opt(row.z_value, 3),
        ];
        if with_psi {
            cells.push(match row.psi {
                Some(v) => num(v, 4).fg(psi_color(v)),
                None => opt(None, 4),
            });
        }
        cells.push(match &row.drop_reason {
            Some(reason) => Cell::new(reason.to_string()).fg(Color::Red),
            None => Cell::new("keep").fg(Color::Green),
        });
        table.add_row(cells);
    }
    table
}

/// Fold-averaged metrics with their standard deviations
pub fn cv_summary_table(summary: &PerformanceSummary) -> Table {
    let mut table = new_table();
    table.set_header(header(&["Metric", "Train", "Train Std", "Test", "Test Std"]));
    let metric = |pick: fn(&Metrics) -> Option<f64>| {
        [
            opt(pick(&summary.train), 4),
            opt(pick(&summary.train_std), 4),
            opt(pick(&summary.test), 4),
            opt(pick(&summary.test_std), 4),
        ]
    };
    for (name, pick) in [
        ("AUC", (|m: &Metrics| m.auc) as fn(&Metrics) -> Option<f64>),
        ("Avg Precision", |m: &Metrics| m.avg_precision),
        ("Logloss", |m: &Metrics| m.logloss),
    ] {
        let mut cells = vec![Cell::new(name)];
        cells.extend(metric(pick));
        table.add_row(cells);
    }
    table
}

/// Importance vector sorted by magnitude, largest first
pub fn importance_table(importance: &[(String, f64)], kind: ImportanceType) -> Table {
    let mut sorted: Vec<&(String, f64)> = importance.iter().collect();
    sorted.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));

    let mut table = new_table();
    table.set_header(header(&["#", "Feature", &kind.to_string()]));
    for (i, (name, value)) in sorted.into_iter().enumerate() {
        table.add_row(vec![Cell::new(i + 1), Cell::new(name), num(*value, 5)]);
    }
    table
}

/// Feature pairs above the correlation threshold, strongest first
pub fn correlation_table(pairs: &[CorrelatedPair]) -> Table {
    let mut table = new_table();
    table.set_header(header(&["Feature 1", "Feature 2", "Correlation"]));
    for pair in pairs {
        table.add_row(vec![
            Cell::new(&pair.feature1),
            Cell::new(&pair.feature2),
            num(pair.correlation, 4).fg(Color::Yellow),
        ]);
    }
    table
}

/// Human-readable fold status
pub fn status_line(status: &CvStatus, requested: usize) -> String {
    match status {
        CvStatus::Complete => format!("{} of {} folds contributed", requested, requested),
        CvStatus::Partial { failed } => format!(
            "{} of {} folds contributed (failed: {})",
            requested - failed.len(),
            requested,
            failed.iter().map(|f| f.to_string()).collect::<Vec<_>>().join(", ")
        ),
        CvStatus::Cancelled { completed } => format!(
            "deadline reached: {} of {} folds contributed",
            completed, requested
        ),
    }
}

/// Print a titled, indented table
pub fn display_table(icon: &str, title: &str, table: &Table) {
    println!();
    println!("    {} {}", style(icon).cyan(), style(title).white().bold());
    println!("    {}", style("─".repeat(50)).dim());
    println!();
    for line in table.to_string().lines() {
        println!("    {}", line);
    }
}
