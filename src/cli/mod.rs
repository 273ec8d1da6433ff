//! CLI module - argument parsing and subcommand drivers

mod args;
pub mod evaluate;
pub mod train;

pub use args::{Cli, Commands, DataArgs, EvaluateArgs, TrainArgs};
pub use evaluate::run_evaluate;
pub use train::run_train;

use crate::error::Warning;
use crate::pipeline::Schema;
use crate::utils::print_warning;

/// `schema` without the excluded (label, weight, dropped) columns
pub(crate) fn feature_schema(schema: &Schema, excluded: &[&str]) -> Schema {
    schema
        .iter()
        .filter(|(name, _)| !excluded.contains(name))
        .fold(Schema::new(), |s, (name, kind)| s.with_feature(name, kind))
}

pub(crate) fn print_warnings<'a>(warnings: impl Iterator<Item = &'a Warning>) {
    for warning in warnings {
        print_warning(&warning.to_string());
    }
}
