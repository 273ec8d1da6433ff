//! ftreval: feature evaluation and cross-validated scorecard CLI
//!
//! `evaluate` reports coverage, KS, single-factor z-values and PSI per
//! feature; `train` fits a cross-validated logistic or boosted-tree model.

use anyhow::Result;
use clap::Parser;

use ftreval::cli::{run_evaluate, run_train, Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Evaluate(args) => run_evaluate(args),
        Commands::Train(args) => run_train(args),
    }
}
