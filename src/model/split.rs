//! Row partitioning for cross-validation and hold-out evaluation

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{EvalError, Result};

/// Partition `0..n` into `k` disjoint folds of held-out rows.
///
/// The first `n % k` folds hold one extra row, so sizes differ by at most
/// one. Without `shuffle` the folds are consecutive index ranges.
pub fn kfold_partition(n: usize, k: usize, shuffle: bool, seed: u64) -> Result<Vec<Vec<usize>>> {
    if k < 2 {
        return Err(EvalError::config(format!("fold_count must be at least 2, got {}", k)));
    }
    if k > n {
        return Err(EvalError::config(format!(
            "fold_count ({}) exceeds the number of rows ({})",
            k, n
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    if shuffle {
        let mut rng = StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);
    }

    let base = n / k;
    let extra = n % k;
    let mut folds = Vec::with_capacity(k);
    let mut start = 0;
    for fold in 0..k {
        let size = base + usize::from(fold < extra);
        let mut rows = indices[start..start + size].to_vec();
        rows.sort_unstable();
        folds.push(rows);
        start += size;
    }
    Ok(folds)
}

/// Rows of every fold except `fold`, ascending.
pub fn training_rows(folds: &[Vec<usize>], fold: usize) -> Vec<usize> {
    let mut rows: Vec<usize> = folds
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != fold)
        .flat_map(|(_, f)| f.iter().copied())
        .collect();
    rows.sort_unstable();
    rows
}

/// Shuffled `(train, holdout)` split with `holdout_fraction` of the rows held out.
pub fn holdout_split(n: usize, holdout_fraction: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(holdout_fraction > 0.0 && holdout_fraction < 1.0) {
        return Err(EvalError::config(format!(
            "holdout fraction must be in (0, 1), got {}",
            holdout_fraction
        )));
    }
    let holdout = (n as f64 * holdout_fraction).round() as usize;
    if holdout == 0 || holdout == n {
        return Err(EvalError::invalid(format!(
            "{} row(s) cannot be split with holdout fraction {}",
            n, holdout_fraction
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let mut test = indices[..holdout].to_vec();
    let mut train = indices[holdout..].to_vec();
    test.sort_unstable();
    train.sort_unstable();
    Ok((train, test))
}
