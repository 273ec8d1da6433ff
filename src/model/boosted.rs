//! Gradient-boosted tree adapter
//!
//! Second-order boosting of the logistic loss. Every round fits one
//! regression tree to the gradients/hessians of the current margins:
//!
//! - split score `G_L^2/(H_L+lambda) + G_R^2/(H_R+lambda) - G^2/(H+lambda)`,
//!   kept only when it exceeds `gamma` and both children carry at least
//!   `min_child_weight` hessian mass
//! - leaf weight `-eta * G / (H + lambda)`
//! - missing values follow a learned default direction per split
//! - rows are subsampled per round, features per tree
//!
//! With an evaluation split and `early_stopping_rounds`, boosting stops once
//! the eval metric has not improved for that many rounds and the ensemble is
//! truncated to its best round.

use std::collections::BTreeMap;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::error::{EvalError, Result};
use crate::model::matrix::{FeatureMatrix, LabeledMatrix};
use crate::model::metrics::{evaluate, PerformanceRecord};
use crate::model::params::{BoostedParams, EvalMetric, ImportanceType};

/// Lower bound on per-row hessians so saturated rows never divide by zero
const MIN_HESSIAN: f64 = 1e-16;

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        /// Rows with `value < threshold` go left
        threshold: f64,
        /// Where missing values go
        default_left: bool,
        left: usize,
        right: usize,
        gain: f64,
        cover: f64,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    default_left,
                    left,
                    right,
                    ..
                } => {
                    let v = row[*feature];
                    let go_left = if v.is_nan() { *default_left } else { v < *threshold };
                    idx = if go_left { *left } else { *right };
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    default_left: bool,
    gain: f64,
}

struct TreeBuilder<'a> {
    x: &'a FeatureMatrix,
    grad: &'a [f64],
    hess: &'a [f64],
    features: &'a [usize],
    params: &'a BoostedParams,
    nodes: Vec<Node>,
}

impl<'a> TreeBuilder<'a> {
    fn build(mut self, rows: &[usize]) -> Tree {
        self.grow(rows, 0);
        Tree { nodes: self.nodes }
    }

    fn grow(&mut self, rows: &[usize], depth: usize) -> usize {
        let (g, h) = self.sums(rows);
        let leaf = Node::Leaf {
            value: -self.params.eta * g / (h + self.params.lambda),
        };

        if depth >= self.params.max_depth || rows.len() < 2 {
            return self.push(leaf);
        }

        let Some(best) = self.best_split(rows, g, h) else {
            return self.push(leaf);
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows.iter().partition(|&&r| {
            let v = self.x.get(r, best.feature);
            if v.is_nan() {
                best.default_left
            } else {
                v < best.threshold
            }
        });

        let idx = self.push(leaf);
        let left = self.grow(&left_rows, depth + 1);
        let right = self.grow(&right_rows, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            default_left: best.default_left,
            left,
            right,
            gain: best.gain,
            cover: h,
        };
        idx
    }

    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn sums(&self, rows: &[usize]) -> (f64, f64) {
        rows.iter()
            .fold((0.0, 0.0), |(g, h), &r| (g + self.grad[r], h + self.hess[r]))
    }

    /// Best split over the sampled features; ties go to the lower feature index.
    fn best_split(&self, rows: &[usize], g: f64, h: f64) -> Option<SplitCandidate> {
        let candidates: Vec<Option<SplitCandidate>> = self
            .features
            .par_iter()
            .map(|&f| self.best_split_for_feature(rows, f, g, h))
            .collect();

        candidates.into_iter().flatten().fold(None, |best, c| match best {
            Some(b) if b.gain >= c.gain => Some(b),
            _ => Some(c),
        })
    }

    fn best_split_for_feature(&self, rows: &[usize], feature: usize, g: f64, h: f64) -> Option<SplitCandidate> {
        let lambda = self.params.lambda;
        let min_child = self.params.min_child_weight;
        let parent = g * g / (h + lambda);

        let mut present: Vec<(f64, f64, f64)> = Vec::with_capacity(rows.len());
        let (mut g_missing, mut h_missing) = (0.0, 0.0);
        for &r in rows {
            let v = self.x.get(r, feature);
            if v.is_nan() {
                g_missing += self.grad[r];
                h_missing += self.hess[r];
            } else {
                present.push((v, self.grad[r], self.hess[r]));
            }
        }
        if present.len() < 2 {
            return None;
        }
        present.sort_by(|a, b| a.0.total_cmp(&b.0));

        let score = |gl: f64, hl: f64| -> Option<f64> {
            let (gr, hr) = (g - gl, h - hl);
            if hl < min_child || hr < min_child {
                return None;
            }
            Some(gl * gl / (hl + lambda) + gr * gr / (hr + lambda) - parent)
        };

        let mut best: Option<SplitCandidate> = None;
        let (mut gl, mut hl) = (0.0, 0.0);
        for i in 0..present.len() - 1 {
            gl += present[i].1;
            hl += present[i].2;
            if present[i].0 == present[i + 1].0 {
                continue;
            }
            let threshold = present[i].0 + (present[i + 1].0 - present[i].0) / 2.0;

            // Missing to the right, then missing to the left
            for (default_left, gain) in [
                (false, score(gl, hl)),
                (true, score(gl + g_missing, hl + h_missing)),
            ] {
                if let Some(gain) = gain {
                    if gain > self.params.gamma && best.map_or(true, |b| gain > b.gain) {
                        best = Some(SplitCandidate {
                            feature,
                            threshold,
                            default_left,
                            gain,
                        });
                    }
                }
            }
        }
        best
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Eval-split score for early stopping, `None` when undefined.
fn eval_score(metric: EvalMetric, labels: &[u8], preds: &[f64], weights: Option<&[f64]>) -> Option<f64> {
    match metric {
        EvalMetric::Logloss => evaluate(Some(labels), Some(preds), weights).logloss,
        EvalMetric::Auc => evaluate(Some(labels), Some(preds), weights).auc,
        EvalMetric::Error => {
            let w = |i: usize| weights.map(|w| w[i]).unwrap_or(1.0);
            let total: f64 = (0..labels.len()).map(w).sum();
            if total <= 0.0 {
                return None;
            }
            let wrong: f64 = (0..labels.len())
                .filter(|&i| (preds[i] > 0.5) != (labels[i] == 1))
                .map(w)
                .sum();
            Some(wrong / total)
        }
    }
}

/// Fitted gradient-boosted ensemble
#[derive(Debug, Clone)]
pub struct BoostedModel {
    feature_names: Vec<String>,
    params: BoostedParams,
    trees: Vec<Tree>,
    /// Round (0-based) with the best eval score when early stopping applied
    best_iteration: Option<usize>,
    rounds_trained: usize,
    eval_history: Vec<f64>,
    performance: PerformanceRecord,
}

impl BoostedModel {
    /// Boost on `train`, watching `eval` for early stopping and test metrics.
    ///
    /// Exceeding `params.deadline` fails with [`EvalError::Cancelled`].
    pub fn fit(train: &LabeledMatrix, eval: Option<&LabeledMatrix>, params: &BoostedParams) -> Result<Self> {
        params.validate()?;
        let names = train.features.feature_names().to_vec();
        if names.is_empty() {
            return Err(EvalError::invalid("Boosted model needs at least one feature"));
        }
        if let Some(eval) = eval {
            eval.features.check_schema(&names)?;
        }

        let n = train.n_rows();
        let k = names.len();
        let y: Vec<f64> = train.labels.iter().map(|l| *l as f64).collect();
        let mut rng = StdRng::seed_from_u64(params.seed);

        let mut margins = vec![0.0; n];
        let mut eval_margins = eval.map(|e| vec![0.0; e.n_rows()]);
        let mut trees: Vec<Tree> = Vec::with_capacity(params.num_rounds);
        let mut eval_history = Vec::new();
        let mut best: Option<(usize, f64)> = None;

        let row_count = ((n as f64 * params.subsample).ceil() as usize).clamp(1, n);
        let feature_count = ((k as f64 * params.colsample_bytree).round() as usize).clamp(1, k);

        for round in 0..params.num_rounds {
            if params.deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(EvalError::Cancelled {
                    completed: round,
                    requested: params.num_rounds,
                });
            }

            let mut grad = vec![0.0; n];
            let mut hess = vec![0.0; n];
            for i in 0..n {
                let p = sigmoid(margins[i]);
                let w = train.weight(i);
                grad[i] = w * (p - y[i]);
                hess[i] = w * (p * (1.0 - p)).max(MIN_HESSIAN);
            }

            let mut rows = if row_count < n {
                sample(&mut rng, n, row_count).into_vec()
            } else {
                (0..n).collect()
            };
            rows.sort_unstable();
            let mut features = if feature_count < k {
                sample(&mut rng, k, feature_count).into_vec()
            } else {
                (0..k).collect()
            };
            features.sort_unstable();

            let tree = TreeBuilder {
                x: &train.features,
                grad: &grad,
                hess: &hess,
                features: &features,
                params,
                nodes: Vec::new(),
            }
            .build(&rows);

            for (i, m) in margins.iter_mut().enumerate() {
                *m += tree.predict(train.features.row(i));
            }
            if let (Some(eval), Some(em)) = (eval, eval_margins.as_mut()) {
                for (i, m) in em.iter_mut().enumerate() {
                    *m += tree.predict(eval.features.row(i));
                }
            }
            trees.push(tree);

            if let (Some(eval), Some(em), Some(patience)) = (eval, eval_margins.as_ref(), params.early_stopping_rounds) {
                let preds: Vec<f64> = em.iter().map(|m| sigmoid(*m)).collect();
                if let Some(score) = eval_score(params.eval_metric, &eval.labels, &preds, eval.weights.as_deref()) {
                    eval_history.push(score);
                    let improved = match best {
                        None => true,
                        Some((_, b)) if params.eval_metric.maximize() => score > b,
                        Some((_, b)) => score < b,
                    };
                    if improved {
                        best = Some((round, score));
                    } else if best.is_some_and(|(r, _)| round - r >= patience) {
                        break;
                    }
                }
            }
        }

        let rounds_trained = trees.len();
        let best_iteration = best.map(|(r, _)| r);
        if let Some(r) = best_iteration {
            trees.truncate(r + 1);
        }

        let mut model = Self {
            feature_names: names,
            params: params.clone(),
            trees,
            best_iteration,
            rounds_trained,
            eval_history,
            performance: PerformanceRecord::default(),
        };

        let train_pred = model.predict_unchecked(&train.features);
        model.performance.train = evaluate(Some(&train.labels), Some(&train_pred), train.weights.as_deref());
        if let Some(eval) = eval {
            let test_pred = model.predict_unchecked(&eval.features);
            model.performance.test = evaluate(Some(&eval.labels), Some(&test_pred), eval.weights.as_deref());
        }
        Ok(model)
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn params(&self) -> &BoostedParams {
        &self.params
    }

    pub fn performance(&self) -> &PerformanceRecord {
        &self.performance
    }

    /// Trees kept in the ensemble
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn best_iteration(&self) -> Option<usize> {
        self.best_iteration
    }

    /// Rounds boosted before stopping (kept trees may be fewer)
    pub fn rounds_trained(&self) -> usize {
        self.rounds_trained
    }

    /// Eval metric after each round, when early stopping was watched
    pub fn eval_history(&self) -> &[f64] {
        &self.eval_history
    }

    pub fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>> {
        x.check_schema(&self.feature_names)?;
        Ok(self.predict_unchecked(x))
    }

    fn predict_unchecked(&self, x: &FeatureMatrix) -> Vec<f64> {
        (0..x.n_rows())
            .map(|i| {
                let row = x.row(i);
                sigmoid(self.trees.iter().map(|t| t.predict(row)).sum())
            })
            .collect()
    }

    /// Split-based importance; features never used in a split are absent.
    pub fn importance(&self, kind: ImportanceType) -> Result<Vec<(String, f64)>> {
        // feature -> (splits, total gain, total cover)
        let mut stats: BTreeMap<usize, (f64, f64, f64)> = BTreeMap::new();
        for tree in &self.trees {
            for node in &tree.nodes {
                if let Node::Split {
                    feature, gain, cover, ..
                } = node
                {
                    let s = stats.entry(*feature).or_insert((0.0, 0.0, 0.0));
                    s.0 += 1.0;
                    s.1 += gain;
                    s.2 += cover;
                }
            }
        }

        let value = |(count, gain, cover): (f64, f64, f64)| -> Result<f64> {
            match kind {
                ImportanceType::Weight => Ok(count),
                ImportanceType::Gain => Ok(gain / count),
                ImportanceType::TotalGain => Ok(gain),
                ImportanceType::Cover => Ok(cover / count),
                ImportanceType::TotalCover => Ok(cover),
                other => Err(EvalError::config(format!(
                    "Importance type '{}' is not available for the boosted model; \
                     use weight, gain, cover, total_gain or total_cover",
                    other
                ))),
            }
        };

        // Validate the kind even when no split exists
        value((1.0, 0.0, 0.0))?;
        stats
            .into_iter()
            .map(|(f, s)| Ok((self.feature_names[f].clone(), value(s)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(n: usize, offset: usize) -> LabeledMatrix {
        // x0 drives the label, x1 is noise
        let rows: Vec<Vec<f64>> = (offset..offset + n)
            .map(|i| vec![(i % 100) as f64, ((i * 37) % 11) as f64])
            .collect();
        let labels: Vec<u8> = (offset..offset + n)
            .map(|i| ((i % 100) > 50 || (i % 100) % 17 == 0) as u8)
            .collect();
        let m = FeatureMatrix::from_rows(vec!["x0".to_string(), "x1".to_string()], &rows).unwrap();
        LabeledMatrix::new(m, labels, None).unwrap()
    }

    fn quick_params() -> BoostedParams {
        BoostedParams {
            num_rounds: 30,
            max_depth: 3,
            eta: 0.3,
            subsample: 1.0,
            colsample_bytree: 1.0,
            gamma: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_fit_separates_classes() {
        let train = dataset(300, 0);
        let model = BoostedModel::fit(&train, None, &quick_params()).unwrap();
        assert_eq!(model.n_trees(), 30);
        assert!(model.performance().train.auc.unwrap() > 0.9);
        let preds = model.predict(&train.features).unwrap();
        assert!(preds.iter().all(|p| *p > 0.0 && *p < 1.0));
    }

    #[test]
    fn test_importance_prefers_signal_feature() {
        let model = BoostedModel::fit(&dataset(300, 0), None, &quick_params()).unwrap();
        let gain: BTreeMap<String, f64> = model.importance(ImportanceType::TotalGain).unwrap().into_iter().collect();
        let x1 = gain.get("x1").copied().unwrap_or(0.0);
        assert!(gain["x0"] > x1);
        assert!(model.importance(ImportanceType::TValue).is_err());
    }

    #[test]
    fn test_early_stopping_truncates_to_best_round() {
        let train = dataset(200, 0);
        let eval = dataset(100, 7);
        let params = BoostedParams {
            num_rounds: 200,
            early_stopping_rounds: Some(5),
            ..quick_params()
        };
        let model = BoostedModel::fit(&train, Some(&eval), &params).unwrap();
        let best = model.best_iteration().unwrap();
        assert_eq!(model.n_trees(), best + 1);
        assert!(model.rounds_trained() <= 200);
        assert!(model.performance().test.auc.is_some());
    }

    #[test]
    fn test_missing_values_follow_default_direction() {
        let mut rows: Vec<Vec<f64>> = (0..100).map(|i| vec![i as f64]).collect();
        for r in rows.iter_mut().skip(80) {
            r[0] = f64::NAN;
        }
        let labels: Vec<u8> = (0..100).map(|i| (i >= 50) as u8).collect();
        let m = FeatureMatrix::from_rows(vec!["x".to_string()], &rows).unwrap();
        let train = LabeledMatrix::new(m, labels, None).unwrap();
        let model = BoostedModel::fit(&train, None, &quick_params()).unwrap();

        let probe = FeatureMatrix::from_rows(vec!["x".to_string()], &[vec![f64::NAN], vec![10.0]]).unwrap();
        let preds = model.predict(&probe).unwrap();
        assert!(preds[0] > 0.5, "missing rows were all bad: {}", preds[0]);
        assert!(preds[1] < 0.5);
    }

    #[test]
    fn test_same_seed_same_model() {
        let params = BoostedParams {
            subsample: 0.7,
            colsample_bytree: 0.5,
            seed: 11,
            ..quick_params()
        };
        let train = dataset(200, 0);
        let a = BoostedModel::fit(&train, None, &params).unwrap();
        let b = BoostedModel::fit(&train, None, &params).unwrap();
        assert_eq!(a.predict(&train.features).unwrap(), b.predict(&train.features).unwrap());
    }

    #[test]
    fn test_expired_deadline_is_cancelled() {
        let params = BoostedParams {
            deadline: Some(Instant::now()),
            ..quick_params()
        };
        let result = BoostedModel::fit(&dataset(50, 0), None, &params);
        assert!(matches!(result, Err(EvalError::Cancelled { completed: 0, .. })));
    }
}
