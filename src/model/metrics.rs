//! Classification metrics: AUC, average precision and logloss
//!
//! All three accept optional sample weights. A metric that is undefined for
//! the given data (single class, no labels) is reported as `None` instead of
//! failing.

use serde::{Deserialize, Serialize};

/// Probabilities are clipped to `[EPS, 1 - EPS]` before taking logs
const LOGLOSS_EPS: f64 = 1e-15;

/// Scores closer than this are treated as tied
const TIE_TOLERANCE: f64 = 1e-10;

/// Metrics for one split; `None` means unavailable
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub auc: Option<f64>,
    pub avg_precision: Option<f64>,
    pub logloss: Option<f64>,
}

impl Metrics {
    /// All metrics unavailable
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn is_available(&self) -> bool {
        self.auc.is_some() || self.avg_precision.is_some() || self.logloss.is_some()
    }
}

/// `{train, test}` record held by every fitted model
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub train: Metrics,
    pub test: Metrics,
}

/// Compute metrics when both labels and predictions are present.
///
/// Mismatched lengths or an empty sample also yield all-unavailable metrics.
pub fn evaluate(labels: Option<&[u8]>, predictions: Option<&[f64]>, weights: Option<&[f64]>) -> Metrics {
    let (Some(labels), Some(predictions)) = (labels, predictions) else {
        return Metrics::unavailable();
    };
    if labels.is_empty()
        || labels.len() != predictions.len()
        || weights.is_some_and(|w| w.len() != labels.len())
        || predictions.iter().any(|p| p.is_nan())
    {
        return Metrics::unavailable();
    }

    let mut triples: Vec<(f64, u8, f64)> = labels
        .iter()
        .zip(predictions)
        .enumerate()
        .map(|(i, (&y, &p))| (p, y, weights.map(|w| w[i]).unwrap_or(1.0)))
        .collect();

    let logloss = weighted_logloss(&triples);

    triples.sort_by(|a, b| a.0.total_cmp(&b.0));
    let auc = weighted_auc(&triples);
    let avg_precision = average_precision(&triples);

    Metrics {
        auc,
        avg_precision,
        logloss,
    }
}

/// Weighted Mann-Whitney AUC over `(score, label, weight)` sorted ascending by score.
///
/// Tied scores share the midpoint of their weighted rank span.
pub fn weighted_auc(sorted: &[(f64, u8, f64)]) -> Option<f64> {
    let (total_pos, total_neg) = class_weights(sorted);
    if total_pos <= 0.0 || total_neg <= 0.0 {
        return None;
    }

    let n = sorted.len();
    let mut weighted_rank_sum_pos = 0.0;
    let mut cumulative_weight = 0.0;
    let mut i = 0;

    while i < n {
        let current = sorted[i].0;
        let mut j = i;
        while j < n && (sorted[j].0 - current).abs() < TIE_TOLERANCE {
            j += 1;
        }

        let group_weight: f64 = sorted[i..j].iter().map(|(_, _, w)| w).sum();
        let avg_rank = cumulative_weight + group_weight / 2.0;
        weighted_rank_sum_pos += sorted[i..j]
            .iter()
            .filter(|(_, y, _)| *y == 1)
            .map(|(_, _, w)| avg_rank * w)
            .sum::<f64>();

        cumulative_weight += group_weight;
        i = j;
    }

    let u = weighted_rank_sum_pos - total_pos * total_pos / 2.0;
    Some((u / (total_pos * total_neg)).clamp(0.0, 1.0))
}

/// Average precision (area under the precision-recall step curve),
/// `sorted` ascending by score.
pub fn average_precision(sorted: &[(f64, u8, f64)]) -> Option<f64> {
    let (total_pos, _) = class_weights(sorted);
    if total_pos <= 0.0 {
        return None;
    }

    let mut tp = 0.0;
    let mut fp = 0.0;
    let mut prev_recall = 0.0;
    let mut ap = 0.0;
    let mut j = sorted.len();

    // Walk thresholds from the highest score down
    while j > 0 {
        let current = sorted[j - 1].0;
        let mut i = j;
        while i > 0 && (sorted[i - 1].0 - current).abs() < TIE_TOLERANCE {
            i -= 1;
        }
        for (_, y, w) in &sorted[i..j] {
            if *y == 1 {
                tp += w;
            } else {
                fp += w;
            }
        }
        if tp + fp > 0.0 {
            let recall = tp / total_pos;
            ap += (recall - prev_recall) * (tp / (tp + fp));
            prev_recall = recall;
        }
        j = i;
    }

    Some(ap.clamp(0.0, 1.0))
}

/// Weighted mean binary cross-entropy.
pub fn weighted_logloss(triples: &[(f64, u8, f64)]) -> Option<f64> {
    let total: f64 = triples.iter().map(|(_, _, w)| w).sum();
    if total <= 0.0 {
        return None;
    }
    let loss: f64 = triples
        .iter()
        .map(|&(p, y, w)| {
            let p = p.clamp(LOGLOSS_EPS, 1.0 - LOGLOSS_EPS);
            let l = if y == 1 { -p.ln() } else { -(1.0 - p).ln() };
            w * l
        })
        .sum();
    Some(loss / total)
}

fn class_weights(triples: &[(f64, u8, f64)]) -> (f64, f64) {
    triples.iter().fold((0.0, 0.0), |(pos, neg), &(_, y, w)| {
        if y == 1 {
            (pos + w, neg)
        } else {
            (pos, neg + w)
        }
    })
}

/// Mean and sample standard deviation (ddof = 1) of the available values.
///
/// The deviation is `None` with fewer than two values.
pub fn mean_std(values: &[Option<f64>]) -> (Option<f64>, Option<f64>) {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return (None, None);
    }
    let n = present.len() as f64;
    let mean = present.iter().sum::<f64>() / n;
    if present.len() < 2 {
        return (Some(mean), None);
    }
    let var = present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (Some(mean), Some(var.sqrt()))
}
