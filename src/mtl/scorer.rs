//! Metric evaluation for task predictions.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{RebanarError, Result};
use crate::metrics::{accuracy, f1_score, precision, recall, Average};
use crate::nn::IGNORE_INDEX;

/// Metric over `(golds, preds)`, both 0-indexed and already unmasked.
pub type MetricFn = Arc<dyn Fn(&[usize], &[usize]) -> f32 + Send + Sync>;

/// Built-in metric names.
pub const METRICS: [&str; 4] = ["accuracy", "f1", "precision", "recall"];

/// Scores predictions against gold labels with a fixed list of metrics.
///
/// `f1`, `precision` and `recall` are binary with positive class 1.
///
/// ```
/// use rebanar::mtl::Scorer;
/// use rebanar::nn::IGNORE_INDEX;
///
/// let scorer = Scorer::new(&["accuracy", "f1"]).expect("known metrics");
/// let scores = scorer.score(&[1, 0, IGNORE_INDEX], &[1, 1, 0]).expect("aligned");
/// assert_eq!(scores["accuracy"], 0.5);
/// ```
#[derive(Clone, Default)]
pub struct Scorer {
    metrics: Vec<String>,
    custom_metrics: BTreeMap<String, MetricFn>,
}

impl Scorer {
    /// Create a scorer over built-in metrics.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown metric name.
    pub fn new(metrics: &[&str]) -> Result<Self> {
        let mut scorer = Self::default();
        for &metric in metrics {
            if !METRICS.contains(&metric) {
                return Err(RebanarError::InvalidHyperparameter {
                    param: "metric".to_string(),
                    value: metric.to_string(),
                    constraint: format!("one of {METRICS:?}"),
                });
            }
            scorer.metrics.push(metric.to_string());
        }
        Ok(scorer)
    }

    /// Register a custom metric, scored after the built-in ones.
    #[must_use]
    pub fn with_custom_metric(mut self, name: impl Into<String>, metric: MetricFn) -> Self {
        self.custom_metrics.insert(name.into(), metric);
        self
    }

    /// Names of every metric this scorer reports.
    #[must_use]
    pub fn metric_names(&self) -> Vec<&str> {
        self.metrics
            .iter()
            .map(String::as_str)
            .chain(self.custom_metrics.keys().map(String::as_str))
            .collect()
    }

    /// Score `preds` against `golds`.
    ///
    /// Positions whose gold is [`IGNORE_INDEX`] are dropped first; if none
    /// remain, the result is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the lengths differ or a gold label is negative
    /// (other than the ignore index).
    pub fn score(&self, golds: &[i64], preds: &[usize]) -> Result<BTreeMap<String, f32>> {
        if golds.len() != preds.len() {
            return Err(RebanarError::dimension_mismatch(
                "predictions",
                golds.len(),
                preds.len(),
            ));
        }

        let mut kept_golds = Vec::with_capacity(golds.len());
        let mut kept_preds = Vec::with_capacity(preds.len());
        for (&gold, &pred) in golds.iter().zip(preds) {
            if gold == IGNORE_INDEX {
                continue;
            }
            let gold = usize::try_from(gold)
                .map_err(|_| {
                    RebanarError::Other(format!("Invalid gold label {gold}"))
                })?;
            kept_golds.push(gold);
            kept_preds.push(pred);
        }

        let mut scores = BTreeMap::new();
        if kept_golds.is_empty() {
            return Ok(scores);
        }

        for metric in &self.metrics {
            let value = match metric.as_str() {
                "accuracy" => accuracy(&kept_preds, &kept_golds),
                "f1" => f1_score(&kept_preds, &kept_golds, Average::Binary),
                "precision" => precision(&kept_preds, &kept_golds, Average::Binary),
                "recall" => recall(&kept_preds, &kept_golds, Average::Binary),
                other => unreachable!("metric {other} validated at construction"),
            };
            scores.insert(metric.clone(), value);
        }
        for (name, metric) in &self.custom_metrics {
            scores.insert(name.clone(), metric(&kept_golds, &kept_preds));
        }

        Ok(scores)
    }
}

impl fmt::Debug for Scorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scorer")
            .field("metrics", &self.metric_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_metric_rejected() {
        let err = Scorer::new(&["accuracy", "auc"])
            .expect_err("auc unsupported");
        assert!(err.to_string().contains("auc"));
    }

    #[test]
    fn test_masked_golds_filtered() {
        let scorer = Scorer::new(&["accuracy"]).expect("known");
        let scores = scorer
            .score(&[IGNORE_INDEX, 1, IGNORE_INDEX, 0], &[0, 1, 0, 0])
            .expect("aligned");
        assert_eq!(scores["accuracy"], 1.0);
    }

    #[test]
    fn test_all_masked_is_empty() {
        let scorer = Scorer::new(&["accuracy", "f1"]).expect("known");
        let scores = scorer
            .score(&[IGNORE_INDEX, IGNORE_INDEX], &[0, 1])
            .expect("aligned");
        assert!(scores.is_empty());
    }

    #[test]
    fn test_binary_metrics() {
        let scorer = Scorer::new(&["f1", "precision", "recall"]).expect("known");
        let scores = scorer.score(&[1, 1, 0, 0], &[1, 0, 1, 0]).expect("aligned");
        assert!((scores["precision"] - 0.5).abs() < 1e-6);
        assert!((scores["recall"] - 0.5).abs() < 1e-6);
        assert!((scores["f1"] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_custom_metric() {
        let errors: MetricFn = Arc::new(|golds: &[usize], preds: &[usize]| {
            golds.iter().zip(preds).filter(|(g, p)| g != p).count() as f32
        });
        let scorer = Scorer::new(&[])
            .expect("empty")
            .with_custom_metric("errors", errors);
        assert_eq!(scorer.metric_names(), vec!["errors"]);
        let scores = scorer.score(&[0, 1, 1], &[1, 1, 0]).expect("aligned");
        assert_eq!(scores["errors"], 2.0);
    }

    #[test]
    fn test_length_mismatch() {
        let scorer = Scorer::new(&["accuracy"]).expect("known");
        assert!(scorer.score(&[0, 1], &[0]).is_err());
    }
}
