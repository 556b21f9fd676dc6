//! Classification metrics for evaluating task heads.
//!
//! Provides accuracy, precision, recall and F1-score over 0-indexed class
//! labels. Callers filter masked (ignored) positions before calling these.

/// Averaging strategy for precision, recall and F1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Average {
    /// Score only the positive class (label 1).
    #[default]
    Binary,
    /// Calculate metrics for each label, return unweighted mean.
    Macro,
    /// Calculate metrics globally by counting total TP, FP, FN.
    Micro,
    /// Weighted mean by support (number of true instances per label).
    Weighted,
}

/// Label treated as positive by [`Average::Binary`].
pub const POSITIVE_LABEL: usize = 1;

/// Compute classification accuracy.
///
/// accuracy = `correct_predictions` / `total_predictions`
///
/// # Panics
///
/// Panics if vectors have different lengths or are empty.
///
/// # Examples
///
/// ```
/// use rebanar::metrics::classification::accuracy;
///
/// let y_true = vec![0, 1, 2, 0, 1, 2];
/// let y_pred = vec![0, 2, 1, 0, 0, 1];
/// let acc = accuracy(&y_pred, &y_true);
/// assert!((acc - 0.333333).abs() < 0.001);
/// ```
#[must_use]
pub fn accuracy(y_pred: &[usize], y_true: &[usize]) -> f32 {
    assert_eq!(y_pred.len(), y_true.len(), "Vectors must have same length");
    assert!(!y_true.is_empty(), "Vectors cannot be empty");

    let correct = y_pred
        .iter()
        .zip(y_true.iter())
        .filter(|(p, t)| p == t)
        .count();

    correct as f32 / y_true.len() as f32
}

/// Per-class true-positive, false-positive, false-negative and support counts.
#[derive(Debug, Clone)]
struct ClassCounts {
    tp: Vec<usize>,
    fp: Vec<usize>,
    fn_counts: Vec<usize>,
    support: Vec<usize>,
}

impl ClassCounts {
    fn new(y_pred: &[usize], y_true: &[usize]) -> Self {
        assert_eq!(y_pred.len(), y_true.len(), "Vectors must have same length");
        assert!(!y_true.is_empty(), "Vectors cannot be empty");

        // Binary averaging always needs a slot for the positive label.
        let n_classes = y_true
            .iter()
            .chain(y_pred.iter())
            .max()
            .map_or(0, |&m| m + 1)
            .max(POSITIVE_LABEL + 1);

        let mut counts = Self {
            tp: vec![0; n_classes],
            fp: vec![0; n_classes],
            fn_counts: vec![0; n_classes],
            support: vec![0; n_classes],
        };

        for (&true_label, &pred_label) in y_true.iter().zip(y_pred.iter()) {
            counts.support[true_label] += 1;

            if true_label == pred_label {
                counts.tp[true_label] += 1;
            } else {
                counts.fp[pred_label] += 1;
                counts.fn_counts[true_label] += 1;
            }
        }

        counts
    }

    fn n_classes(&self) -> usize {
        self.tp.len()
    }

    /// Classes that appear in either the golds or the predictions.
    fn present(&self) -> Vec<usize> {
        (0..self.n_classes())
            .filter(|&i| self.support[i] + self.fp[i] > 0)
            .collect()
    }

    fn average(&self, average: Average, per_class: impl Fn(usize, usize, usize) -> f32) -> f32 {
        match average {
            Average::Binary => per_class(
                self.tp[POSITIVE_LABEL],
                self.fp[POSITIVE_LABEL],
                self.fn_counts[POSITIVE_LABEL],
            ),
            Average::Micro => per_class(
                self.tp.iter().sum(),
                self.fp.iter().sum(),
                self.fn_counts.iter().sum(),
            ),
            Average::Macro => {
                let present = self.present();
                if present.is_empty() {
                    return 0.0;
                }
                present
                    .iter()
                    .map(|&i| per_class(self.tp[i], self.fp[i], self.fn_counts[i]))
                    .sum::<f32>()
                    / present.len() as f32
            }
            Average::Weighted => {
                let total_support: usize = self.support.iter().sum();
                if total_support == 0 {
                    return 0.0;
                }
                (0..self.n_classes())
                    .map(|i| {
                        let score = per_class(self.tp[i], self.fp[i], self.fn_counts[i]);
                        score * self.support[i] as f32 / total_support as f32
                    })
                    .sum()
            }
        }
    }
}

fn class_precision(tp: usize, fp: usize, _fn_count: usize) -> f32 {
    if tp + fp == 0 {
        0.0
    } else {
        tp as f32 / (tp + fp) as f32
    }
}

fn class_recall(tp: usize, _fp: usize, fn_count: usize) -> f32 {
    if tp + fn_count == 0 {
        0.0
    } else {
        tp as f32 / (tp + fn_count) as f32
    }
}

fn class_f1(tp: usize, fp: usize, fn_count: usize) -> f32 {
    let prec = class_precision(tp, fp, fn_count);
    let rec = class_recall(tp, fp, fn_count);
    if prec + rec == 0.0 {
        0.0
    } else {
        2.0 * prec * rec / (prec + rec)
    }
}

/// Compute precision score.
///
/// precision = TP / (TP + FP)
///
/// # Panics
///
/// Panics if vectors have different lengths or are empty.
///
/// # Examples
///
/// ```
/// use rebanar::metrics::classification::{precision, Average};
///
/// let y_true = vec![1, 1, 0, 0];
/// let y_pred = vec![1, 1, 1, 0];
/// let prec = precision(&y_pred, &y_true, Average::Binary);
/// assert!((prec - 2.0 / 3.0).abs() < 1e-6);
/// ```
#[must_use]
pub fn precision(y_pred: &[usize], y_true: &[usize], average: Average) -> f32 {
    ClassCounts::new(y_pred, y_true)
        .average(average, class_precision)
}

/// Compute recall score.
///
/// recall = TP / (TP + FN)
///
/// # Panics
///
/// Panics if vectors have different lengths or are empty.
///
/// # Examples
///
/// ```
/// use rebanar::metrics::classification::{recall, Average};
///
/// let y_true = vec![1, 1, 0, 0];
/// let y_pred = vec![1, 0, 0, 0];
/// let rec = recall(&y_pred, &y_true, Average::Binary);
/// assert!((rec - 0.5).abs() < 1e-6);
/// ```
#[must_use]
pub fn recall(y_pred: &[usize], y_true: &[usize], average: Average) -> f32 {
    ClassCounts::new(y_pred, y_true)
        .average(average, class_recall)
}

/// Compute F1 score (harmonic mean of precision and recall).
///
/// F1 = 2 * (precision * recall) / (precision + recall)
///
/// # Panics
///
/// Panics if vectors have different lengths or are empty.
///
/// # Examples
///
/// ```
/// use rebanar::metrics::classification::{f1_score, Average};
///
/// let y_true = vec![0, 1, 2, 0, 1, 2];
/// let y_pred = vec![0, 2, 1, 0, 0, 1];
/// let f1 = f1_score(&y_pred, &y_true, Average::Macro);
/// assert!(f1 >= 0.0 && f1 <= 1.0);
/// ```
#[must_use]
pub fn f1_score(y_pred: &[usize], y_true: &[usize], average: Average) -> f32 {
    ClassCounts::new(y_pred, y_true).average(average, class_f1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accuracy_perfect() {
        let y = vec![0, 1, 1, 0];
        assert!((accuracy(&y, &y) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_binary_scores() {
        // tp=2, fp=1, fn=1
        let y_true = vec![1, 1, 1, 0, 0];
        let y_pred = vec![1, 1, 0, 1, 0];

        let scores = [
            precision(&y_pred, &y_true, Average::Binary),
            recall(&y_pred, &y_true, Average::Binary),
            f1_score(&y_pred, &y_true, Average::Binary),
        ];
        for score in scores {
            assert!((score - 2.0 / 3.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_binary_without_positives_is_zero() {
        let y = vec![0, 0, 0];
        assert_eq!(f1_score(&y, &y, Average::Binary), 0.0);
        assert_eq!(precision(&y, &y, Average::Binary), 0.0);
    }

    #[test]
    fn test_micro_f1_equals_accuracy() {
        let y_true = vec![0, 1, 2, 0, 1, 2];
        let y_pred = vec![0, 2, 1, 0, 0, 1];
        let micro = f1_score(&y_pred, &y_true, Average::Micro);
        assert!((micro - accuracy(&y_pred, &y_true)).abs() < 1e-6);
    }

    #[test]
    fn test_macro_ignores_absent_padding_class() {
        // Only class 0 present; the padded positive slot must not halve the mean
        let y = vec![0, 0];
        assert!((recall(&y, &y, Average::Macro) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_weighted_recall() {
        let y_true = vec![0, 0, 0, 1];
        let y_pred = vec![0, 0, 1, 1];
        // class 0 recall 2/3 (w=3/4), class 1 recall 1 (w=1/4)
        let expected = 2.0 / 3.0 * 0.75 + 0.25;
        let weighted = recall(&y_pred, &y_true, Average::Weighted);
        assert!((weighted - expected).abs() < 1e-6);
    }

    #[test]
    #[should_panic(expected = "same length")]
    fn test_length_mismatch_panics() {
        let _ = accuracy(&[0, 1], &[0]);
    }
}
