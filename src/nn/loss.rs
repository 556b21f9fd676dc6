//! Loss functions for training task heads.
//!
//! The multitask slicing workflow relies on masked cross-entropy: a
//! slice-conditional prediction label is [`IGNORE_INDEX`] outside its slice,
//! and those rows contribute neither to the loss value nor to its gradient.
//!
//! ```
//! use rebanar::autograd::Tensor;
//! use rebanar::nn::{CrossEntropyLoss, IGNORE_INDEX};
//!
//! let logits = Tensor::new(&[2.0, 0.0, 0.0, 2.0], &[2, 2]).requires_grad();
//! let loss = CrossEntropyLoss::new()
//!     .forward(&logits, &[0, IGNORE_INDEX])
//!     .expect("labels are in range")
//!     .expect("one row is labelled");
//! assert!(loss.item() < 0.2);
//! ```
//!
//! # References
//!
//! - Bishop, C. M. (2006). Pattern Recognition and Machine Learning. Springer.

use std::sync::Arc;

use crate::autograd::grad_fn::CrossEntropyBackward;
use crate::autograd::ops::{softmax_rows, track};
use crate::autograd::Tensor;
use crate::error::{RebanarError, Result};

/// Label value marking a masked example: ignored by losses and scorers.
pub const IGNORE_INDEX: i64 = -1;

/// Cross-entropy loss over logits with an ignore index.
///
/// Combines log-softmax and negative log-likelihood for numerical stability.
/// The result is averaged over the kept (non-ignored) rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropyLoss;

impl CrossEntropyLoss {
    /// Create a new loss with [`IGNORE_INDEX`] masking.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Compute cross-entropy loss.
    ///
    /// # Arguments
    ///
    /// * `logits` - Shape [batch, num_classes]
    /// * `targets` - One 0-indexed class id per row, or the ignore index
    ///
    /// Returns `Ok(None)` when every row is ignored, so callers can skip the
    /// task for this batch instead of backpropagating a meaningless zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch sizes differ or a target is out of range.
    pub fn forward(&self, logits: &Tensor, targets: &[i64]) -> Result<Option<Tensor>> {
        if logits.ndim() != 2 {
            return Err(RebanarError::dimension_mismatch(
                "logits ndim",
                2,
                logits.ndim(),
            ));
        }
        let (batch_size, num_classes) = (logits.shape()[0], logits.shape()[1]);
        if targets.len() != batch_size {
            return Err(RebanarError::dimension_mismatch(
                "targets",
                batch_size,
                targets.len(),
            ));
        }

        let mut kept = Vec::with_capacity(batch_size);
        for &t in targets {
            if t == IGNORE_INDEX {
                kept.push(None);
                continue;
            }
            match usize::try_from(t) {
                Ok(idx) if idx < num_classes => kept.push(Some(idx)),
                _ => {
                    return Err(RebanarError::Other(format!(
                        "Target class {t} out of bounds for {num_classes} classes"
                    )))
                }
            }
        }

        let n_kept = kept.iter().flatten().count();
        if n_kept == 0 {
            return Ok(None);
        }

        let probs = softmax_rows(logits.data(), num_classes);
        let total: f32 = kept
            .iter()
            .enumerate()
            .filter_map(|(row, t)| t.map(|c| probs[row * num_classes + c]))
            .map(|p| -p.max(f32::MIN_POSITIVE).ln())
            .sum();
        let scale = 1.0 / n_kept as f32;

        let loss = track(
            Tensor::new(&[total * scale], &[1]),
            &[logits],
            Arc::new(CrossEntropyBackward {
                softmax_output: Tensor::from_vec(probs, logits.shape()),
                targets: kept,
                scale,
            }),
        );
        Ok(Some(loss))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{clear_graph, get_grad};

    #[test]
    fn test_uniform_logits_loss_is_ln_classes() {
        let logits = Tensor::zeros(&[3, 2]);
        let loss = CrossEntropyLoss::new()
            .forward(&logits, &[0, 1, 0])
            .expect("valid targets")
            .expect("labelled rows");
        assert!((loss.item() - 2.0_f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn test_ignored_rows_do_not_change_loss() {
        let logits = Tensor::new(&[1.0, -1.0, 5.0, -5.0], &[2, 2]);
        let only_first = CrossEntropyLoss::new()
            .forward(&logits.select_rows(&[0]), &[1])
            .expect("valid")
            .expect("labelled");
        let masked = CrossEntropyLoss::new()
            .forward(&logits, &[1, IGNORE_INDEX])
            .expect("valid")
            .expect("labelled");
        assert!((only_first.item() - masked.item()).abs() < 1e-6);
    }

    #[test]
    fn test_ignored_rows_get_zero_gradient() {
        clear_graph();
        let logits = Tensor::new(&[1.0, -1.0, 5.0, -5.0], &[2, 2])
            .requires_grad();
        CrossEntropyLoss::new()
            .forward(&logits, &[IGNORE_INDEX, 0])
            .expect("valid")
            .expect("labelled")
            .backward();
        let grad = get_grad(logits.id()).expect("logits gradient");
        assert_eq!(&grad.data()[..2], &[0.0, 0.0]);
        assert!(grad.data()[2] < 0.0);
        clear_graph();
    }

    #[test]
    fn test_all_ignored_returns_none() {
        let logits = Tensor::zeros(&[2, 2]);
        let loss = CrossEntropyLoss::new()
            .forward(&logits, &[IGNORE_INDEX, IGNORE_INDEX])
            .expect("valid");
        assert!(loss.is_none());
    }

    #[test]
    fn test_out_of_range_target_errors() {
        let logits = Tensor::zeros(&[1, 2]);
        assert!(CrossEntropyLoss::new().forward(&logits, &[2]).is_err());
        assert!(CrossEntropyLoss::new().forward(&logits, &[0, 1]).is_err());
    }

    #[test]
    fn test_loss_is_mean_over_kept_rows() {
        let logits = Tensor::zeros(&[3, 2]);
        let loss = CrossEntropyLoss::new()
            .forward(&logits, &[0, IGNORE_INDEX, 1])
            .expect("valid")
            .expect("labelled");
        assert!((loss.item() - 2.0_f32.ln()).abs() < 1e-6);
    }
}
