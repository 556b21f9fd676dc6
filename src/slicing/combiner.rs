//! Attention over slice representations.

use serde::{Deserialize, Serialize};

use crate::autograd::ops::softmax_rows;
use crate::autograd::Tensor;
use crate::error::{RebanarError, Result};
use crate::nn::Module;

/// Settings of the [`SliceCombiner`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombinerConfig {
    /// Softmax temperature over the per-slice attention scores.
    pub temperature: f32,
}

impl Default for CombinerConfig {
    fn default() -> Self {
        Self { temperature: 1.0 }
    }
}

impl CombinerConfig {
    /// Ensure the temperature can divide the attention scores.
    ///
    /// # Errors
    ///
    /// Returns an error unless `temperature` is finite and positive.
    pub fn validate(self) -> Result<Self> {
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return Err(RebanarError::InvalidHyperparameter {
                param: "temperature".to_string(),
                value: self.temperature.to_string(),
                constraint: "finite and > 0".to_string(),
            });
        }
        Ok(self)
    }
}

/// Mixes per-slice representations into one.
///
/// Takes `3 * K` inputs: K indicator logits `[B, 2]`, K prediction logits
/// `[B, C]` and K slice representations `[B, H]`. Each example weights slice
/// `k` by `softmax_k(P(member_k) * max_c P(pred_k = c) / temperature)` and
/// the output `[B, H]` is the weighted sum of the representations.
///
/// The weights are constants to the tape: gradients reach the
/// representations but not the indicator or prediction heads.
///
/// All work happens in [`Module::forward_many`]. The single-input
/// [`Module::forward`] has no slices to weigh and returns its input.
#[derive(Debug, Clone, Default)]
pub struct SliceCombiner {
    config: CombinerConfig,
}

impl SliceCombiner {
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: CombinerConfig) -> Result<Self> {
        Ok(Self {
            config: config.validate()?,
        })
    }

    #[must_use]
    pub fn config(&self) -> &CombinerConfig {
        &self.config
    }

    /// Per-row attention weights, one `Vec` per slice.
    ///
    /// # Errors
    ///
    /// Returns an error if the inputs disagree on batch size or an indicator
    /// head is not binary.
    pub fn attention(
        &self,
        ind_logits: &[Tensor],
        pred_logits: &[Tensor],
    ) -> Result<Vec<Vec<f32>>> {
        if ind_logits.len() != pred_logits.len() {
            return Err(RebanarError::dimension_mismatch(
                "prediction heads",
                ind_logits.len(),
                pred_logits.len(),
            ));
        }
        let Some(first) = ind_logits.first() else {
            return Ok(Vec::new());
        };
        let batch = first.n_rows();

        let mut scores = Vec::with_capacity(ind_logits.len());
        for (ind, pred) in ind_logits.iter().zip(pred_logits) {
            if ind.n_cols() != 2 {
                return Err(RebanarError::dimension_mismatch(
                    "indicator classes",
                    2,
                    ind.n_cols(),
                ));
            }
            for t in [ind, pred] {
                if t.n_rows() != batch {
                    let rows = t.n_rows();
                    return Err(RebanarError::dimension_mismatch("batch rows", batch, rows));
                }
            }
            let membership = softmax_rows(ind.data(), 2);
            let confidence = softmax_rows(pred.data(), pred.n_cols());
            let row_scores: Vec<f32> = membership
                .chunks(2)
                .zip(confidence.chunks(pred.n_cols()))
                .map(|(m, c)| {
                    let max_conf = c.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
                    m[1] * max_conf / self.config.temperature
                })
                .collect();
            scores.push(row_scores);
        }

        let k = scores.len();
        let mut per_row = Vec::with_capacity(batch * k);
        for row in 0..batch {
            per_row.extend(scores.iter().map(|s| s[row]));
        }
        let weights = softmax_rows(&per_row, k);
        Ok((0..k)
            .map(|slice| {
                (0..batch).map(|row| weights[row * k + slice]).collect()
            })
            .collect())
    }
}

impl Module for SliceCombiner {
    /// Identity: a lone tensor carries no slices to combine.
    fn forward(&self, input: &Tensor) -> Tensor {
        input.clone()
    }

    fn forward_many(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        if inputs.is_empty() || inputs.len() % 3 != 0 {
            return Err(RebanarError::Other(format!(
                "slice combiner expects 3 inputs per slice, got {}",
                inputs.len()
            )));
        }
        let k = inputs.len() / 3;
        let (ind, rest) = inputs.split_at(k);
        let (pred, reps) = rest.split_at(k);
        let weights = self.attention(ind, pred)?;

        let hidden = reps[0].shape().to_vec();
        let mut combined: Option<Tensor> = None;
        for (rep, w) in reps.iter().zip(&weights) {
            if rep.shape() != hidden.as_slice() {
                return Err(RebanarError::DimensionMismatch {
                    expected: format!("{hidden:?}"),
                    actual: format!("{:?}", rep.shape()),
                });
            }
            if rep.n_rows() != w.len() {
                return Err(RebanarError::dimension_mismatch(
                    "batch rows",
                    w.len(),
                    rep.n_rows(),
                ));
            }
            let weighted = rep.scale_rows(w);
            combined = Some(match combined {
                Some(acc) => acc.add(&weighted),
                None => weighted,
            });
        }
        combined
            .map(|t| vec![t])
            .ok_or_else(|| {
                RebanarError::Other("slice combiner received no slices".to_string())
            })
    }

    fn type_name(&self) -> &'static str {
        "SliceCombiner"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{clear_graph, get_grad};

    #[test]
    fn test_attention_rows_sum_to_one() {
        let combiner = SliceCombiner::default();
        let ind = vec![
            Tensor::new(&[3.0, -3.0, -3.0, 3.0], &[2, 2]),
            Tensor::new(&[0.0, 0.0, 0.0, 0.0], &[2, 2]),
        ];
        let pred = vec![
            Tensor::new(&[1.0, 0.0, 0.0, 1.0], &[2, 2]),
            Tensor::new(&[1.0, 0.0, 0.0, 1.0], &[2, 2]),
        ];
        let weights = combiner.attention(&ind, &pred).expect("consistent inputs");
        assert_eq!(weights.len(), 2);
        for row in 0..2 {
            assert!((weights[0][row] + weights[1][row] - 1.0).abs() < 1e-6);
        }
        // row 1 is a confident member of slice 0, row 0 is not
        assert!(weights[0][1] > weights[0][0]);
    }

    #[test]
    fn test_single_slice_passes_representation_through() {
        let combiner = SliceCombiner::default();
        let rep = Tensor::new(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let inputs = [Tensor::zeros(&[2, 2]), Tensor::zeros(&[2, 2]), rep.clone()];
        let out = combiner.forward_many(&inputs).expect("one slice");
        assert_eq!(out[0].data(), rep.data());
    }

    #[test]
    fn test_gradient_reaches_representations_only() {
        clear_graph();
        let combiner = SliceCombiner::new(CombinerConfig { temperature: 0.5 })
            .expect("valid temperature");
        let ind = Tensor::new(&[1.0, 2.0], &[1, 2]).requires_grad();
        let pred = Tensor::new(&[0.5, 0.1], &[1, 2]).requires_grad();
        let rep_a = Tensor::new(&[1.0, 1.0], &[1, 2]).requires_grad();
        let rep_b = Tensor::new(&[2.0, 2.0], &[1, 2]).requires_grad();
        let out = combiner
            .forward_many(&[
                ind.clone(),
                ind.clone(),
                pred.clone(),
                pred.clone(),
                rep_a.clone(),
                rep_b.clone(),
            ])
            .expect("two slices");
        out[0].sum().backward();

        let ga = get_grad(rep_a.id()).expect("representation gets gradient");
        let gb = get_grad(rep_b.id()).expect("representation gets gradient");
        // identical scores split attention evenly
        assert!((ga.data()[0] - 0.5).abs() < 1e-6);
        assert!((gb.data()[0] - 0.5).abs() < 1e-6);
        assert!(get_grad(ind.id()).is_none());
        assert!(get_grad(pred.id()).is_none());
        clear_graph();
    }

    #[test]
    fn test_rejects_ragged_inputs() {
        let combiner = SliceCombiner::default();
        assert!(combiner.forward_many(&[Tensor::zeros(&[1, 2])]).is_err());
        let result = combiner.forward_many(&[
            Tensor::zeros(&[1, 3]),
            Tensor::zeros(&[1, 2]),
            Tensor::zeros(&[1, 4]),
        ]);
        assert!(matches!(
            result,
            Err(RebanarError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_config_defaults_from_json() {
        let config: CombinerConfig = serde_json::from_str("{}").expect("defaults");
        assert_eq!(config, CombinerConfig::default());
    }

    #[test]
    fn test_rejects_non_positive_temperature() {
        for temperature in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let result = SliceCombiner::new(CombinerConfig { temperature });
            assert!(
                matches!(result, Err(RebanarError::InvalidHyperparameter { .. })),
                "temperature {temperature} accepted"
            );
        }

        // Parsing alone does not check the value
        let parsed: CombinerConfig = serde_json::from_str(r#"{"temperature": -1.0}"#)
            .expect("well-formed JSON");
        assert!(parsed.validate().is_err());
    }

    #[test]
    fn test_small_temperature_sharpens_attention() {
        let ind = vec![
            Tensor::new(&[0.0, 2.0], &[1, 2]),
            Tensor::new(&[0.0, 0.0], &[1, 2]),
        ];
        let pred = vec![Tensor::new(&[1.0, 0.0], &[1, 2]); 2];
        let weight = |temperature: f32| {
            let combiner = SliceCombiner::new(CombinerConfig { temperature })
                .expect("valid temperature");
            combiner.attention(&ind, &pred).expect("consistent inputs")[0][0]
        };
        let (sharp, soft) = (weight(0.01), weight(10.0));
        assert!(sharp.is_finite());
        assert!(sharp > 0.99);
        assert!(soft < 0.6);
    }

    #[test]
    fn test_single_tensor_forward_is_identity() {
        let combiner = SliceCombiner::default();
        let input = Tensor::new(&[1.0, -2.0], &[1, 2]);
        assert_eq!(combiner.forward(&input).data(), input.data());
        assert!(combiner.forward_many(&[input]).is_err());
    }
}
