//! Differentiable operations for tensors.
//!
//! Each operation:
//! 1. Computes the forward result
//! 2. Records a `GradFn` to the computation graph (if gradient tracking is enabled)

use std::sync::Arc;

use super::grad_fn::{
    matmul_raw, transpose_raw, AddBackward, BroadcastAddBackward, GradFn, MatmulBackward,
    MeanBackward, MulBackward, MulScalarBackward, ReluBackward, ScaleRowsBackward,
    SoftmaxBackward, SubBackward, SumBackward, TransposeBackward,
};
use super::tensor::Tensor;
use super::{is_grad_enabled, with_graph};

/// Record `result` on the tape when any input tracks gradients.
pub(crate) fn track(mut result: Tensor, inputs: &[&Tensor], grad_fn: Arc<dyn GradFn>) -> Tensor {
    if !is_grad_enabled() || !inputs.iter().any(|t| t.requires_grad_enabled()) {
        return result;
    }

    result.requires_grad_(true);
    result.set_grad_fn(grad_fn.clone());

    with_graph(|graph| {
        for input in inputs {
            graph.register_tensor(input);
        }
        graph.record(
            result.id(),
            grad_fn,
            inputs.iter().map(|t| t.id()).collect(),
        );
    });

    result
}

fn assert_same_shape(a: &Tensor, b: &Tensor, op: &str) {
    assert_eq!(
        a.shape(),
        b.shape(),
        "{op}: shape mismatch {:?} vs {:?}",
        a.shape(),
        b.shape()
    );
}

/// Row-wise softmax of a 2D buffer with `features` columns.
pub(crate) fn softmax_rows(data: &[f32], features: usize) -> Vec<f32> {
    let mut output = vec![0.0; data.len()];
    for (row, out) in data.chunks(features).zip(output.chunks_mut(features)) {
        let max_val = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        let mut sum = 0.0;
        for (o, &v) in out.iter_mut().zip(row) {
            *o = (v - max_val).exp();
            sum += *o;
        }
        for o in out.iter_mut() {
            *o /= sum;
        }
    }
    output
}

// ============================================================================
// Element-wise Operations
// ============================================================================

impl Tensor {
    /// Element-wise addition: z = self + other
    #[must_use]
    pub fn add(&self, other: &Tensor) -> Tensor {
        assert_same_shape(self, other, "add");
        let data: Vec<f32> = self
            .data()
            .iter()
            .zip(other.data())
            .map(|(&a, &b)| a + b)
            .collect();
        track(
            Tensor::from_vec(data, self.shape()),
            &[self, other],
            Arc::new(AddBackward),
        )
    }

    /// Element-wise subtraction: z = self - other
    #[must_use]
    pub fn sub(&self, other: &Tensor) -> Tensor {
        assert_same_shape(self, other, "sub");
        let data: Vec<f32> = self
            .data()
            .iter()
            .zip(other.data())
            .map(|(&a, &b)| a - b)
            .collect();
        track(
            Tensor::from_vec(data, self.shape()),
            &[self, other],
            Arc::new(SubBackward),
        )
    }

    /// Element-wise multiplication: z = self * other
    #[must_use]
    pub fn mul(&self, other: &Tensor) -> Tensor {
        assert_same_shape(self, other, "mul");
        let data: Vec<f32> = self
            .data()
            .iter()
            .zip(other.data())
            .map(|(&a, &b)| a * b)
            .collect();
        track(
            Tensor::from_vec(data, self.shape()),
            &[self, other],
            Arc::new(MulBackward {
                x: self.detach(),
                y: other.detach(),
            }),
        )
    }

    /// Scalar multiplication: z = self * scalar
    #[must_use]
    pub fn mul_scalar(&self, scalar: f32) -> Tensor {
        let data: Vec<f32> = self.data().iter().map(|&a| a * scalar).collect();
        track(
            Tensor::from_vec(data, self.shape()),
            &[self],
            Arc::new(MulScalarBackward { scalar }),
        )
    }

    /// Scale each row of a 2D tensor by a constant weight: z[b, :] = self[b, :] * w[b].
    ///
    /// The weights are not differentiated; this is how the slice combiner
    /// mixes per-slice representations with attention weights.
    ///
    /// # Panics
    ///
    /// Panics if the tensor is not 2D or `weights.len()` differs from the row count.
    #[must_use]
    pub fn scale_rows(&self, weights: &[f32]) -> Tensor {
        assert_eq!(self.ndim(), 2, "scale_rows expects a 2D tensor");
        assert_eq!(
            weights.len(),
            self.n_rows(),
            "scale_rows: one weight per row"
        );
        let cols = self.n_cols();
        let data: Vec<f32> = self
            .data()
            .iter()
            .enumerate()
            .map(|(i, &v)| v * weights[i / cols])
            .collect();
        track(
            Tensor::from_vec(data, self.shape()),
            &[self],
            Arc::new(ScaleRowsBackward {
                weights: weights.to_vec(),
                cols,
            }),
        )
    }
}

// ============================================================================
// Reduction Operations
// ============================================================================

impl Tensor {
    /// Sum of all elements: z = Σ self
    #[must_use]
    pub fn sum(&self) -> Tensor {
        let total: f32 = self.data().iter().sum();
        track(
            Tensor::new(&[total], &[1]),
            &[self],
            Arc::new(SumBackward {
                input_shape: self.shape().to_vec(),
            }),
        )
    }

    /// Mean of all elements: z = Σ self / n
    #[must_use]
    pub fn mean(&self) -> Tensor {
        let total: f32 = self.data().iter().sum();
        track(
            Tensor::new(&[total / self.numel() as f32], &[1]),
            &[self],
            Arc::new(MeanBackward {
                input_shape: self.shape().to_vec(),
            }),
        )
    }
}

// ============================================================================
// Activation Functions
// ============================================================================

impl Tensor {
    /// `ReLU` activation: max(0, x)
    #[must_use]
    pub fn relu(&self) -> Tensor {
        let data: Vec<f32> = self.data().iter().map(|&x| x.max(0.0)).collect();
        track(
            Tensor::from_vec(data, self.shape()),
            &[self],
            Arc::new(ReluBackward { x: self.detach() }),
        )
    }

    /// Softmax over the last dimension of a 2D tensor.
    #[must_use]
    pub fn softmax(&self) -> Tensor {
        assert_eq!(self.ndim(), 2, "softmax expects a 2D tensor");
        let output = Tensor::from_vec(softmax_rows(self.data(), self.n_cols()), self.shape());
        let saved = output.detach();
        track(output, &[self], Arc::new(SoftmaxBackward { output: saved }))
    }
}

// ============================================================================
// Matrix Operations
// ============================================================================

impl Tensor {
    /// Matrix multiplication of 2D tensors: [m, k] @ [k, n] = [m, n]
    ///
    /// # Panics
    ///
    /// Panics if either tensor is not 2D or the inner dimensions differ.
    #[must_use]
    pub fn matmul(&self, other: &Tensor) -> Tensor {
        assert_eq!(self.ndim(), 2, "matmul: left operand must be 2D");
        assert_eq!(other.ndim(), 2, "matmul: right operand must be 2D");
        let (m, k) = (self.shape()[0], self.shape()[1]);
        let (k2, n) = (other.shape()[0], other.shape()[1]);
        assert_eq!(k, k2, "matmul: inner dimensions {k} and {k2} differ");

        let data = matmul_raw(self.data(), other.data(), m, k, n);
        track(
            Tensor::from_vec(data, &[m, n]),
            &[self, other],
            Arc::new(MatmulBackward {
                x: self.detach(),
                y: other.detach(),
            }),
        )
    }

    /// Transpose of a 2D tensor.
    #[must_use]
    pub fn transpose(&self) -> Tensor {
        assert_eq!(self.ndim(), 2, "transpose expects a 2D tensor");
        let (rows, cols) = (self.shape()[0], self.shape()[1]);
        let data = transpose_raw(self.data(), rows, cols);
        track(
            Tensor::from_vec(data, &[cols, rows]),
            &[self],
            Arc::new(TransposeBackward { rows, cols }),
        )
    }

    /// Add a 1D bias to every row of a 2D tensor.
    #[must_use]
    pub fn broadcast_add(&self, bias: &Tensor) -> Tensor {
        assert_eq!(self.ndim(), 2, "broadcast_add expects a 2D tensor");
        let cols = self.n_cols();
        assert_eq!(
            bias.numel(),
            cols,
            "broadcast_add: bias length must match columns"
        );
        let data: Vec<f32> = self
            .data()
            .iter()
            .enumerate()
            .map(|(i, &v)| v + bias.data()[i % cols])
            .collect();
        track(
            Tensor::from_vec(data, self.shape()),
            &[self, bias],
            Arc::new(BroadcastAddBackward { cols }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::super::{clear_graph, get_grad, no_grad};
    use super::*;

    /// Compare the autograd gradient of `f` at `x` against central differences.
    fn check_gradient(x: &[f32], shape: &[usize], f: impl Fn(&Tensor) -> Tensor) {
        clear_graph();
        let input = Tensor::new(x, shape).requires_grad();
        f(&input).backward();
        let analytic = get_grad(input.id())
            .expect("input should receive a gradient");
        clear_graph();

        let eps = 1e-3;
        for i in 0..x.len() {
            let mut plus = x.to_vec();
            let mut minus = x.to_vec();
            plus[i] += eps;
            minus[i] -= eps;
            let numeric = no_grad(|| {
                (f(&Tensor::new(&plus, shape)).item() - f(&Tensor::new(&minus, shape)).item())
                    / (2.0 * eps)
            });
            assert!(
                (analytic.data()[i] - numeric).abs() < 1e-2,
                "grad mismatch at {i}: analytic {} vs numeric {numeric}",
                analytic.data()[i]
            );
        }
    }

    #[test]
    fn test_add_sub_mul_values() {
        let a = Tensor::from_slice(&[1.0, 2.0]);
        let b = Tensor::from_slice(&[3.0, 5.0]);
        assert_eq!(a.add(&b).data(), &[4.0, 7.0]);
        assert_eq!(b.sub(&a).data(), &[2.0, 3.0]);
        assert_eq!(a.mul(&b).data(), &[3.0, 10.0]);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let t = Tensor::new(&[1.0, 2.0, 3.0, -1.0, 0.0, 1.0], &[2, 3]);
        let s = t.softmax();
        for row in s.data().chunks(3) {
            assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_matmul_values() {
        let a = Tensor::new(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let b = Tensor::new(&[5.0, 6.0, 7.0, 8.0], &[2, 2]);
        assert_eq!(a.matmul(&b).data(), &[19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_relu_gradient() {
        check_gradient(&[-1.0, 0.5, 2.0, -0.3], &[2, 2], |x| x.relu().sum());
    }

    #[test]
    fn test_softmax_gradient() {
        let w = Tensor::new(&[1.0, -2.0, 0.5, 3.0, 0.1, -1.0], &[2, 3]);
        check_gradient(&[0.2, -0.4, 1.0, 0.3, 0.0, -0.7], &[2, 3], |x| {
            x.softmax().mul(&w).sum()
        });
    }

    #[test]
    fn test_matmul_gradient() {
        let w = Tensor::new(&[0.5, -1.0, 2.0, 0.25, 1.5, -0.5], &[3, 2]);
        check_gradient(&[1.0, 2.0, -1.0, 0.5, 0.0, 3.0], &[2, 3], |x| {
            x.matmul(&w).mean()
        });
    }

    #[test]
    fn test_transpose_and_broadcast_gradient() {
        let bias = Tensor::from_slice(&[0.1, -0.2]);
        let w = Tensor::new(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        check_gradient(&[1.0, -1.0, 0.5, 2.0], &[2, 2], |x| {
            x.transpose().broadcast_add(&bias).mul(&w).sum()
        });
    }

    #[test]
    fn test_scale_rows_gradient() {
        check_gradient(&[1.0, 2.0, 3.0, 4.0], &[2, 2], |x| {
            x.scale_rows(&[0.5, 2.0]).mul(x).sum()
        });
    }

    #[test]
    fn test_bias_receives_row_summed_gradient() {
        clear_graph();
        let x = Tensor::new(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[3, 2]);
        let bias = Tensor::from_slice(&[0.0, 0.0]).requires_grad();
        x.broadcast_add(&bias).sum().backward();
        let grad = get_grad(bias.id()).expect("bias gradient");
        assert_eq!(grad.data(), &[3.0, 3.0]);
        clear_graph();
    }

    #[test]
    fn test_no_grad_skips_recording() {
        clear_graph();
        let x = Tensor::from_slice(&[1.0, 2.0]).requires_grad();
        let y = no_grad(|| x.mul_scalar(3.0));
        assert!(!y.requires_grad_enabled());
        assert!(y.is_leaf());
    }
}
