//! Gradient function trait and implementations.
//!
//! Each differentiable operation implements `GradFn` to define
//! how gradients flow backward through the operation.

use super::tensor::Tensor;

/// Trait for functions that compute gradients during backward pass.
///
/// Each differentiable operation creates a `GradFn` implementation
/// that captures the necessary context for gradient computation.
///
/// For element-wise addition z = x + y, ∂z/∂x = ∂z/∂y = 1, so
/// `backward(grad_output)` returns [`grad_output`, `grad_output`].
pub trait GradFn: Send + Sync {
    /// Compute gradients with respect to inputs.
    ///
    /// Returns one gradient per input tensor, in the order the inputs were
    /// recorded during the forward pass.
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor>;

    /// Human-readable name for debugging.
    fn name(&self) -> &'static str;
}

/// Row-major matrix product of `a` `[m, k]` and `b` `[k, n]`.
pub(crate) fn matmul_raw(a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Vec<f32> {
    let mut out = vec![0.0; m * n];
    for i in 0..m {
        let a_row = &a[i * k..(i + 1) * k];
        let out_row = &mut out[i * n..(i + 1) * n];
        for (p, &a_ip) in a_row.iter().enumerate() {
            if a_ip == 0.0 {
                continue;
            }
            let b_row = &b[p * n..(p + 1) * n];
            for (o, &b_pj) in out_row.iter_mut().zip(b_row) {
                *o += a_ip * b_pj;
            }
        }
    }
    out
}

/// Transpose of a row-major `[rows, cols]` buffer.
pub(crate) fn transpose_raw(x: &[f32], rows: usize, cols: usize) -> Vec<f32> {
    let mut out = vec![0.0; rows * cols];
    for i in 0..rows {
        for j in 0..cols {
            out[j * rows + i] = x[i * cols + j];
        }
    }
    out
}

fn map_grad(grad_output: &Tensor, f: impl Fn(f32) -> f32) -> Tensor {
    let data: Vec<f32> = grad_output.data().iter().map(|&g| f(g)).collect();
    Tensor::from_vec(data, grad_output.shape())
}

fn zip_grad(grad_output: &Tensor, other: &Tensor, f: impl Fn(f32, f32) -> f32) -> Tensor {
    let data: Vec<f32> = grad_output
        .data()
        .iter()
        .zip(other.data())
        .map(|(&g, &o)| f(g, o))
        .collect();
    Tensor::from_vec(data, grad_output.shape())
}

// ============================================================================
// Element-wise Operations
// ============================================================================

pub(crate) struct AddBackward;

impl GradFn for AddBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        vec![grad_output.clone(), grad_output.clone()]
    }

    fn name(&self) -> &'static str {
        "AddBackward"
    }
}

pub(crate) struct SubBackward;

impl GradFn for SubBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        vec![grad_output.clone(), map_grad(grad_output, |g| -g)]
    }

    fn name(&self) -> &'static str {
        "SubBackward"
    }
}

/// z = x * y: ∂z/∂x = y, ∂z/∂y = x
pub(crate) struct MulBackward {
    pub(crate) x: Tensor,
    pub(crate) y: Tensor,
}

impl GradFn for MulBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        vec![
            zip_grad(grad_output, &self.y, |g, y| g * y),
            zip_grad(grad_output, &self.x, |g, x| g * x),
        ]
    }

    fn name(&self) -> &'static str {
        "MulBackward"
    }
}

pub(crate) struct MulScalarBackward {
    pub(crate) scalar: f32,
}

impl GradFn for MulScalarBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        vec![map_grad(grad_output, |g| g * self.scalar)]
    }

    fn name(&self) -> &'static str {
        "MulScalarBackward"
    }
}

/// z[b, j] = x[b, j] * w[b] with `w` a constant per-row weight.
pub(crate) struct ScaleRowsBackward {
    pub(crate) weights: Vec<f32>,
    pub(crate) cols: usize,
}

impl GradFn for ScaleRowsBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let data: Vec<f32> = grad_output
            .data()
            .iter()
            .enumerate()
            .map(|(i, &g)| g * self.weights[i / self.cols])
            .collect();
        vec![Tensor::from_vec(data, grad_output.shape())]
    }

    fn name(&self) -> &'static str {
        "ScaleRowsBackward"
    }
}

// ============================================================================
// Reduction Operations
// ============================================================================

pub(crate) struct SumBackward {
    pub(crate) input_shape: Vec<usize>,
}

impl GradFn for SumBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let g = grad_output.item();
        let numel: usize = self.input_shape.iter().product();
        vec![Tensor::from_vec(vec![g; numel], &self.input_shape)]
    }

    fn name(&self) -> &'static str {
        "SumBackward"
    }
}

pub(crate) struct MeanBackward {
    pub(crate) input_shape: Vec<usize>,
}

impl GradFn for MeanBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let numel: usize = self.input_shape.iter().product();
        let grad_val = grad_output.item() / numel as f32;
        vec![Tensor::from_vec(vec![grad_val; numel], &self.input_shape)]
    }

    fn name(&self) -> &'static str {
        "MeanBackward"
    }
}

// ============================================================================
// Activation Functions
// ============================================================================

/// ∂relu(x)/∂x = 1 if x > 0, else 0
pub(crate) struct ReluBackward {
    pub(crate) x: Tensor,
}

impl GradFn for ReluBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        vec![zip_grad(grad_output, &self.x, |g, x| {
            if x > 0.0 {
                g
            } else {
                0.0
            }
        })]
    }

    fn name(&self) -> &'static str {
        "ReluBackward"
    }
}

/// Softmax over the last dimension of a 2D tensor.
/// For y = softmax(x): ∂L/∂x_i = y_i * (g_i - Σ_j g_j * y_j)
pub(crate) struct SoftmaxBackward {
    pub(crate) output: Tensor,
}

impl GradFn for SoftmaxBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let features = self.output.n_cols();
        let out_data = self.output.data();
        let grad_data = grad_output.data();
        let mut grad_input = vec![0.0; out_data.len()];

        for (row, (y, g)) in out_data
            .chunks(features)
            .zip(grad_data.chunks(features))
            .enumerate()
        {
            let dot: f32 = y.iter().zip(g).map(|(a, b)| a * b).sum();
            for j in 0..features {
                grad_input[row * features + j] = y[j] * (g[j] - dot);
            }
        }

        vec![Tensor::from_vec(grad_input, grad_output.shape())]
    }

    fn name(&self) -> &'static str {
        "SoftmaxBackward"
    }
}

/// Cross-entropy over logits with ignored rows.
///
/// For kept rows: ∂L/∂x = (softmax(x) - one_hot(target)) / n_kept;
/// ignored rows receive zero gradient.
pub(crate) struct CrossEntropyBackward {
    pub(crate) softmax_output: Tensor,
    pub(crate) targets: Vec<Option<usize>>,
    pub(crate) scale: f32,
}

impl GradFn for CrossEntropyBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let g = grad_output.item() * self.scale;
        let classes = self.softmax_output.n_cols();
        let mut grad = vec![0.0; self.softmax_output.numel()];

        for (row, target) in self.targets.iter().enumerate() {
            let Some(target) = *target else {
                continue;
            };
            for c in 0..classes {
                let idx = row * classes + c;
                let one_hot = if c == target { 1.0 } else { 0.0 };
                grad[idx] = g * (self.softmax_output.data()[idx] - one_hot);
            }
        }

        vec![Tensor::from_vec(grad, self.softmax_output.shape())]
    }

    fn name(&self) -> &'static str {
        "CrossEntropyBackward"
    }
}

// ============================================================================
// Matrix Operations
// ============================================================================

/// z = x @ y: ∂L/∂x = G @ yᵀ, ∂L/∂y = xᵀ @ G
pub(crate) struct MatmulBackward {
    pub(crate) x: Tensor,
    pub(crate) y: Tensor,
}

impl GradFn for MatmulBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let (m, k) = (self.x.shape()[0], self.x.shape()[1]);
        let n = self.y.shape()[1];

        let y_t = transpose_raw(self.y.data(), k, n);
        let grad_x = matmul_raw(grad_output.data(), &y_t, m, n, k);

        let x_t = transpose_raw(self.x.data(), m, k);
        let grad_y = matmul_raw(&x_t, grad_output.data(), k, m, n);

        vec![
            Tensor::from_vec(grad_x, self.x.shape()),
            Tensor::from_vec(grad_y, self.y.shape()),
        ]
    }

    fn name(&self) -> &'static str {
        "MatmulBackward"
    }
}

pub(crate) struct TransposeBackward {
    pub(crate) rows: usize,
    pub(crate) cols: usize,
}

impl GradFn for TransposeBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        // grad_output is [cols, rows]
        let data = transpose_raw(grad_output.data(), self.cols, self.rows);
        vec![Tensor::from_vec(data, &[self.rows, self.cols])]
    }

    fn name(&self) -> &'static str {
        "TransposeBackward"
    }
}

/// z[b, j] = x[b, j] + bias[j]; the bias gradient sums over rows.
pub(crate) struct BroadcastAddBackward {
    pub(crate) cols: usize,
}

impl GradFn for BroadcastAddBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let mut grad_bias = vec![0.0; self.cols];
        for row in grad_output.data().chunks(self.cols) {
            for (acc, &g) in grad_bias.iter_mut().zip(row) {
                *acc += g;
            }
        }
        vec![
            grad_output.clone(),
            Tensor::from_vec(grad_bias, &[self.cols]),
        ]
    }

    fn name(&self) -> &'static str {
        "BroadcastAddBackward"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matmul_raw() {
        // [1 2; 3 4] @ [5; 6] = [17; 39]
        let out = matmul_raw(&[1.0, 2.0, 3.0, 4.0], &[5.0, 6.0], 2, 2, 1);
        assert_eq!(out, vec![17.0, 39.0]);
    }

    #[test]
    fn test_transpose_raw() {
        let out = transpose_raw(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3);
        assert_eq!(out, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_cross_entropy_backward_skips_ignored_rows() {
        let softmax = Tensor::new(&[0.25, 0.75, 0.5, 0.5], &[2, 2]);
        let grad_fn = CrossEntropyBackward {
            softmax_output: softmax,
            targets: vec![Some(1), None],
            scale: 1.0,
        };
        let grads = grad_fn.backward(&Tensor::from_slice(&[1.0]));
        assert_eq!(grads[0].data(), &[0.25, -0.25, 0.0, 0.0]);
    }
}
