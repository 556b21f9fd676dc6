//! Fully connected (linear) layer.
//!
//! Implements the transformation y = xW^T + b.
//!
//! # References
//!
//! - Glorot, X., & Bengio, Y. (2010). Understanding the difficulty of training
//!   deep feedforward neural networks. AISTATS.

use super::init::{xavier_uniform, zeros};
use super::module::Module;
use crate::autograd::Tensor;

/// Fully connected layer: y = xW^T + b
///
/// Weight initialization follows Xavier/Glorot (Glorot & Bengio, 2010).
///
/// # Shape
///
/// - Input: `(batch, in_features)`
/// - Output: `(batch, out_features)`
///
/// # Example
///
/// ```
/// use rebanar::autograd::Tensor;
/// use rebanar::nn::{Linear, Module};
///
/// let layer = Linear::with_seed(2, 10, Some(0));
/// let x = Tensor::new(&[0.5, -0.5, 1.0, 0.0], &[2, 2]);
/// assert_eq!(layer.forward(&x).shape(), &[2, 10]);
/// ```
pub struct Linear {
    /// Weight matrix, shape: [out_features, in_features]
    weight: Tensor,

    /// Bias vector, shape: [out_features]
    bias: Tensor,

    in_features: usize,
    out_features: usize,
}

impl Linear {
    /// Create a new Linear layer with Xavier initialization.
    pub fn new(in_features: usize, out_features: usize) -> Self {
        Self::with_seed(in_features, out_features, None)
    }

    /// Create a Linear layer with a specific random seed.
    pub fn with_seed(in_features: usize, out_features: usize, seed: Option<u64>) -> Self {
        let weight = xavier_uniform(
            &[out_features, in_features],
            in_features,
            out_features,
            seed,
        )
        .requires_grad();
        let bias = zeros(&[out_features]).requires_grad();

        Self {
            weight,
            bias,
            in_features,
            out_features,
        }
    }

    /// Get the input feature dimension.
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    /// Get the output feature dimension.
    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Get reference to weight tensor.
    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    /// Get reference to bias tensor.
    pub fn bias(&self) -> &Tensor {
        &self.bias
    }
}

impl Module for Linear {
    fn forward(&self, input: &Tensor) -> Tensor {
        // The transpose is recorded on the tape so gradients reach `weight`.
        input
            .matmul(&self.weight.transpose())
            .broadcast_add(&self.bias)
    }

    fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.weight, &self.bias]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.weight, &mut self.bias]
    }

    fn features(&self) -> Option<(usize, usize)> {
        Some((self.in_features, self.out_features))
    }

    fn type_name(&self) -> &'static str {
        "Linear"
    }
}

impl std::fmt::Debug for Linear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Linear")
            .field("in_features", &self.in_features)
            .field("out_features", &self.out_features)
            .finish()
    }
}
