//! Activation function modules.
//!
//! # References
//!
//! - Nair, V., & Hinton, G. E. (2010). Rectified linear units improve restricted
//!   Boltzmann machines. ICML.

use super::module::Module;
use crate::autograd::Tensor;

/// Rectified Linear Unit activation: ReLU(x) = max(0, x)
///
/// ```
/// use rebanar::autograd::Tensor;
/// use rebanar::nn::{Module, ReLU};
///
/// let y = ReLU::new().forward(&Tensor::from_slice(&[-1.0, 0.0, 2.0]));
/// assert_eq!(y.data(), &[0.0, 0.0, 2.0]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ReLU;

impl ReLU {
    /// Create a new ReLU activation.
    pub fn new() -> Self {
        Self
    }
}

impl Module for ReLU {
    fn forward(&self, input: &Tensor) -> Tensor {
        input.relu()
    }

    fn type_name(&self) -> &'static str {
        "ReLU"
    }
}
