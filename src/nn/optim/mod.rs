//! Gradient-based optimizers for multitask training.
//!
//! Optimizers hold per-parameter state indexed by position, so the caller
//! must pass parameters in the same order on every step. `MultitaskModel`
//! guarantees this by walking its module arena in insertion order.
//!
//! # Example
//!
//! ```
//! use rebanar::autograd::{clear_graph, Tensor};
//! use rebanar::nn::optim::{Optimizer, SGD};
//!
//! let mut w = Tensor::from_slice(&[1.0, -1.0]).requires_grad();
//! let mut sgd = SGD::new(vec![&mut w], 0.5);
//!
//! w.mul(&w).sum().backward();
//! sgd.step_with_params(&mut [&mut w], 1.0);
//! clear_graph();
//!
//! assert_eq!(w.data(), &[0.0, 0.0]);
//! ```
//!
//! # References
//!
//! - Robbins, H., & Monro, S. (1951). A stochastic approximation method.
//! - Kingma, D. P., & Ba, J. (2015). Adam: A method for stochastic optimization. ICLR.

use crate::autograd::{get_grad, Tensor, TensorId};

/// Common trait for all optimizers.
pub trait Optimizer {
    /// Update `params` in place from the gradients on the current tape.
    ///
    /// Every gradient is multiplied by `grad_scale` before use; the trainer
    /// passes a value below 1.0 to clip the global gradient norm. Parameters
    /// without a gradient (not reached by this batch's loss) are untouched.
    fn step_with_params(&mut self, params: &mut [&mut Tensor], grad_scale: f32);

    /// Zero all parameter gradients.
    fn zero_grad(&mut self);

    /// Get current learning rate.
    fn lr(&self) -> f32;

    /// Set learning rate (for schedulers).
    fn set_lr(&mut self, lr: f32);
}

/// Stochastic Gradient Descent optimizer with optional momentum.
///
/// Update rule:
/// ```text
/// g   = grad_scale * grad + weight_decay * param
/// v_t = momentum * v_{t-1} + g
/// param = param - lr * v_t
/// ```
#[derive(Debug)]
pub struct SGD {
    param_ids: Vec<TensorId>,
    lr: f32,
    /// Momentum factor (0 = no momentum)
    momentum: f32,
    /// Weight decay (L2 regularization)
    weight_decay: f32,
    velocities: Vec<Vec<f32>>,
}

impl SGD {
    /// Create a new SGD optimizer.
    ///
    /// # Arguments
    ///
    /// * `params` - Mutable references to parameter tensors
    /// * `lr` - Learning rate
    #[allow(clippy::needless_pass_by_value)]
    #[must_use]
    pub fn new(params: Vec<&mut Tensor>, lr: f32) -> Self {
        Self {
            param_ids: params.iter().map(|p| p.id()).collect(),
            lr,
            momentum: 0.0,
            weight_decay: 0.0,
            velocities: Vec::new(),
        }
    }

    /// Set the momentum factor.
    #[must_use]
    pub fn momentum(mut self, momentum: f32) -> Self {
        self.momentum = momentum;
        self
    }

    /// Set weight decay (L2 regularization).
    #[must_use]
    pub fn weight_decay(mut self, wd: f32) -> Self {
        self.weight_decay = wd;
        self
    }

    fn update_param(&mut self, param: &mut Tensor, idx: usize, grad_scale: f32) {
        let Some(grad) = get_grad(param.id()) else {
            return;
        };

        let grad_data = grad.data();
        let param_data = param.data_mut();

        if idx >= self.velocities.len() {
            self.velocities.resize(idx + 1, Vec::new());
        }
        if self.velocities[idx].len() != param_data.len() {
            self.velocities[idx] = vec![0.0; param_data.len()];
        }
        let velocity = &mut self.velocities[idx];

        for i in 0..param_data.len() {
            let g = grad_scale * grad_data[i] + self.weight_decay * param_data[i];

            if self.momentum != 0.0 {
                velocity[i] = self.momentum * velocity[i] + g;
                param_data[i] -= self.lr * velocity[i];
            } else {
                param_data[i] -= self.lr * g;
            }
        }
    }
}

impl Optimizer for SGD {
    fn step_with_params(&mut self, params: &mut [&mut Tensor], grad_scale: f32) {
        for (idx, param) in params.iter_mut().enumerate() {
            self.update_param(param, idx, grad_scale);
        }
    }

    fn zero_grad(&mut self) {
        for &id in &self.param_ids {
            crate::autograd::clear_grad(id);
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}

/// Adam optimizer (Kingma & Ba, 2015).
///
/// Combines momentum with adaptive learning rates using first and second
/// moment estimates. Weight decay is added to the gradient (L2 penalty).
///
/// Update rule:
/// ```text
/// m_t = β₁ * m_{t-1} + (1 - β₁) * grad
/// v_t = β₂ * v_{t-1} + (1 - β₂) * grad²
/// m̂_t = m_t / (1 - β₁ᵗ)
/// v̂_t = v_t / (1 - β₂ᵗ)
/// param = param - lr * m̂_t / (√v̂_t + ε)
/// ```
#[derive(Debug)]
pub struct Adam {
    param_ids: Vec<TensorId>,
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    weight_decay: f32,
    /// First moment estimates
    m: Vec<Vec<f32>>,
    /// Second moment estimates
    v: Vec<Vec<f32>>,
    /// Timestep
    t: usize,
}

impl Adam {
    /// Create a new Adam optimizer.
    ///
    /// Default: β₁=0.9, β₂=0.999, ε=1e-8
    #[allow(clippy::needless_pass_by_value)]
    #[must_use]
    pub fn new(params: Vec<&mut Tensor>, lr: f32) -> Self {
        Self {
            param_ids: params.iter().map(|p| p.id()).collect(),
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
            m: Vec::new(),
            v: Vec::new(),
            t: 0,
        }
    }

    /// Set the moment decay rates β₁ and β₂.
    #[must_use]
    pub fn betas(mut self, beta1: f32, beta2: f32) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }

    #[must_use]
    pub fn weight_decay(mut self, wd: f32) -> Self {
        self.weight_decay = wd;
        self
    }

    fn update_param(&mut self, param: &mut Tensor, idx: usize, grad_scale: f32) {
        let Some(grad) = get_grad(param.id()) else {
            return;
        };

        let grad_data = grad.data();
        let param_data = param.data_mut();

        if idx >= self.m.len() {
            self.m.resize(idx + 1, Vec::new());
            self.v.resize(idx + 1, Vec::new());
        }
        if self.m[idx].len() != param_data.len() {
            self.m[idx] = vec![0.0; param_data.len()];
            self.v[idx] = vec![0.0; param_data.len()];
        }

        let m = &mut self.m[idx];
        let v = &mut self.v[idx];

        let bias_correction1 = 1.0 - self.beta1.powi(self.t as i32);
        let bias_correction2 = 1.0 - self.beta2.powi(self.t as i32);

        for i in 0..param_data.len() {
            let g = grad_scale * grad_data[i] + self.weight_decay * param_data[i];

            m[i] = self.beta1 * m[i] + (1.0 - self.beta1) * g;
            v[i] = self.beta2 * v[i] + (1.0 - self.beta2) * g * g;

            let m_hat = m[i] / bias_correction1;
            let v_hat = v[i] / bias_correction2;

            param_data[i] -= self.lr * m_hat / (v_hat.sqrt() + self.eps);
        }
    }
}

impl Optimizer for Adam {
    fn step_with_params(&mut self, params: &mut [&mut Tensor], grad_scale: f32) {
        self.t += 1;
        for (idx, param) in params.iter_mut().enumerate() {
            self.update_param(param, idx, grad_scale);
        }
    }

    fn zero_grad(&mut self) {
        for &id in &self.param_ids {
            crate::autograd::clear_grad(id);
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}

#[cfg(test)]
mod tests;
