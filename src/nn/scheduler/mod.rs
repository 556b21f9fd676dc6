//! Learning rate schedulers.
//!
//! Schedulers are stepped once per epoch by the trainer and write the new
//! rate into the optimizer through [`Optimizer::set_lr`].
//!
//! # References
//!
//! - Loshchilov, I., & Hutter, F. (2017). SGDR: Stochastic gradient descent
//!   with warm restarts. ICLR.

use super::optim::Optimizer;

/// Common trait for learning rate schedulers.
pub trait LRScheduler {
    /// Advance one epoch and update the optimizer's learning rate.
    fn step(&mut self, optimizer: &mut dyn Optimizer);

    /// Learning rate after the most recent step.
    fn get_lr(&self) -> f32;

    /// Number of steps taken so far.
    fn last_epoch(&self) -> usize;
}

/// Keeps the learning rate fixed.
#[derive(Debug, Clone, Default)]
pub struct ConstantLR {
    lr: Option<f32>,
    last_epoch: usize,
}

impl ConstantLR {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LRScheduler for ConstantLR {
    fn step(&mut self, optimizer: &mut dyn Optimizer) {
        self.last_epoch += 1;
        self.lr = Some(optimizer.lr());
    }

    fn get_lr(&self) -> f32 {
        self.lr.unwrap_or(0.0)
    }

    fn last_epoch(&self) -> usize {
        self.last_epoch
    }
}

/// Linear decay from the initial rate to `initial * end_factor` over
/// `total_steps` steps, constant afterwards.
///
/// ```text
/// lr_t = lr_0 * (1 + (end_factor - 1) * min(t, total_steps) / total_steps)
/// ```
#[derive(Debug, Clone)]
pub struct LinearLR {
    base_lr: Option<f32>,
    current_lr: f32,
    end_factor: f32,
    total_steps: usize,
    last_epoch: usize,
}

impl LinearLR {
    /// Create a linear schedule; the initial rate is read from the
    /// optimizer on the first step.
    #[must_use]
    pub fn new(total_steps: usize, end_factor: f32) -> Self {
        Self {
            base_lr: None,
            current_lr: 0.0,
            end_factor,
            total_steps: total_steps.max(1),
            last_epoch: 0,
        }
    }
}

impl LRScheduler for LinearLR {
    fn step(&mut self, optimizer: &mut dyn Optimizer) {
        let base = *self.base_lr.get_or_insert(optimizer.lr());
        self.last_epoch += 1;
        let progress = self.last_epoch.min(self.total_steps) as f32 / self.total_steps as f32;
        self.current_lr = base * (1.0 + (self.end_factor - 1.0) * progress);
        optimizer.set_lr(self.current_lr);
    }

    fn get_lr(&self) -> f32 {
        self.current_lr
    }

    fn last_epoch(&self) -> usize {
        self.last_epoch
    }
}

/// Exponential decay: `lr_t = lr_0 * gamma^t`.
#[derive(Debug, Clone)]
pub struct ExponentialLR {
    base_lr: Option<f32>,
    current_lr: f32,
    gamma: f32,
    last_epoch: usize,
}

impl ExponentialLR {
    #[must_use]
    pub fn new(gamma: f32) -> Self {
        Self {
            base_lr: None,
            current_lr: 0.0,
            gamma,
            last_epoch: 0,
        }
    }
}

impl LRScheduler for ExponentialLR {
    fn step(&mut self, optimizer: &mut dyn Optimizer) {
        let base = *self.base_lr.get_or_insert(optimizer.lr());
        self.last_epoch += 1;
        self.current_lr = base * self.gamma.powi(self.last_epoch as i32);
        optimizer.set_lr(self.current_lr);
    }

    fn get_lr(&self) -> f32 {
        self.current_lr
    }

    fn last_epoch(&self) -> usize {
        self.last_epoch
    }
}
