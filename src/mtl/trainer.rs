//! Joint training of every task in a multitask model.

use std::collections::BTreeMap;

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::dataset::MultitaskDataLoader;
use super::model::MultitaskModel;
use crate::autograd::{clear_graph, get_grad};
use crate::error::{RebanarError, Result};
use crate::nn::{Adam, ConstantLR, ExponentialLR, LRScheduler, LinearLR, Optimizer, SGD};

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";

/// Optimizer used by the trainer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    #[default]
    Adam,
    Sgd,
}

/// Per-epoch learning rate schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    #[default]
    Constant,
    /// Linear decay to zero over `n_epochs`.
    Linear,
    /// Multiply by `exponential_gamma` after every epoch.
    Exponential,
}

/// Trainer settings.
///
/// ```
/// use rebanar::mtl::TrainerConfig;
///
/// let config = TrainerConfig::from_json_str(r#"{"n_epochs": 3, "progress_bar": false}"#)
///     .expect("valid config");
/// assert_eq!(config.n_epochs, 3);
/// assert_eq!(config.train_split, "train");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainerConfig {
    pub n_epochs: usize,
    pub lr: f32,
    pub optimizer: OptimizerKind,
    /// L2 weight decay.
    pub l2: f32,
    /// Momentum factor for [`OptimizerKind::Sgd`]; 0 disables momentum.
    pub sgd_momentum: f32,
    /// First and second moment decay rates for [`OptimizerKind::Adam`].
    pub adam_betas: (f32, f32),
    /// Global gradient-norm bound; 0 disables clipping.
    pub grad_clip: f32,
    pub lr_scheduler: SchedulerKind,
    pub exponential_gamma: f32,
    /// Evaluate non-training loaders every this many epochs; 0 disables.
    pub log_every: usize,
    pub progress_bar: bool,
    /// Mixed into every loader's shuffle seed.
    pub seed: u64,
    /// Loaders with this split are trained on; the rest are evaluated.
    pub train_split: String,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            n_epochs: 1,
            lr: 0.01,
            optimizer: OptimizerKind::Adam,
            l2: 0.0,
            sgd_momentum: 0.0,
            adam_betas: (0.9, 0.999),
            grad_clip: 1.0,
            lr_scheduler: SchedulerKind::Constant,
            exponential_gamma: 0.9,
            log_every: 1,
            progress_bar: false,
            seed: 0,
            train_split: "train".to_string(),
        }
    }
}

fn invalid(param: &str, value: impl ToString, constraint: &str) -> RebanarError {
    RebanarError::InvalidHyperparameter {
        param: param.to_string(),
        value: value.to_string(),
        constraint: constraint.to_string(),
    }
}

impl TrainerConfig {
    /// Parse a JSON object; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed JSON, unknown fields, or invalid values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str::<Self>(json)?.validate()
    }

    /// Ensure the configuration values are within acceptable bounds.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is out of range.
    pub fn validate(self) -> Result<Self> {
        if self.n_epochs == 0 {
            return Err(invalid("n_epochs", self.n_epochs, "> 0"));
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(invalid("lr", self.lr, "finite and > 0"));
        }
        if !(self.l2.is_finite() && self.l2 >= 0.0) {
            return Err(invalid("l2", self.l2, "finite and >= 0"));
        }
        if !(0.0..1.0).contains(&self.sgd_momentum) {
            return Err(invalid("sgd_momentum", self.sgd_momentum, "in [0, 1)"));
        }
        let (beta1, beta2) = self.adam_betas;
        if !((0.0..1.0).contains(&beta1) && (0.0..1.0).contains(&beta2)) {
            let value = format!("({beta1}, {beta2})");
            return Err(invalid("adam_betas", value, "each in [0, 1)"));
        }
        if !(self.grad_clip.is_finite() && self.grad_clip >= 0.0) {
            return Err(invalid("grad_clip", self.grad_clip, "finite and >= 0"));
        }
        if !(self.exponential_gamma > 0.0 && self.exponential_gamma <= 1.0) {
            return Err(invalid(
                "exponential_gamma",
                self.exponential_gamma,
                "in (0, 1]",
            ));
        }
        if self.train_split.is_empty() {
            return Err(invalid("train_split", "\"\"", "non-empty"));
        }
        Ok(self)
    }
}

/// What happened in one epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    pub epoch: usize,
    /// Mean over batches of the summed task losses.
    pub loss: f32,
    /// Learning rate used during the epoch.
    pub lr: f32,
    /// Evaluation scores on non-training loaders, when evaluated this epoch.
    pub scores: Option<BTreeMap<String, f32>>,
}

/// Trains a [`MultitaskModel`] on all of its tasks at once.
#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: TrainerConfig) -> Result<Self> {
        Ok(Self {
            config: config.validate()?,
        })
    }

    #[must_use]
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Train `model` for `n_epochs` over every training loader.
    ///
    /// Each batch sums the losses of every task it has labels for and takes
    /// one optimizer step. Loaders are visited one after another within an
    /// epoch.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no training loader or a batch fails.
    pub fn fit(
        &self,
        model: &mut MultitaskModel,
        loaders: &[MultitaskDataLoader],
    ) -> Result<Vec<EpochSummary>> {
        let config = &self.config;
        let train_loaders: Vec<&MultitaskDataLoader> = loaders
            .iter()
            .filter(|l| l.split == config.train_split)
            .collect();
        if train_loaders.is_empty() {
            let split = config.train_split.as_str();
            return Err(RebanarError::missing_key("loader for split", split));
        }
        let eval_loaders: Vec<&MultitaskDataLoader> = loaders
            .iter()
            .filter(|l| l.split != config.train_split)
            .collect();

        let mut optimizer: Box<dyn Optimizer> = match config.optimizer {
            OptimizerKind::Adam => Box::new(
                Adam::new(model.parameters_mut(), config.lr)
                    .betas(config.adam_betas.0, config.adam_betas.1)
                    .weight_decay(config.l2),
            ),
            OptimizerKind::Sgd => Box::new(
                SGD::new(model.parameters_mut(), config.lr)
                    .momentum(config.sgd_momentum)
                    .weight_decay(config.l2),
            ),
        };
        let mut scheduler: Box<dyn LRScheduler> = match config.lr_scheduler {
            SchedulerKind::Constant => Box::new(ConstantLR::new()),
            SchedulerKind::Linear => Box::new(LinearLR::new(config.n_epochs, 0.0)),
            SchedulerKind::Exponential => Box::new(ExponentialLR::new(config.exponential_gamma)),
        };

        let batches_per_epoch: usize = train_loaders.iter().map(|l| l.n_batches()).sum();
        let progress = self.progress_bar(config.n_epochs * batches_per_epoch);

        info!(
            epochs = config.n_epochs,
            batches_per_epoch,
            tasks = model.task_names().len(),
            "starting training"
        );

        let mut history = Vec::with_capacity(config.n_epochs);
        for epoch in 0..config.n_epochs {
            let lr = optimizer.lr();
            let mut epoch_loss = 0.0;
            let mut n_steps = 0usize;

            for loader in &train_loaders {
                let seed = (loader.seed() ^ config.seed).wrapping_add(epoch as u64);
                for batch in loader.batches_with_seed(seed) {
                    let losses = model.calculate_loss(
                        &batch.x_dict,
                        &batch.y_dict,
                        &loader.task_to_label_dict,
                    )?;
                    progress.inc(1);

                    let mut task_losses = losses.into_values();
                    let Some(first) = task_losses.next() else {
                        continue;
                    };
                    let total = task_losses.fold(first, |acc, loss| acc.add(&loss));
                    let value = total.item();
                    total.backward();

                    let grad_scale = clip_scale(model, config.grad_clip);
                    optimizer.step_with_params(&mut model.parameters_mut(), grad_scale);
                    clear_graph();

                    debug!(epoch, step = n_steps, loss = value, grad_scale, "batch");
                    epoch_loss += value;
                    n_steps += 1;
                }
            }

            scheduler.step(&mut *optimizer);

            if n_steps == 0 {
                warn!(
                    epoch,
                    "no batch had labels for any task; nothing was trained"
                );
            }
            let loss = if n_steps == 0 {
                0.0
            } else {
                epoch_loss / n_steps as f32
            };
            let evaluate = config.log_every > 0
                && (epoch + 1) % config.log_every == 0
                && !eval_loaders.is_empty();
            let scores = if evaluate {
                Some(model.score(eval_loaders.iter().copied())?)
            } else {
                None
            };

            info!(epoch, loss, lr, "finished epoch");
            if let Some(scores) = &scores {
                for (key, value) in scores {
                    info!(epoch, metric = %key, value, "evaluation");
                }
            }
            progress.set_message(format!("epoch {} loss {loss:.4}", epoch + 1));

            history.push(EpochSummary {
                epoch,
                loss,
                lr,
                scores,
            });
        }

        progress.finish_and_clear();
        Ok(history)
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if !self.config.progress_bar {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(PROGRESS_TEMPLATE) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

/// Factor that brings the global gradient norm down to `max_norm`.
fn clip_scale(model: &MultitaskModel, max_norm: f32) -> f32 {
    if max_norm <= 0.0 {
        return 1.0;
    }
    let sq_norm: f32 = model
        .parameters()
        .iter()
        .filter_map(|p| get_grad(p.id()))
        .map(|g| g.data().iter().map(|v| v * v).sum::<f32>())
        .sum();
    let norm = sq_norm.sqrt();
    if norm > max_norm {
        max_norm / norm
    } else {
        1.0
    }
}
