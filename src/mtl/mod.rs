//! Multitask learning: named tasks over a shared pool of modules.
//!
//! A [`Task`] contributes modules (by name) and a [`TaskFlow`] of operations
//! wiring them together. [`MultitaskModel`] merges every task into one module
//! arena and one operation DAG, so two tasks naming the same module train the
//! same weights. [`Trainer`] optimizes all task losses jointly and
//! [`Scorer`] evaluates each task per dataset split.
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//!
//! use rebanar::autograd::Tensor;
//! use rebanar::mtl::{
//!     ce_loss, softmax, InputRef, ModulePool, MultitaskDataLoader, MultitaskDataset,
//!     MultitaskModel, Operation, Scorer, Task, TaskFlow, Trainer, TrainerConfig,
//! };
//! use rebanar::nn::Linear;
//!
//! let pool = ModulePool::new().with("head", Linear::with_seed(2, 2, Some(0)))?;
//! let flow = TaskFlow::new(vec![Operation::new("head", vec![InputRef::field("data")])])?;
//! let scorer = Scorer::new(&["accuracy"])?;
//! let task = Task::new("task", pool, flow, ce_loss("head"), softmax("head"), scorer);
//! let mut model = MultitaskModel::new(vec![task])?;
//!
//! let mut x = BTreeMap::new();
//! x.insert("data".to_string(), Tensor::new(&[1.0, 0.0, 0.0, 1.0], &[2, 2]));
//! let mut y = BTreeMap::new();
//! y.insert("labels".to_string(), vec![0, 1]);
//! let dataset = MultitaskDataset::new("Toy", x, y)?;
//! let mut map = BTreeMap::new();
//! map.insert("task".to_string(), "labels".to_string());
//! let loader = MultitaskDataLoader::new(map, dataset, "train", 2, false)?;
//!
//! Trainer::new(TrainerConfig::default())?.fit(&mut model, &[loader])?;
//! # Ok::<(), rebanar::RebanarError>(())
//! ```

mod dataset;
mod model;
mod scorer;
mod task;
mod trainer;
mod utils;

pub use dataset::{Batch, MultitaskDataLoader, MultitaskDataset};
pub use model::{MultitaskModel, TaskPredictions};
pub use scorer::{MetricFn, Scorer, METRICS};
pub use task::{InputRef, LossFunc, ModulePool, Operation, OutputFunc, Task, TaskFlow};
pub use trainer::{EpochSummary, OptimizerKind, SchedulerKind, Trainer, TrainerConfig};
pub use utils::{ce_loss, softmax, OpOutputs};
