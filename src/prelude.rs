//! Convenience re-exports for common usage.
//!
//! # Usage
//!
//! ```
//! use rebanar::prelude::*;
//! ```

pub use crate::autograd::Tensor;
pub use crate::data::{DataFrame, DataPoint};
pub use crate::error::{RebanarError, Result};
pub use crate::mtl::{
    ce_loss, softmax, InputRef, ModulePool, MultitaskDataLoader, MultitaskDataset, MultitaskModel,
    Operation, Scorer, Task, TaskFlow, Trainer, TrainerConfig,
};
pub use crate::nn::{Linear, Module, ReLU, Sequential, IGNORE_INDEX};
pub use crate::primitives::Matrix;
pub use crate::slicing::{
    add_slice_labels, convert_to_slice_tasks, SFApplier, SlicingFunction,
};
