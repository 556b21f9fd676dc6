//! Slice-based learning.
//!
//! Slicing functions mark subsets of the data (slices) that matter. The
//! workflow is:
//!
//! 1. [`SFApplier::apply`] evaluates the slicing functions into an indicator
//!    matrix, one column per function;
//! 2. [`add_slice_labels`] turns that matrix into membership and prediction
//!    labels for every slice on each data loader;
//! 3. [`convert_to_slice_tasks`] replaces a task by its slice-aware family:
//!    per slice a membership task and a prediction task, plus a master task
//!    that keeps the original name and mixes the slice representations with a
//!    [`SliceCombiner`].
//!
//! The resulting tasks train jointly in a
//! [`MultitaskModel`](crate::mtl::MultitaskModel).

mod apply;
mod combiner;
mod sf;
mod utils;

pub use apply::SFApplier;
pub use combiner::{CombinerConfig, SliceCombiner};
pub use sf::{SliceFn, SlicingFunction};
pub use utils::{
    add_slice_labels, convert_to_slice_tasks, convert_to_slice_tasks_with_config, ind_task_name,
    pred_task_name, slice_dataframe, SliceTaskConfig, BASE_SLICE,
};
