//! Slice label injection and slice-aware task expansion.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::combiner::{CombinerConfig, SliceCombiner};
use super::sf::SlicingFunction;
use crate::data::DataFrame;
use crate::error::{RebanarError, Result};
use crate::mtl::{
    ce_loss, softmax, InputRef, ModulePool, MultitaskDataLoader, Operation, Scorer, Task, TaskFlow,
};
use crate::nn::Linear;
use crate::primitives::Matrix;

/// Reserved name of the slice holding every example no other slice claims.
pub const BASE_SLICE: &str = "base";

/// Label key and task name of slice `slice`'s membership task.
#[must_use]
pub fn ind_task_name(task: &str, slice: &str) -> String {
    format!("{task}_slice:{slice}_ind")
}

/// Label key and task name of slice `slice`'s prediction task.
#[must_use]
pub fn pred_task_name(task: &str, slice: &str) -> String {
    format!("{task}_slice:{slice}_pred")
}

fn check_slice_names(slice_names: &[&str]) -> Result<()> {
    let mut seen = HashSet::with_capacity(slice_names.len());
    for &name in slice_names {
        if name == BASE_SLICE {
            return Err(RebanarError::InvalidSliceName {
                name: name.to_string(),
                reason: "reserved for examples outside every slice".to_string(),
            });
        }
        if name.is_empty() {
            return Err(RebanarError::InvalidSliceName {
                name: String::new(),
                reason: "empty".to_string(),
            });
        }
        if !seen.insert(name) {
            return Err(RebanarError::duplicate("slice", name));
        }
    }
    Ok(())
}

/// Add membership and prediction labels for every slice to a loader.
///
/// For each slice `s` (column of `s_matrix`) and the implicit `base` slice
/// this inserts, into both the dataset labels and the loader's task mapping:
///
/// - `"{task}_slice:{s}_ind"`: `1` where the slice value is positive, else `0`;
/// - `"{task}_slice:{s}_pred"`: the task's gold label where the slice value is
///   positive, else [`IGNORE_INDEX`](crate::nn::IGNORE_INDEX).
///
/// An example belongs to `base` when no slice value is positive. Nothing is
/// inserted unless every key can be.
///
/// # Errors
///
/// Returns an error if the matrix and dataset disagree on rows, the slice
/// names do not match the matrix columns or are invalid, the task has no
/// labels in the loader, or a derived key already exists.
pub fn add_slice_labels(
    task: &Task,
    loader: &mut MultitaskDataLoader,
    s_matrix: &Matrix<i64>,
    slice_names: &[&str],
) -> Result<()> {
    let label_key = loader
        .task_to_label_dict
        .get(&task.name)
        .ok_or_else(|| {
            RebanarError::missing_key("task in loader", task.name.as_str())
        })?;
    let golds = loader
        .dataset
        .y_dict
        .get(label_key)
        .ok_or_else(|| {
            RebanarError::missing_key("label key", label_key.as_str())
        })?;

    if s_matrix.n_rows() != golds.len() {
        return Err(RebanarError::dimension_mismatch(
            "slice matrix rows",
            golds.len(),
            s_matrix.n_rows(),
        ));
    }
    if s_matrix.n_cols() != slice_names.len() {
        return Err(RebanarError::dimension_mismatch(
            "slice names",
            s_matrix.n_cols(),
            slice_names.len(),
        ));
    }
    check_slice_names(slice_names)?;

    let n = golds.len();
    let mut memberships: Vec<(&str, Vec<bool>)> = slice_names
        .iter()
        .enumerate()
        .map(|(j, &name)| {
            (name, (0..n).map(|i| s_matrix.get(i, j) > 0).collect())
        })
        .collect();
    let base: Vec<bool> = (0..n)
        .map(|i| s_matrix.row(i).iter().all(|&v| v <= 0))
        .collect();
    memberships.push((BASE_SLICE, base));

    let mut new_labels = Vec::with_capacity(2 * memberships.len());
    for (slice, member) in &memberships {
        let ind: Vec<i64> = member.iter().map(|&m| i64::from(m)).collect();
        let pred: Vec<i64> = member
            .iter()
            .zip(golds)
            .map(|(&m, &y)| if m { y } else { crate::nn::IGNORE_INDEX })
            .collect();
        new_labels.push((ind_task_name(&task.name, slice), ind));
        new_labels.push((pred_task_name(&task.name, slice), pred));
    }

    if let Some((key, _)) = new_labels.iter().find(|(key, _)| {
        loader.task_to_label_dict.contains_key(key) || loader.dataset.y_dict.contains_key(key)
    }) {
        return Err(RebanarError::duplicate("label key", key.as_str()));
    }

    for (key, labels) in new_labels {
        loader.dataset.insert_labels(key.clone(), labels)?;
        loader.task_to_label_dict.insert(key.clone(), key);
    }

    debug!(
        task = %task.name,
        dataset = %loader.dataset.name,
        split = %loader.split,
        slices = memberships.len(),
        "added slice labels"
    );
    Ok(())
}

/// Settings for [`convert_to_slice_tasks_with_config`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SliceTaskConfig {
    /// Mixed into the per-module seeds of every new layer.
    pub seed: u64,
    pub combiner: CombinerConfig,
}

/// Seed for a new module, stable across runs for a given name.
fn module_seed(module_name: &str, seed: u64) -> u64 {
    // FNV-1a
    let hash = module_name
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
            (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
        });
    hash ^ seed
}

/// [`convert_to_slice_tasks_with_config`] with default settings.
///
/// # Errors
///
/// See [`convert_to_slice_tasks_with_config`].
pub fn convert_to_slice_tasks(task: Task, slice_names: &[&str]) -> Result<Vec<Task>> {
    convert_to_slice_tasks_with_config(task, slice_names, &SliceTaskConfig::default())
}

/// Replace a task by its slice-aware family.
///
/// The base flow's single sink op is its head and the head's input is the
/// neck. For each slice `s` (and `base`) this builds
///
/// - `"{T}_slice:{s}_ind"`: a binary membership head on the neck;
/// - `"{T}_slice:{s}_pred"`: a per-slice transform of the neck followed by the
///   base head module, trained only on the slice's examples;
///
/// and a master task named `T` that combines the slice transforms with a
/// [`SliceCombiner`] and applies the base head module to the result.
///
/// Returns `[s1_ind, s1_pred, ..., base_ind, base_pred, T]`. The task's
/// modules move into the returned tasks: body modules to the first task, the
/// head module to the first prediction task.
///
/// # Errors
///
/// Returns an error if the slice names are invalid, the flow has no unique
/// sink reading a single input, or the head module does not report its
/// feature sizes.
pub fn convert_to_slice_tasks_with_config(
    task: Task,
    slice_names: &[&str],
    config: &SliceTaskConfig,
) -> Result<Vec<Task>> {
    check_slice_names(slice_names)?;
    let slice_combiner = SliceCombiner::new(config.combiner)?;
    let Task {
        name,
        mut module_pool,
        task_flow,
        scorer,
        ..
    } = task;

    let head_op = match task_flow.sinks().as_slice() {
        [op] => (*op).clone(),
        sinks => {
            return Err(RebanarError::invalid_graph(format!(
                "task '{name}' must have exactly one head operation, found {}",
                sinks.len()
            )))
        }
    };
    let neck = match head_op.inputs.as_slice() {
        [input] => input.clone(),
        inputs => {
            return Err(RebanarError::invalid_graph(format!(
                "head operation '{}' must read exactly one input, reads {}",
                head_op.name,
                inputs.len()
            )))
        }
    };
    let head_module_name = head_op.module_name.clone();
    let head_module = module_pool
        .remove(&head_module_name)
        .ok_or_else(|| {
            RebanarError::missing_key("head module", head_module_name.as_str())
        })?;
    let (neck_dim, cardinality) = head_module.features().ok_or_else(|| {
        RebanarError::invalid_graph(format!(
            "head module '{head_module_name}' ({}) does not report its feature sizes",
            head_module.type_name()
        ))
    })?;

    let body: Vec<Operation> = task_flow
        .into_ops()
        .into_iter()
        .filter(|op| op.name != head_op.name)
        .collect();
    let mut body_modules = Some(module_pool);
    let mut head_module = Some(head_module);

    let slices: Vec<&str> = slice_names.iter().copied().chain([BASE_SLICE]).collect();
    let mut tasks = Vec::with_capacity(2 * slices.len() + 1);
    let mut ind_ops = Vec::with_capacity(slices.len());
    let mut transform_ops = Vec::with_capacity(slices.len());
    let mut pred_ops = Vec::with_capacity(slices.len());

    for slice in &slices {
        let ind_head = format!("{name}_slice:{slice}_ind_head");
        let transform = format!("{name}_slice:{slice}_pred_transform");
        let pred_head = format!("{name}_slice:{slice}_pred_head");

        let ind_op = Operation::new(ind_head.as_str(), vec![neck.clone()]);
        let mut ind_pool = body_modules.take().unwrap_or_default();
        ind_pool.insert(
            ind_head.as_str(),
            Linear::with_seed(neck_dim, 2, Some(module_seed(&ind_head, config.seed))),
        )?;
        let ind_flow = TaskFlow::new(body.iter().cloned().chain([ind_op.clone()]).collect())?;
        tasks.push(Task::new(
            ind_task_name(&name, slice),
            ind_pool,
            ind_flow,
            ce_loss(ind_head.as_str()),
            softmax(ind_head.as_str()),
            Scorer::new(&["f1"])?,
        ));

        let transform_op = Operation::new(transform.as_str(), vec![neck.clone()]);
        let pred_op = Operation::named(
            pred_head.as_str(),
            head_module_name.as_str(),
            vec![InputRef::op(transform.as_str(), 0)],
        );
        let mut pred_pool = ModulePool::new();
        pred_pool.insert(
            transform.as_str(),
            Linear::with_seed(
                neck_dim,
                neck_dim,
                Some(module_seed(&transform, config.seed)),
            ),
        )?;
        if let Some(module) = head_module.take() {
            pred_pool.insert_boxed(head_module_name.clone(), module)?;
        }
        let pred_flow = TaskFlow::new(
            body.iter()
                .cloned()
                .chain([transform_op.clone(), pred_op.clone()])
                .collect(),
        )?;
        tasks.push(Task::new(
            pred_task_name(&name, slice),
            pred_pool,
            pred_flow,
            ce_loss(pred_head.as_str()),
            softmax(pred_head.as_str()),
            scorer.clone(),
        ));

        ind_ops.push(ind_op);
        transform_ops.push(transform_op);
        pred_ops.push(pred_op);
    }

    let combiner = format!("{name}_slice:combiner");
    let master_head = format!("{name}_slice:master_head");
    let combiner_inputs: Vec<InputRef> = ind_ops
        .iter()
        .chain(&pred_ops)
        .chain(&transform_ops)
        .map(|op| InputRef::op(op.name.as_str(), 0))
        .collect();
    let master_ops: Vec<Operation> = body
        .into_iter()
        .chain(ind_ops)
        .chain(transform_ops)
        .chain(pred_ops)
        .chain([
            Operation::new(combiner.as_str(), combiner_inputs),
            Operation::named(
                master_head.as_str(),
                head_module_name.as_str(),
                vec![InputRef::op(combiner.as_str(), 0)],
            ),
        ])
        .collect();
    let master_pool = ModulePool::new().with(combiner.as_str(), slice_combiner)?;
    tasks.push(Task::new(
        name.as_str(),
        master_pool,
        TaskFlow::new(master_ops)?,
        ce_loss(master_head.as_str()),
        softmax(master_head.as_str()),
        scorer,
    ));

    debug!(
        task = %name,
        slices = slices.len(),
        neck = neck_dim,
        cardinality,
        "converted task to slice tasks"
    );
    Ok(tasks)
}

/// Rows of `df` the slicing function claims (value > 0).
///
/// # Errors
///
/// Returns an error if the slicing function fails on a row.
pub fn slice_dataframe(df: &DataFrame, sf: &SlicingFunction) -> Result<DataFrame> {
    let mut indices = Vec::new();
    for x in df.rows() {
        let value = sf.call(&x).map_err(|e| RebanarError::SlicingFunction {
            name: sf.name().to_string(),
            row: x.index(),
            message: e.to_string(),
        })?;
        if value > 0 {
            indices.push(x.index());
        }
    }
    df.filter_rows(&indices)
}
