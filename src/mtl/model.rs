//! The multitask model: one module arena and one merged operation graph.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use tracing::{debug, info};

use super::dataset::MultitaskDataLoader;
use super::scorer::Scorer;
use super::task::{topological_order, LossFunc, ModulePool, Operation, OutputFunc, Task};
use super::utils::OpOutputs;
use crate::autograd::{no_grad, Tensor};
use crate::error::{RebanarError, Result};
use crate::nn::serialize::{
    load_state_dict, load_state_dict_into, save_state_dict, state_dict, StateDict,
};

struct TaskEntry {
    name: String,
    loss_func: LossFunc,
    output_func: OutputFunc,
    scorer: Scorer,
    ops: HashSet<String>,
}

/// Gold labels, class probabilities and argmax predictions of one task over a loader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPredictions {
    pub golds: Vec<i64>,
    pub probs: Vec<Vec<f32>>,
    pub preds: Vec<usize>,
}

/// Jointly trainable composition of tasks.
///
/// Modules are merged by name (the first definition wins), so tasks that
/// name the same module share its parameters. Operations are merged by name
/// and must agree on their definition.
pub struct MultitaskModel {
    module_pool: ModulePool,
    ops: Vec<Operation>,
    order: Vec<usize>,
    tasks: Vec<TaskEntry>,
}

impl MultitaskModel {
    /// Assemble `tasks` into one model.
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate task names, conflicting operation
    /// definitions, operations whose module no task provides, or a cyclic
    /// merged graph.
    pub fn new(tasks: Vec<Task>) -> Result<Self> {
        let mut module_pool = ModulePool::new();
        let mut ops: Vec<Operation> = Vec::new();
        let mut entries: Vec<TaskEntry> = Vec::with_capacity(tasks.len());

        for task in tasks {
            if entries.iter().any(|e| e.name == task.name) {
                return Err(RebanarError::duplicate("task", task.name));
            }

            for (name, module) in task.module_pool {
                if module_pool.contains(&name) {
                    debug!(
                        module = %name,
                        task = %task.name,
                        "module already defined, sharing first definition"
                    );
                    continue;
                }
                module_pool.insert_boxed(name, module)?;
            }

            for op in task.task_flow.ops() {
                match ops.iter().find(|existing| existing.name == op.name) {
                    Some(existing) if existing != op => {
                        return Err(RebanarError::invalid_graph(format!(
                            "operation '{}' of task '{}' conflicts with an earlier definition",
                            op.name, task.name
                        )));
                    }
                    Some(_) => {}
                    None => ops.push(op.clone()),
                }
            }

            let op_names = task.task_flow.ops().iter().map(|op| op.name.clone());
            entries.push(TaskEntry {
                ops: op_names.collect(),
                name: task.name,
                loss_func: task.loss_func,
                output_func: task.output_func,
                scorer: task.scorer,
            });
        }

        if let Some(op) = ops.iter().find(|op| !module_pool.contains(&op.module_name)) {
            return Err(RebanarError::missing_key(
                "module",
                format!("{} (used by operation '{}')", op.module_name, op.name),
            ));
        }

        let order = topological_order(&ops)?;

        info!(
            tasks = entries.len(),
            modules = module_pool.len(),
            operations = ops.len(),
            "built multitask model"
        );

        Ok(Self {
            module_pool,
            ops,
            order,
            tasks: entries,
        })
    }

    /// Task names in construction order.
    #[must_use]
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }

    /// Module names in arena order.
    #[must_use]
    pub fn module_names(&self) -> Vec<&str> {
        self.module_pool.names()
    }

    #[must_use]
    pub fn module_pool(&self) -> &ModulePool {
        &self.module_pool
    }

    /// The scorer of the named task.
    #[must_use]
    pub fn scorer(&self, task_name: &str) -> Option<&Scorer> {
        self.task(task_name).map(|t| &t.scorer)
    }

    fn task(&self, name: &str) -> Option<&TaskEntry> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// All trainable parameters, in arena order.
    #[must_use]
    pub fn parameters(&self) -> Vec<&Tensor> {
        self.module_pool
            .iter()
            .flat_map(|(_, m)| m.parameters())
            .collect()
    }

    /// Mutable parameters, in the same order as [`MultitaskModel::parameters`].
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.module_pool
            .iter_mut()
            .flat_map(|(_, m)| m.parameters_mut())
            .collect()
    }

    /// Run every operation needed by `task_names`, each once, in topological
    /// order.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown task, a missing input field, or a
    /// module rejecting its inputs.
    pub fn forward(
        &self,
        x_dict: &BTreeMap<String, Tensor>,
        task_names: &[&str],
    ) -> Result<OpOutputs> {
        let mut needed: HashSet<&str> = HashSet::new();
        for &name in task_names {
            let task = self
                .task(name)
                .ok_or_else(|| RebanarError::missing_key("task", name))?;
            needed.extend(task.ops.iter().map(String::as_str));
        }

        let mut outputs = OpOutputs::new(x_dict.clone());
        for op in self.order.iter().map(|&i| &self.ops[i]) {
            if !needed.contains(op.name.as_str()) {
                continue;
            }
            let inputs = op
                .inputs
                .iter()
                .map(|input| outputs.resolve(input).cloned())
                .collect::<Result<Vec<_>>>()?;
            let module = self
                .module_pool
                .get(&op.module_name)
                .ok_or_else(|| {
                    RebanarError::missing_key("module", op.module_name.as_str())
                })?;
            let result = module.forward_many(&inputs)?;
            outputs.insert(op.name.clone(), result);
        }

        Ok(outputs)
    }

    /// Tasks of this model that have labels in `y_dict` through `task_to_label_dict`.
    fn labelled_tasks<'a>(
        &'a self,
        y_dict: &BTreeMap<String, Vec<i64>>,
        task_to_label_dict: &'a BTreeMap<String, String>,
    ) -> Vec<(&'a TaskEntry, &'a str)> {
        self.tasks
            .iter()
            .filter_map(|task| {
                let key = task_to_label_dict.get(&task.name)?;
                y_dict.contains_key(key).then_some((task, key.as_str()))
            })
            .collect()
    }

    /// Per-task losses for one batch.
    ///
    /// Tasks without a label key, or whose labels are all masked in this
    /// batch, are absent from the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the forward pass or a loss function fails.
    pub fn calculate_loss(
        &self,
        x_dict: &BTreeMap<String, Tensor>,
        y_dict: &BTreeMap<String, Vec<i64>>,
        task_to_label_dict: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, Tensor>> {
        let active = self.labelled_tasks(y_dict, task_to_label_dict);
        if active.is_empty() {
            return Ok(BTreeMap::new());
        }

        let names: Vec<&str> = active.iter().map(|(t, _)| t.name.as_str()).collect();
        let outputs = self.forward(x_dict, &names)?;

        let mut losses = BTreeMap::new();
        for (task, key) in active {
            if let Some(loss) = (task.loss_func)(&outputs, &y_dict[key])? {
                losses.insert(task.name.clone(), loss);
            }
        }
        Ok(losses)
    }

    /// Predictions for every task the loader has labels for, without gradient
    /// tracking.
    ///
    /// # Errors
    ///
    /// Returns an error if the forward pass or an output function fails.
    pub fn predict(
        &self,
        loader: &MultitaskDataLoader,
    ) -> Result<BTreeMap<String, TaskPredictions>> {
        no_grad(|| -> Result<BTreeMap<String, TaskPredictions>> {
            let active = self.labelled_tasks(&loader.dataset.y_dict, &loader.task_to_label_dict);
            let names: Vec<&str> = active.iter().map(|(t, _)| t.name.as_str()).collect();
            let mut results: BTreeMap<String, TaskPredictions> = names
                .iter()
                .map(|n| ((*n).to_string(), TaskPredictions::default()))
                .collect();
            if active.is_empty() {
                return Ok(results);
            }

            for batch in loader.ordered_batches() {
                let outputs = self.forward(&batch.x_dict, &names)?;
                for (task, key) in &active {
                    let probs = (task.output_func)(&outputs)?;
                    let entry = results
                        .get_mut(&task.name)
                        .ok_or_else(|| RebanarError::missing_key("task", task.name.as_str()))?;
                    entry.preds.extend(probs.argmax_rows());
                    entry
                        .probs
                        .extend(probs.data().chunks(probs.n_cols()).map(<[f32]>::to_vec));
                    entry.golds.extend_from_slice(&batch.y_dict[*key]);
                }
            }

            Ok(results)
        })
    }

    /// Score every task on every loader.
    ///
    /// Keys are `"{task}/{dataset}/{split}/{metric}"`. Tasks a loader has no
    /// labels for, and tasks whose labels are all masked, are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if prediction fails.
    pub fn score<'a, I>(&self, loaders: I) -> Result<BTreeMap<String, f32>>
    where
        I: IntoIterator<Item = &'a MultitaskDataLoader>,
    {
        let mut scores = BTreeMap::new();
        for loader in loaders {
            for (task_name, predictions) in self.predict(loader)? {
                let Some(task) = self.task(&task_name) else {
                    continue;
                };
                let task_scores = task.scorer.score(&predictions.golds, &predictions.preds)?;
                if task_scores.is_empty() {
                    debug!(
                        task = %task_name,
                        split = %loader.split,
                        "no unmasked labels, skipping"
                    );
                }
                for (metric, value) in task_scores {
                    scores.insert(
                        format!(
                            "{task_name}/{}/{}/{metric}",
                            loader.dataset.name, loader.split
                        ),
                        value,
                    );
                }
            }
        }
        Ok(scores)
    }

    /// All parameters keyed by `"{module}.{index}"`.
    #[must_use]
    pub fn state_dict(&self) -> StateDict {
        self.module_pool
            .iter()
            .flat_map(|(name, module)| state_dict(module, name))
            .collect()
    }

    /// Write all parameters to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_state_dict(&self.state_dict(), path.as_ref())?;
        info!(path = %path.as_ref().display(), "saved model parameters");
        Ok(())
    }

    /// Load parameters written by [`MultitaskModel::save`] into this model.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not match the
    /// model's modules and shapes.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let state = load_state_dict(path.as_ref())?;
        for (name, module) in self.module_pool.iter_mut() {
            load_state_dict_into(&mut **module, &state, name)?;
        }
        info!(path = %path.as_ref().display(), "loaded model parameters");
        Ok(())
    }
}

impl std::fmt::Debug for MultitaskModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultitaskModel")
            .field("tasks", &self.task_names())
            .field("modules", &self.module_pool)
            .field("operations", &self.ops.len())
            .finish()
    }
}
