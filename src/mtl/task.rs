//! Tasks, operations and task flows.
//!
//! A [`Task`] names a prediction problem and describes how to compute it: a
//! [`TaskFlow`] of [`Operation`]s, each applying one module (by name) from a
//! shared module pool to inputs drawn from the batch's feature dictionary or
//! from earlier operations' outputs.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use super::scorer::Scorer;
use super::utils::OpOutputs;
use crate::autograd::Tensor;
use crate::error::{RebanarError, Result};
use crate::nn::Module;

/// Computes a task's loss from the op outputs and the batch's labels.
///
/// Returns `Ok(None)` when every label in the batch is masked.
pub type LossFunc = Arc<dyn Fn(&OpOutputs, &[i64]) -> Result<Option<Tensor>> + Send + Sync>;

/// Computes a task's class probabilities `[batch, classes]` from the op outputs.
pub type OutputFunc = Arc<dyn Fn(&OpOutputs) -> Result<Tensor> + Send + Sync>;

/// Where an operation reads one of its inputs from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InputRef {
    /// A named tensor of the batch's feature dictionary.
    Field(String),
    /// Output `index` of the operation named `op`.
    Op { op: String, index: usize },
}

impl InputRef {
    pub fn field(name: impl Into<String>) -> Self {
        InputRef::Field(name.into())
    }

    pub fn op(name: impl Into<String>, index: usize) -> Self {
        InputRef::Op {
            op: name.into(),
            index,
        }
    }
}

impl fmt::Display for InputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputRef::Field(name) => write!(f, "_input_:{name}"),
            InputRef::Op { op, index } => write!(f, "{op}:{index}"),
        }
    }
}

/// One node of a task flow: run `module_name` on `inputs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    pub module_name: String,
    pub inputs: Vec<InputRef>,
}

impl Operation {
    /// Operation named after its module.
    ///
    /// ```
    /// use rebanar::mtl::{InputRef, Operation};
    ///
    /// let op = Operation::new("linear1A", vec![InputRef::field("coordinates")]);
    /// assert_eq!(op.name, "linear1A");
    /// ```
    pub fn new(module_name: impl Into<String>, inputs: Vec<InputRef>) -> Self {
        let module_name = module_name.into();
        Self {
            name: module_name.clone(),
            module_name,
            inputs,
        }
    }

    /// Operation with a name distinct from its module, for reusing a module
    /// at several points of a graph.
    pub fn named(
        name: impl Into<String>,
        module_name: impl Into<String>,
        inputs: Vec<InputRef>,
    ) -> Self {
        Self {
            name: name.into(),
            module_name: module_name.into(),
            inputs,
        }
    }

    /// Names of the operations this one reads from.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().filter_map(|input| match input {
            InputRef::Op { op, .. } => Some(op.as_str()),
            InputRef::Field(_) => None,
        })
    }
}

/// Topological order of `ops` (Kahn's algorithm).
///
/// Ties are broken by position in `ops`, so an already-ordered list keeps
/// its order.
///
/// # Errors
///
/// Returns an error on duplicate op names, references to unknown ops, or cycles.
pub(crate) fn topological_order(ops: &[Operation]) -> Result<Vec<usize>> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(ops.len());
    for (i, op) in ops.iter().enumerate() {
        if index.insert(op.name.as_str(), i).is_some() {
            return Err(RebanarError::duplicate("operation", op.name.as_str()));
        }
    }

    let mut in_degree = vec![0usize; ops.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); ops.len()];
    for (i, op) in ops.iter().enumerate() {
        for dep in op.dependencies() {
            let &j = index.get(dep).ok_or_else(|| {
                RebanarError::invalid_graph(format!(
                    "operation '{}' reads from unknown operation '{dep}'",
                    op.name
                ))
            })?;
            in_degree[i] += 1;
            dependents[j].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..ops.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(ops.len());
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &k in &dependents[i] {
            in_degree[k] -= 1;
            if in_degree[k] == 0 {
                ready.insert(k);
            }
        }
    }

    if order.len() != ops.len() {
        let stuck: Vec<&str> = (0..ops.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| ops[i].name.as_str())
            .collect();
        return Err(RebanarError::invalid_graph(format!(
            "cycle among operations {stuck:?}"
        )));
    }

    Ok(order)
}

/// A validated DAG of operations with a cached topological order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFlow {
    ops: Vec<Operation>,
    order: Vec<usize>,
}

impl TaskFlow {
    /// Validate `ops` as a DAG.
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate op names, unresolved references, or cycles.
    pub fn new(ops: Vec<Operation>) -> Result<Self> {
        if ops.is_empty() {
            return Err(RebanarError::invalid_graph("task flow has no operations"));
        }
        let order = topological_order(&ops)?;
        Ok(Self { ops, order })
    }

    /// Operations in declaration order.
    #[must_use]
    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    /// Operations in execution order.
    pub fn topological(&self) -> impl Iterator<Item = &Operation> {
        self.order.iter().map(|&i| &self.ops[i])
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.ops.iter().find(|op| op.name == name)
    }

    /// Operations no other operation reads from.
    #[must_use]
    pub fn sinks(&self) -> Vec<&Operation> {
        let consumed: HashSet<&str> = self.ops.iter().flat_map(Operation::dependencies).collect();
        self.ops
            .iter()
            .filter(|op| !consumed.contains(op.name.as_str()))
            .collect()
    }

    #[must_use]
    pub fn into_ops(self) -> Vec<Operation> {
        self.ops
    }
}

/// Owned modules keyed by name, in insertion order.
#[derive(Default)]
pub struct ModulePool {
    modules: Vec<(String, Box<dyn Module>)>,
}

impl ModulePool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module.
    ///
    /// # Errors
    ///
    /// Returns an error if a module with this name is already in the pool.
    pub fn insert<M>(&mut self, name: impl Into<String>, module: M) -> Result<()>
    where
        M: Module + 'static,
    {
        self.insert_boxed(name.into(), Box::new(module))
    }

    /// Builder form of [`ModulePool::insert`].
    ///
    /// # Errors
    ///
    /// Returns an error if a module with this name is already in the pool.
    pub fn with<M>(mut self, name: impl Into<String>, module: M) -> Result<Self>
    where
        M: Module + 'static,
    {
        self.insert(name, module)?;
        Ok(self)
    }

    pub(crate) fn insert_boxed(&mut self, name: String, module: Box<dyn Module>) -> Result<()> {
        if self.contains(&name) {
            return Err(RebanarError::duplicate("module", name));
        }
        self.modules.push((name, module));
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.modules.iter().any(|(n, _)| n == name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn Module> {
        self.modules
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, m)| m.as_ref())
    }

    /// Take a module out of the pool.
    pub fn remove(&mut self, name: &str) -> Option<Box<dyn Module>> {
        let pos = self.modules.iter().position(|(n, _)| n == name)?;
        Some(self.modules.remove(pos).1)
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.modules.iter().map(|(n, _)| n.as_str()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn Module)> {
        self.modules.iter().map(|(n, m)| (n.as_str(), m.as_ref()))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Box<dyn Module>)> {
        self.modules.iter_mut().map(|(n, m)| (n.as_str(), m))
    }
}

impl IntoIterator for ModulePool {
    type Item = (String, Box<dyn Module>);
    type IntoIter = std::vec::IntoIter<(String, Box<dyn Module>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.modules.into_iter()
    }
}

impl fmt::Debug for ModulePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.modules.iter().map(|(n, m)| (n, m.type_name())))
            .finish()
    }
}

/// A named prediction problem over a task flow.
///
/// The task's pool holds the modules it contributes; its flow may also use
/// modules contributed by sibling tasks, resolved by name when the tasks are
/// assembled into a [`MultitaskModel`](super::MultitaskModel).
pub struct Task {
    pub name: String,
    pub module_pool: ModulePool,
    pub task_flow: TaskFlow,
    pub loss_func: LossFunc,
    pub output_func: OutputFunc,
    pub scorer: Scorer,
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        module_pool: ModulePool,
        task_flow: TaskFlow,
        loss_func: LossFunc,
        output_func: OutputFunc,
        scorer: Scorer,
    ) -> Self {
        Self {
            name: name.into(),
            module_pool,
            task_flow,
            loss_func,
            output_func,
            scorer,
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("module_pool", &self.module_pool)
            .field("task_flow", &self.task_flow)
            .field("scorer", &self.scorer)
            .finish_non_exhaustive()
    }
}
