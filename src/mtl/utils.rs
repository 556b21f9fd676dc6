//! Op output bookkeeping and the standard loss/output functions.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::task::{InputRef, LossFunc, OutputFunc};
use crate::autograd::Tensor;
use crate::error::{RebanarError, Result};
use crate::nn::CrossEntropyLoss;

/// Outputs of one forward pass: the batch features and every executed op's
/// outputs.
#[derive(Debug, Default)]
pub struct OpOutputs {
    fields: BTreeMap<String, Tensor>,
    ops: HashMap<String, Vec<Tensor>>,
}

impl OpOutputs {
    pub(crate) fn new(fields: BTreeMap<String, Tensor>) -> Self {
        Self {
            fields,
            ops: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, op_name: String, outputs: Vec<Tensor>) {
        self.ops.insert(op_name, outputs);
    }

    /// Output `index` of the named op.
    ///
    /// # Errors
    ///
    /// Returns an error if the op did not run or has no such output.
    pub fn op(&self, name: &str, index: usize) -> Result<&Tensor> {
        self.ops
            .get(name)
            .and_then(|outputs| outputs.get(index))
            .ok_or_else(|| {
                RebanarError::missing_key("op output", format!("{name}:{index}"))
            })
    }

    /// Resolve an operation input.
    ///
    /// # Errors
    ///
    /// Returns an error if the field or op output is absent.
    pub fn resolve(&self, input: &InputRef) -> Result<&Tensor> {
        match input {
            InputRef::Field(name) => self
                .fields
                .get(name)
                .ok_or_else(|| RebanarError::missing_key("input field", name.as_str())),
            InputRef::Op { op, index } => self.op(op, *index),
        }
    }

    #[must_use]
    pub fn contains_op(&self, name: &str) -> bool {
        self.ops.contains_key(name)
    }
}

/// Masked cross-entropy on the first output of `op_name`.
///
/// ```
/// use std::collections::BTreeMap;
///
/// use rebanar::autograd::Tensor;
/// use rebanar::mtl::{ce_loss, softmax, InputRef, ModulePool, MultitaskModel, Operation};
/// use rebanar::mtl::{Scorer, Task, TaskFlow};
/// use rebanar::nn::{Linear, IGNORE_INDEX};
///
/// let pool = ModulePool::new().with("head", Linear::with_seed(2, 2, Some(0)))?;
/// let flow = TaskFlow::new(vec![Operation::new("head", vec![InputRef::field("data")])])?;
/// let scorer = Scorer::new(&["accuracy"])?;
/// let task = Task::new("task", pool, flow, ce_loss("head"), softmax("head"), scorer);
/// let model = MultitaskModel::new(vec![task])?;
///
/// let mut x = BTreeMap::new();
/// x.insert("data".to_string(), Tensor::zeros(&[2, 2]));
/// let outputs = model.forward(&x, &["task"])?;
///
/// // Zero input and zero bias give uniform logits
/// let loss = ce_loss("head")(&outputs, &[1, IGNORE_INDEX])?.expect("one labelled row");
/// assert!((loss.item() - 2.0_f32.ln()).abs() < 1e-6);
/// assert!(ce_loss("head")(&outputs, &[IGNORE_INDEX, IGNORE_INDEX])?.is_none());
/// # Ok::<(), rebanar::RebanarError>(())
/// ```
pub fn ce_loss(op_name: impl Into<String>) -> LossFunc {
    let op_name = op_name.into();
    Arc::new(move |outputs: &OpOutputs, labels: &[i64]| {
        let logits = outputs.op(&op_name, 0)?;
        CrossEntropyLoss::new().forward(logits, labels)
    })
}

/// Row-wise softmax of the first output of `op_name`.
pub fn softmax(op_name: impl Into<String>) -> OutputFunc {
    let op_name = op_name.into();
    Arc::new(move |outputs: &OpOutputs| {
        Ok(outputs.op(&op_name, 0)?.softmax())
    })
}
