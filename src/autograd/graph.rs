//! Computation graph for automatic differentiation.
//!
//! This module implements the tape-based recording of operations
//! and the backward pass algorithm.

use std::collections::HashMap;
use std::sync::Arc;

use super::grad_fn::GradFn;
use super::tensor::{Tensor, TensorId};

#[derive(Clone)]
pub(crate) struct TapeEntry {
    pub output_id: TensorId,
    pub grad_fn: Arc<dyn GradFn>,
    pub input_ids: Vec<TensorId>,
}

/// Computation graph that records operations for backward pass.
///
/// Operations are recorded in order during the forward pass, then gradients
/// are computed in reverse order during the backward pass. Each thread has
/// its own graph.
pub(crate) struct ComputationGraph {
    tape: Vec<TapeEntry>,
    /// Leaf tensors seen by recorded ops; gradients land on these copies.
    tensors: HashMap<TensorId, Tensor>,
}

impl ComputationGraph {
    /// Create a new empty computation graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tape: Vec::new(),
            tensors: HashMap::new(),
        }
    }

    /// Clear all recorded operations and gradients.
    pub fn clear(&mut self) {
        self.tape.clear();
        self.tensors.clear();
    }

    /// Register a leaf tensor that requires gradients.
    ///
    /// Non-leaf and non-tracking tensors are skipped: their gradients are
    /// only needed transiently during `backward`.
    pub fn register_tensor(&mut self, tensor: &Tensor) {
        if tensor.requires_grad_enabled() && tensor.is_leaf() {
            self.tensors
                .entry(tensor.id())
                .or_insert_with(|| tensor.detach_with_id());
        }
    }

    /// Record an operation to the tape.
    pub fn record(
        &mut self,
        output_id: TensorId,
        grad_fn: Arc<dyn GradFn>,
        input_ids: Vec<TensorId>,
    ) {
        self.tape.push(TapeEntry {
            output_id,
            grad_fn,
            input_ids,
        });
    }

    /// Compute gradients via backpropagation.
    ///
    /// 1. Start with `grad_output` for the output tensor
    /// 2. Iterate through operations in reverse order
    /// 3. For each operation, compute gradients w.r.t. inputs
    /// 4. Accumulate gradients for tensors used multiple times
    pub fn backward(&mut self, output_id: TensorId, grad_output: Tensor) {
        let mut grads: HashMap<TensorId, Tensor> = HashMap::new();
        grads.insert(output_id, grad_output);

        for entry in self.tape.iter().rev() {
            let Some(grad_out) = grads.remove(&entry.output_id) else {
                continue;
            };

            let input_grads = entry.grad_fn.backward(&grad_out);

            for (input_id, input_grad) in entry.input_ids.iter().zip(input_grads) {
                grads
                    .entry(*input_id)
                    .and_modify(|existing| {
                        for (a, b) in existing.data_mut().iter_mut().zip(input_grad.data()) {
                            *a += b;
                        }
                    })
                    .or_insert(input_grad);
            }
        }

        for (id, grad) in grads {
            if let Some(tensor) = self.tensors.get_mut(&id) {
                tensor.accumulate_grad(grad);
            }
        }
    }

    /// Get gradient for a tensor by ID (after backward).
    #[must_use]
    pub fn get_grad(&self, id: TensorId) -> Option<Tensor> {
        self.tensors.get(&id).and_then(|t| t.grad().cloned())
    }

    /// Clear gradient for a specific tensor.
    pub fn clear_grad(&mut self, id: TensorId) {
        if let Some(tensor) = self.tensors.get_mut(&id) {
            tensor.clear_grad();
        }
    }
}

impl Default for ComputationGraph {
    fn default() -> Self {
        Self::new()
    }
}
