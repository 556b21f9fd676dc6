//! The `Module` trait shared by every layer in a task's module pool.

use crate::autograd::Tensor;
use crate::error::{RebanarError, Result};

/// Interface for neural network building blocks.
///
/// A module owns its parameters. In a multitask model each module lives
/// exactly once in the model's arena and is addressed by name from every
/// operation that uses it, so parameter updates are shared by all tasks
/// whose flows reference it.
pub trait Module {
    /// Forward pass over a single input tensor.
    fn forward(&self, input: &Tensor) -> Tensor;

    /// Forward pass over the inputs of a task-flow operation.
    ///
    /// The default accepts exactly one input and returns one output;
    /// multi-input modules (the slice combiner) override it.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of inputs is not supported.
    fn forward_many(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        match inputs {
            [input] => Ok(vec![self.forward(input)]),
            _ => Err(RebanarError::dimension_mismatch(
                "module inputs",
                1,
                inputs.len(),
            )),
        }
    }

    /// Trainable parameters, in a stable order.
    fn parameters(&self) -> Vec<&Tensor> {
        Vec::new()
    }

    /// Mutable access to trainable parameters, in the same order as [`Module::parameters`].
    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        Vec::new()
    }

    /// `(in_features, out_features)` for modules with a fixed affine shape.
    ///
    /// Task expansion uses this to size indicator heads and prediction
    /// transforms from the base task's head.
    fn features(&self) -> Option<(usize, usize)> {
        None
    }

    /// Short type name for logging and `Debug` output.
    fn type_name(&self) -> &'static str {
        "Module"
    }
}
