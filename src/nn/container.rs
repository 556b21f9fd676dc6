//! Container modules for composing neural networks.

use super::module::Module;
use crate::autograd::Tensor;

/// Sequential container for chaining modules.
///
/// Modules are executed in order, with each module's output
/// becoming the next module's input.
///
/// ```
/// use rebanar::nn::{Linear, Module, ReLU, Sequential};
///
/// let body = Sequential::new()
///     .add(Linear::with_seed(2, 10, Some(0)))
///     .add(ReLU::new());
/// assert_eq!(body.features(), Some((2, 10)));
/// ```
pub struct Sequential {
    modules: Vec<Box<dyn Module>>,
}

impl Sequential {
    /// Create an empty Sequential container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    /// Add a module to the sequence.
    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn add<M: Module + 'static>(mut self, module: M) -> Self {
        self.modules.push(Box::new(module));
        self
    }

    /// Get the number of modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if the container is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl Default for Sequential {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Sequential {
    fn forward(&self, input: &Tensor) -> Tensor {
        self.modules
            .iter()
            .fold(input.clone(), |x, module| module.forward(&x))
    }

    fn parameters(&self) -> Vec<&Tensor> {
        self.modules.iter().flat_map(|m| m.parameters()).collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.modules
            .iter_mut()
            .flat_map(|m| m.parameters_mut())
            .collect()
    }

    fn features(&self) -> Option<(usize, usize)> {
        let (in_features, _) = self.modules.iter().find_map(|m| m.features())?;
        let (_, out_features) = self.modules.iter().rev().find_map(|m| m.features())?;
        Some((in_features, out_features))
    }

    fn type_name(&self) -> &'static str {
        "Sequential"
    }
}

impl std::fmt::Debug for Sequential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.modules.iter().map(|m| m.type_name()).collect();
        f.debug_struct("Sequential")
            .field("modules", &names)
            .finish()
    }
}
