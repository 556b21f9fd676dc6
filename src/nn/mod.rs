//! Neural network modules for multitask training.
//!
//! The nn module is organized around the [`Module`] trait, which defines
//! the interface shared by every entry of a multitask model's module pool:
//!
//! - **Layers**: [`Linear`]
//! - **Activations**: [`ReLU`]
//! - **Containers**: [`Sequential`]
//! - **Losses**: [`CrossEntropyLoss`] with [`IGNORE_INDEX`] masking
//! - **Optimizers**: [`Adam`], [`SGD`]
//! - **Schedulers**: [`ConstantLR`], [`LinearLR`], [`ExponentialLR`]
//! - **Serialization**: JSON state dictionaries in [`serialize`]
//!
//! # Example
//!
//! ```
//! use rebanar::autograd::Tensor;
//! use rebanar::nn::{Linear, Module, ReLU, Sequential};
//!
//! let body = Sequential::new()
//!     .add(Linear::with_seed(2, 10, Some(0)))
//!     .add(ReLU::new());
//!
//! let x = Tensor::zeros(&[4, 2]);
//! assert_eq!(body.forward(&x).shape(), &[4, 10]);
//! assert_eq!(body.features(), Some((2, 10)));
//! ```
//!
//! # References
//!
//! - Paszke, A., et al. (2019). `PyTorch`: An imperative style, high-performance
//!   deep learning library. `NeurIPS`.
//! - Glorot, X., & Bengio, Y. (2010). Understanding the difficulty of training
//!   deep feedforward neural networks. AISTATS.

mod activation;
mod container;
mod init;
mod linear;
pub mod loss;
mod module;
pub mod optim;
pub mod scheduler;
pub mod serialize;

pub use activation::ReLU;
pub use container::Sequential;
pub use init::xavier_uniform;
pub use linear::Linear;
pub use loss::{CrossEntropyLoss, IGNORE_INDEX};
pub use module::Module;
pub use optim::{Adam, Optimizer, SGD};
pub use scheduler::{ConstantLR, ExponentialLR, LRScheduler, LinearLR};
