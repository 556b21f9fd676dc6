//! Rebanar: slice-aware multitask learning in pure Rust.
//!
//! Rebanar trains models that pay extra attention to user-defined subsets
//! of the data. Slicing functions mark the subsets (slices); each slice gets
//! its own membership and prediction heads on a shared body, and a combiner
//! learns to mix the slice representations per example.
//!
//! # Quick Start
//!
//! ```
//! use rebanar::prelude::*;
//!
//! let df = DataFrame::new(vec![
//!     ("x1".to_string(), vec![-0.5, 0.1, 0.7, 0.9]),
//!     ("x2".to_string(), vec![0.3, -0.2, 0.1, 0.6]),
//! ])?;
//!
//! let sfs = vec![
//!     SlicingFunction::new("f", |x| Ok(i64::from(x.get("x1")? < 0.25))),
//!     SlicingFunction::new("g", |x| Ok(i64::from(x.get("x2")? > 0.5))),
//! ];
//! let s = SFApplier::new(sfs)?.apply(&df)?;
//! assert_eq!(s.shape(), (4, 2));
//! assert_eq!(s.column(0), vec![1, 1, 0, 0]);
//! # Ok::<(), rebanar::RebanarError>(())
//! ```
//!
//! # Modules
//!
//! - [`autograd`]: Tape-based reverse-mode automatic differentiation
//! - [`nn`]: Layers, masked cross-entropy, optimizers and schedulers
//! - [`data`]: DataFrame with named columns and row views
//! - [`primitives`]: Row-major `Matrix` (slice indicator matrices)
//! - [`metrics`]: Classification metrics
//! - [`mtl`]: Multitask tasks, model, data loaders, scorer and trainer
//! - [`slicing`]: Slicing functions, label injection and slice task expansion

pub mod autograd;
pub mod data;
pub mod error;
pub mod metrics;
pub mod mtl;
pub mod nn;
pub mod prelude;
pub mod primitives;
pub mod slicing;

pub use error::{RebanarError, Result};
pub use primitives::Matrix;
