//! Core compute primitives.
//!
//! [`Matrix`] is the container for slice indicator values (examples ×
//! slicing functions).

mod matrix;

pub use matrix::Matrix;
