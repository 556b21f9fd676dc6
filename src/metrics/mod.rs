//! Evaluation metrics for task heads.
//!
//! Classification metrics (accuracy, precision, recall, F1-score) used by
//! the multitask [`Scorer`](crate::mtl::Scorer).

pub mod classification;

pub use classification::{accuracy, f1_score, precision, recall, Average};
