//! Module parameter serialization.
//!
//! Parameters are stored as a JSON state dictionary keyed by
//! `"{prefix}.{index}"`, where the prefix is the owning module's name in a
//! multitask model's module pool.
//!
//! # Example
//!
//! ```
//! use rebanar::nn::serialize::{load_state_dict_into, state_dict};
//! use rebanar::nn::{Linear, Module};
//!
//! let trained = Linear::with_seed(3, 2, Some(1));
//! let state = state_dict(&trained, "head");
//!
//! let mut fresh = Linear::with_seed(3, 2, Some(2));
//! load_state_dict_into(&mut fresh, &state, "head").expect("shapes match");
//! assert_eq!(fresh.weight().data(), trained.weight().data());
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::module::Module;
use crate::error::{RebanarError, Result};

/// Stored parameter: row-major data plus its shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// State dictionary: mapping from parameter names to tensor data and shapes.
pub type StateDict = BTreeMap<String, SavedTensor>;

fn param_name(prefix: &str, i: usize) -> String {
    if prefix.is_empty() {
        format!("{i}")
    } else {
        format!("{prefix}.{i}")
    }
}

/// Extract state dictionary from a module.
///
/// Returns a mapping of parameter names (by index) to their data and shapes.
pub fn state_dict<M: Module + ?Sized>(module: &M, prefix: &str) -> StateDict {
    module
        .parameters()
        .iter()
        .enumerate()
        .map(|(i, param)| {
            (
                param_name(prefix, i),
                SavedTensor {
                    shape: param.shape().to_vec(),
                    data: param.data().to_vec(),
                },
            )
        })
        .collect()
}

/// Load state dictionary into a module.
///
/// Values are copied into the existing parameter tensors, so their identity
/// on the autograd tape (and any optimizer state keyed on it) is preserved.
///
/// # Errors
///
/// Returns an error if a parameter is missing or its shape differs.
pub fn load_state_dict_into<M: Module + ?Sized>(
    module: &mut M,
    state: &StateDict,
    prefix: &str,
) -> Result<()> {
    for (i, param) in module.parameters_mut().into_iter().enumerate() {
        let name = param_name(prefix, i);
        let saved = state
            .get(&name)
            .ok_or_else(|| RebanarError::missing_key("parameter", name.as_str()))?;

        if param.shape() != saved.shape.as_slice() {
            return Err(RebanarError::DimensionMismatch {
                expected: format!("{name} shape {:?}", param.shape()),
                actual: format!("{:?}", saved.shape),
            });
        }

        param.data_mut().copy_from_slice(&saved.data);
    }

    Ok(())
}

/// Write a state dictionary as JSON.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn save_state_dict<P: AsRef<Path>>(state: &StateDict, path: P) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(writer, state)?;
    Ok(())
}

/// Read a state dictionary written by [`save_state_dict`].
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid state dictionary.
pub fn load_state_dict<P: AsRef<Path>>(path: P) -> Result<StateDict> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{Linear, ReLU, Sequential};

    #[test]
    fn test_state_dict_linear() {
        let layer = Linear::with_seed(10, 5, Some(42));
        let state = state_dict(&layer, "");

        assert_eq!(state.len(), 2);
        assert_eq!(state["0"].shape, vec![5, 10]);
        assert_eq!(state["1"].shape, vec![5]);
    }

    #[test]
    fn test_state_dict_sequential_prefix() {
        let model = Sequential::new()
            .add(Linear::with_seed(2, 4, Some(0)))
            .add(ReLU::new())
            .add(Linear::with_seed(4, 2, Some(1)));
        let state = state_dict(&model, "body");

        assert_eq!(state.len(), 4);
        assert!(state.contains_key("body.3"));
        assert_eq!(state["body.3"].shape, vec![2]);
    }

    #[test]
    fn test_load_preserves_tensor_identity() {
        let source = Linear::with_seed(3, 2, Some(1));
        let mut target = Linear::with_seed(3, 2, Some(2));
        let id_before = target.weight().id();

        load_state_dict_into(&mut target, &state_dict(&source, "m"), "m")
            .expect("same shapes");

        assert_eq!(target.weight().id(), id_before);
        assert_eq!(target.weight().data(), source.weight().data());
    }

    #[test]
    fn test_load_shape_mismatch() {
        let source = Linear::with_seed(3, 2, Some(1));
        let mut target = Linear::with_seed(2, 2, Some(2));
        let result = load_state_dict_into(&mut target, &state_dict(&source, ""), "");
        assert!(matches!(
            result,
            Err(RebanarError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_load_missing_parameter() {
        let mut target = Linear::with_seed(2, 2, Some(2));
        let result = load_state_dict_into(&mut target, &StateDict::new(), "x");
        assert!(matches!(result, Err(RebanarError::MissingKey { .. })));
    }

    #[test]
    fn test_save_load_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("state.json");
        let state = state_dict(&Linear::with_seed(2, 3, Some(9)), "lin");

        save_state_dict(&state, &path).expect("write");
        let loaded = load_state_dict(&path).expect("read");
        assert_eq!(loaded, state);
    }
}
