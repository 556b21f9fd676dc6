//! Error types for rebanar operations.
//!
//! Every contract violation in the slicing workflow (mismatched row counts,
//! duplicate task names, unresolvable operation references) surfaces as a
//! [`RebanarError`] returned immediately to the caller.

use std::fmt;

/// Main error type for rebanar operations.
///
/// # Examples
///
/// ```
/// use rebanar::error::RebanarError;
///
/// let err = RebanarError::DimensionMismatch {
///     expected: "rows=100".to_string(),
///     actual: "50".to_string(),
/// };
/// assert!(err.to_string().contains("dimension mismatch"));
/// ```
#[derive(Debug)]
pub enum RebanarError {
    /// Row/column counts of two collaborating structures disagree.
    DimensionMismatch {
        /// Expected dimensions description
        expected: String,
        /// Actual dimensions found
        actual: String,
    },

    /// A name that must be unique was declared twice.
    DuplicateName {
        /// What kind of thing was duplicated (task, op, slicing function, ...)
        kind: &'static str,
        /// The duplicated name
        name: String,
    },

    /// A referenced key (label key, module, op, feature) does not exist.
    MissingKey {
        /// What kind of key was looked up
        kind: &'static str,
        /// The missing key
        key: String,
    },

    /// A slice name that collides with a reserved name or is malformed.
    InvalidSliceName {
        /// The offending slice name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// A task flow or merged model graph is not a valid DAG.
    InvalidGraph {
        /// Description of the structural problem
        message: String,
    },

    /// A slicing function failed on a row.
    SlicingFunction {
        /// Name of the slicing function
        name: String,
        /// Row index where it failed
        row: usize,
        /// Underlying failure message
        message: String,
    },

    /// Invalid hyperparameter value provided.
    InvalidHyperparameter {
        /// Parameter name
        param: String,
        /// Provided value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// I/O error (file not found, permission denied, etc.).
    Io(std::io::Error),

    /// Serialization/deserialization error.
    Serialization(String),

    /// Generic error with string message.
    Other(String),
}

impl fmt::Display for RebanarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebanarError::DimensionMismatch { expected, actual } => {
                write!(
                    f,
                    "Shape dimension mismatch: expected {expected}, got {actual}"
                )
            }
            RebanarError::DuplicateName { kind, name } => {
                write!(f, "Duplicate {kind} name: {name}")
            }
            RebanarError::MissingKey { kind, key } => {
                write!(f, "Missing {kind}: {key}")
            }
            RebanarError::InvalidSliceName { name, reason } => {
                write!(f, "Invalid slice name '{name}': {reason}")
            }
            RebanarError::InvalidGraph { message } => {
                write!(f, "Invalid task graph: {message}")
            }
            RebanarError::SlicingFunction { name, row, message } => {
                write!(
                    f,
                    "Slicing function '{name}' failed on row {row}: {message}"
                )
            }
            RebanarError::InvalidHyperparameter {
                param,
                value,
                constraint,
            } => {
                write!(
                    f,
                    "Invalid hyperparameter: {param} = {value}, expected {constraint}"
                )
            }
            RebanarError::Io(e) => write!(f, "I/O error: {e}"),
            RebanarError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            RebanarError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for RebanarError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RebanarError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RebanarError {
    fn from(err: std::io::Error) -> Self {
        RebanarError::Io(err)
    }
}

impl From<serde_json::Error> for RebanarError {
    fn from(err: serde_json::Error) -> Self {
        RebanarError::Serialization(err.to_string())
    }
}

impl From<&str> for RebanarError {
    fn from(msg: &str) -> Self {
        RebanarError::Other(msg.to_string())
    }
}

impl From<String> for RebanarError {
    fn from(msg: String) -> Self {
        RebanarError::Other(msg)
    }
}

impl RebanarError {
    /// Create a dimension mismatch error with descriptive context
    #[must_use]
    pub fn dimension_mismatch(context: &str, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            expected: format!("{context}={expected}"),
            actual: format!("{actual}"),
        }
    }

    /// Create a missing-key error
    #[must_use]
    pub fn missing_key(kind: &'static str, key: impl Into<String>) -> Self {
        Self::MissingKey {
            kind,
            key: key.into(),
        }
    }

    /// Create a duplicate-name error
    #[must_use]
    pub fn duplicate(kind: &'static str, name: impl Into<String>) -> Self {
        Self::DuplicateName {
            kind,
            name: name.into(),
        }
    }

    /// Create an invalid-graph error
    #[must_use]
    pub fn invalid_graph(message: impl Into<String>) -> Self {
        Self::InvalidGraph {
            message: message.into(),
        }
    }
}

/// Convenience type alias for Results.
pub type Result<T> = std::result::Result<T, RebanarError>;
