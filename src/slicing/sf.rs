//! Slicing functions.

use std::fmt;
use std::sync::Arc;

use crate::data::DataPoint;
use crate::error::Result;

/// Body of a slicing function.
pub type SliceFn = Arc<dyn Fn(&DataPoint<'_>) -> Result<i64> + Send + Sync>;

/// A named predicate over examples.
///
/// Returns `0` for examples outside the slice and a positive value for
/// examples inside it.
///
/// ```
/// use rebanar::data::DataFrame;
/// use rebanar::slicing::SlicingFunction;
///
/// let sf = SlicingFunction::new("positive_x", |x| Ok(i64::from(x.get("x")? > 0.0)));
/// let df = DataFrame::new(vec![("x".to_string(), vec![-1.0, 2.0])]).expect("one column");
/// assert_eq!(sf.call(&df.row(1).expect("row exists")).expect("field exists"), 1);
/// ```
#[derive(Clone)]
pub struct SlicingFunction {
    name: String,
    f: SliceFn,
}

impl SlicingFunction {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&DataPoint<'_>) -> Result<i64> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate on one example.
    ///
    /// # Errors
    ///
    /// Propagates the function's own error.
    pub fn call(&self, x: &DataPoint<'_>) -> Result<i64> {
        (self.f)(x)
    }
}

impl fmt::Debug for SlicingFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlicingFunction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
