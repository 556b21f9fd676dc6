//! Evaluating slicing functions over a data frame.

use std::collections::HashSet;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use super::sf::SlicingFunction;
use crate::data::DataFrame;
use crate::error::{RebanarError, Result};
use crate::primitives::Matrix;

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";

/// Applies an ordered set of slicing functions to every row of a frame.
///
/// # Example
///
/// ```
/// use rebanar::data::DataFrame;
/// use rebanar::slicing::{SFApplier, SlicingFunction};
///
/// let df = DataFrame::new(vec![
///     ("x1".to_string(), vec![-0.5, 0.3, 0.8]),
///     ("x2".to_string(), vec![0.0, 0.0, 0.5]),
/// ])?;
/// let applier = SFApplier::new(vec![
///     SlicingFunction::new("f", |x| Ok(i64::from(x.get("x1")? < 0.25))),
///     SlicingFunction::new("g", |x| Ok(i64::from(x.get("x2")? > 0.25))),
/// ])?;
/// let s = applier.apply(&df)?;
/// assert_eq!(s.shape(), (3, 2));
/// assert_eq!(s.row(2), &[0, 1]);
/// # Ok::<(), rebanar::RebanarError>(())
/// ```
#[derive(Debug, Clone)]
pub struct SFApplier {
    sfs: Vec<SlicingFunction>,
    progress_bar: bool,
}

impl SFApplier {
    /// # Errors
    ///
    /// Returns an error if two slicing functions share a name.
    pub fn new(sfs: Vec<SlicingFunction>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(sfs.len());
        for sf in &sfs {
            if !seen.insert(sf.name()) {
                return Err(RebanarError::duplicate("slicing function", sf.name()));
            }
        }
        Ok(Self {
            sfs,
            progress_bar: false,
        })
    }

    /// Show a progress bar over rows while applying.
    #[must_use]
    pub fn with_progress_bar(mut self, enabled: bool) -> Self {
        self.progress_bar = enabled;
        self
    }

    /// Names of the slicing functions, in column order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.sfs.iter().map(SlicingFunction::name).collect()
    }

    /// Indicator matrix `[n_rows, n_sfs]`; column `j` holds slicing function `j`.
    ///
    /// # Errors
    ///
    /// Returns the first failure, naming the slicing function and row. No
    /// partial matrix is produced.
    pub fn apply(&self, df: &DataFrame) -> Result<Matrix<i64>> {
        let n_rows = df.n_rows();
        let pb = self.progress(n_rows);
        let mut data = Vec::with_capacity(n_rows * self.sfs.len());

        for x in df.rows() {
            for sf in &self.sfs {
                let value = sf.call(&x).map_err(|e| RebanarError::SlicingFunction {
                    name: sf.name().to_string(),
                    row: x.index(),
                    message: e.to_string(),
                })?;
                data.push(value);
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        debug!(
            rows = n_rows,
            slicing_functions = self.sfs.len(),
            "applied slicing functions"
        );
        Matrix::from_vec(n_rows, self.sfs.len(), data)
            .map_err(RebanarError::from)
    }

    fn progress(&self, n_rows: usize) -> ProgressBar {
        if !self.progress_bar {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(n_rows as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(PROGRESS_TEMPLATE) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}
