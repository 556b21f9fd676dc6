//! `DataFrame` module for named column containers.
//!
//! Provides a minimal `DataFrame` for the slicing workflow: named `f32`
//! columns, borrowed row views handed to slicing functions, and row
//! filtering for slice extraction.

use crate::autograd::Tensor;
use crate::error::{RebanarError, Result};

/// A minimal `DataFrame` with named columns.
///
/// # Examples
///
/// ```
/// use rebanar::data::DataFrame;
///
/// let df = DataFrame::new(vec![
///     ("x1".to_string(), vec![1.0, 2.0, 3.0]),
///     ("x2".to_string(), vec![4.0, 5.0, 6.0]),
/// ])
/// .expect("DataFrame creation should succeed with valid columns");
/// assert_eq!(df.shape(), (3, 2));
/// assert_eq!(df.row(1).expect("row exists").get("x2").expect("column exists"), 5.0);
/// ```
#[derive(Debug, Clone)]
pub struct DataFrame {
    columns: Vec<(String, Vec<f32>)>,
    n_rows: usize,
}

impl DataFrame {
    /// Creates a new `DataFrame` from named columns.
    ///
    /// # Errors
    ///
    /// Returns an error if columns have different lengths, a name is empty
    /// or duplicated, or no columns are given.
    pub fn new(columns: Vec<(String, Vec<f32>)>) -> Result<Self> {
        if columns.is_empty() {
            return Err("DataFrame must have at least one column".into());
        }

        let n_rows = columns[0].1.len();

        for (name, col) in &columns {
            if col.len() != n_rows {
                return Err(RebanarError::dimension_mismatch(
                    &format!("column '{name}' length"),
                    n_rows,
                    col.len(),
                ));
            }
            if name.is_empty() {
                return Err("Column names cannot be empty".into());
            }
        }

        let mut names: Vec<&str> = columns.iter().map(|(n, _)| n.as_str()).collect();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(RebanarError::duplicate("column", pair[0]));
        }

        Ok(Self { columns, n_rows })
    }

    /// Returns the shape as (`n_rows`, `n_cols`).
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.columns.len())
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// Returns the column names.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Returns a column by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the column doesn't exist.
    pub fn column(&self, name: &str) -> Result<&[f32]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
            .ok_or_else(|| RebanarError::missing_key("column", name))
    }

    /// Selects multiple columns by name, returning a new `DataFrame`.
    ///
    /// # Errors
    ///
    /// Returns an error if any column doesn't exist.
    pub fn select(&self, names: &[&str]) -> Result<Self> {
        if names.is_empty() {
            return Err("Must select at least one column".into());
        }

        let selected = names
            .iter()
            .map(|&name| Ok((name.to_string(), self.column(name)?.to_vec())))
            .collect::<Result<Vec<_>>>()?;

        Self::new(selected)
    }

    /// Returns a borrowed view of one row.
    ///
    /// # Errors
    ///
    /// Returns an error if the index is out of bounds.
    pub fn row(&self, idx: usize) -> Result<DataPoint<'_>> {
        if idx >= self.n_rows {
            return Err(RebanarError::Other(format!(
                "Row index {idx} out of bounds for {} rows",
                self.n_rows
            )));
        }
        Ok(DataPoint { frame: self, idx })
    }

    /// Iterates over all rows in order.
    pub fn rows(&self) -> impl Iterator<Item = DataPoint<'_>> {
        (0..self.n_rows)
            .map(move |idx| DataPoint { frame: self, idx })
    }

    /// Keeps only the given rows, in the given order.
    ///
    /// # Errors
    ///
    /// Returns an error if any index is out of bounds.
    pub fn filter_rows(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.n_rows) {
            return Err(RebanarError::Other(format!(
                "Row index {bad} out of bounds for {} rows",
                self.n_rows
            )));
        }

        let columns = self
            .columns
            .iter()
            .map(|(name, col)| {
                (name.clone(), indices.iter().map(|&i| col[i]).collect())
            })
            .collect();

        Ok(Self {
            columns,
            n_rows: indices.len(),
        })
    }

    /// Stacks the named columns into a `[n_rows, names.len()]` feature tensor.
    ///
    /// # Errors
    ///
    /// Returns an error if any column doesn't exist.
    pub fn to_tensor(&self, names: &[&str]) -> Result<Tensor> {
        let cols = names
            .iter()
            .map(|&name| self.column(name))
            .collect::<Result<Vec<_>>>()?;

        let mut data = Vec::with_capacity(self.n_rows * cols.len());
        for row_idx in 0..self.n_rows {
            data.extend(cols.iter().map(|col| col[row_idx]));
        }

        Ok(Tensor::from_vec(data, &[self.n_rows, cols.len()]))
    }

    /// Adds a new column to the `DataFrame`.
    ///
    /// # Errors
    ///
    /// Returns an error if column length doesn't match or name already exists.
    pub fn add_column(&mut self, name: String, data: Vec<f32>) -> Result<()> {
        if data.len() != self.n_rows {
            return Err(RebanarError::dimension_mismatch(
                "new column length",
                self.n_rows,
                data.len(),
            ));
        }

        if self.columns.iter().any(|(n, _)| n == &name) {
            return Err(RebanarError::duplicate("column", name));
        }

        if name.is_empty() {
            return Err("Column name cannot be empty".into());
        }

        self.columns.push((name, data));
        Ok(())
    }
}

/// Borrowed view of one example (row) of a [`DataFrame`].
///
/// This is what slicing functions receive.
#[derive(Debug, Clone, Copy)]
pub struct DataPoint<'a> {
    frame: &'a DataFrame,
    idx: usize,
}

impl DataPoint<'_> {
    /// Row index within the originating frame.
    #[must_use]
    pub fn index(&self) -> usize {
        self.idx
    }

    /// Value of the named field.
    ///
    /// # Errors
    ///
    /// Returns an error if the field doesn't exist.
    pub fn get(&self, field: &str) -> Result<f32> {
        Ok(self.frame.column(field)?[self.idx])
    }
}
