//! Column-named Table

use crate::FeatureError;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Tabular data with named columns. Missing cells are `NaN`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    columns: Vec<String>,
    values: Array2<f64>,
}

impl Frame {
    /// Create a frame from column names and a row-major matrix
    pub fn new(columns: Vec<String>, values: Array2<f64>) -> Result<Self, FeatureError> {
        if columns.len() != values.ncols() {
            return Err(FeatureError::ShapeMismatch {
                expected: columns.len(),
                actual: values.ncols(),
            });
        }
        let mut seen = HashSet::with_capacity(columns.len());
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(FeatureError::DuplicateColumn(name.clone()));
            }
        }
        Ok(Self { columns, values })
    }

    /// Create a frame from row vectors
    pub fn from_rows(columns: Vec<String>, rows: &[Vec<f64>]) -> Result<Self, FeatureError> {
        let width = columns.len();
        let mut flat = Vec::with_capacity(rows.len() * width);
        for row in rows {
            if row.len() != width {
                return Err(FeatureError::ShapeMismatch {
                    expected: width,
                    actual: row.len(),
                });
            }
            flat.extend_from_slice(row);
        }
        let values = Array2::from_shape_vec((rows.len(), width), flat)
            .map_err(|e| FeatureError::InvalidFrame(e.to_string()))?;
        Self::new(columns, values)
    }

    /// Column names in order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Underlying matrix
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_cols(&self) -> usize {
        self.values.ncols()
    }

    /// Position of a column, if present
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Borrow a column by name
    pub fn column(&self, name: &str) -> Result<ArrayView1<'_, f64>, FeatureError> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| FeatureError::MissingColumn(name.to_string()))?;
        Ok(self.values.column(idx))
    }

    /// Set a column, replacing it if it already exists or appending otherwise
    pub fn set_column(&mut self, name: &str, data: Array1<f64>) -> Result<(), FeatureError> {
        if data.len() != self.n_rows() {
            return Err(FeatureError::ShapeMismatch {
                expected: self.n_rows(),
                actual: data.len(),
            });
        }
        match self.column_index(name) {
            Some(idx) => self.values.column_mut(idx).assign(&data),
            None => {
                self.values
                    .push_column(data.view())
                    .map_err(|e| FeatureError::InvalidFrame(e.to_string()))?;
                self.columns.push(name.to_string());
            }
        }
        Ok(())
    }

    /// Remove a column if present. Returns whether anything was removed.
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        let keep: Vec<usize> = (0..self.n_cols()).filter(|&i| i != idx).collect();
        self.values = self.values.select(Axis(1), &keep);
        self.columns.remove(idx);
        true
    }

    /// New frame holding the given rows, in the given order
    pub fn select_rows(&self, indices: &[usize]) -> Frame {
        Frame {
            columns: self.columns.clone(),
            values: self.values.select(Axis(0), indices),
        }
    }
}
