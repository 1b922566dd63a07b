//! Column Preprocessor
//!
//! Numeric columns: median imputation then standard scaling.
//! Categorical columns: most-frequent imputation then one-hot expansion.
//! Columns outside both groups pass through unchanged.
//!
//! Fitting consumes the column layout and yields a [`FittedPreprocessor`];
//! only the fitted form can transform, so fit happens once per model.

use crate::schema;
use crate::statistics::{distinct_sorted, median, most_frequent, ColumnStatistics};
use crate::{FeatureError, Frame};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// Unfitted preprocessor: the two declared column groups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnPreprocessor {
    numeric: Vec<String>,
    categorical: Vec<String>,
}

impl Default for ColumnPreprocessor {
    fn default() -> Self {
        Self::new(schema::numeric_columns(), schema::categorical_columns())
    }
}

/// Fit-time state of one numeric column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct NumericColumn {
    name: String,
    fill: f64,
    mean: f64,
    scale: f64,
}

/// Fit-time state of one categorical column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CategoricalColumn {
    name: String,
    fill: f64,
    categories: Vec<f64>,
}

impl CategoricalColumn {
    fn position(&self, value: f64) -> Option<usize> {
        self.categories
            .binary_search_by(|c| c.total_cmp(&value))
            .ok()
    }
}

/// Preprocessor with frozen imputation values, scaling and vocabularies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPreprocessor {
    numeric: Vec<NumericColumn>,
    categorical: Vec<CategoricalColumn>,
    passthrough: Vec<String>,
    width: usize,
}

impl ColumnPreprocessor {
    /// Create a preprocessor over explicit column groups
    pub fn new(numeric: Vec<String>, categorical: Vec<String>) -> Self {
        Self {
            numeric,
            categorical,
        }
    }

    pub fn numeric_columns(&self) -> &[String] {
        &self.numeric
    }

    pub fn categorical_columns(&self) -> &[String] {
        &self.categorical
    }

    /// Learn imputation values, scaling statistics and vocabularies from `frame`
    pub fn fit(&self, frame: &Frame) -> Result<FittedPreprocessor, FeatureError> {
        if frame.n_rows() == 0 {
            return Err(FeatureError::EmptyFrame);
        }

        let mut numeric = Vec::with_capacity(self.numeric.len());
        for name in &self.numeric {
            let column = frame.column(name)?;
            let fill = median(column.iter()).unwrap_or(0.0);
            let imputed: Vec<f64> = column
                .iter()
                .map(|&v| if v.is_nan() { fill } else { v })
                .collect();
            let stats = ColumnStatistics::compute(&imputed);
            let scale = if stats.std_dev > 0.0 { stats.std_dev } else { 1.0 };
            numeric.push(NumericColumn {
                name: name.clone(),
                fill,
                mean: stats.mean,
                scale,
            });
        }

        let mut categorical = Vec::with_capacity(self.categorical.len());
        for name in &self.categorical {
            let column = frame.column(name)?;
            let fill = most_frequent(column.iter()).unwrap_or(0.0);
            let imputed: Vec<f64> = column
                .iter()
                .map(|&v| if v.is_nan() { fill } else { v })
                .collect();
            categorical.push(CategoricalColumn {
                name: name.clone(),
                fill,
                categories: distinct_sorted(&imputed),
            });
        }

        let declared: HashSet<&str> = self
            .numeric
            .iter()
            .chain(self.categorical.iter())
            .map(String::as_str)
            .collect();
        let passthrough: Vec<String> = frame
            .columns()
            .iter()
            .filter(|c| !declared.contains(c.as_str()))
            .cloned()
            .collect();

        let width = numeric.len()
            + categorical.iter().map(|c| c.categories.len()).sum::<usize>()
            + passthrough.len();

        info!(
            "Fitted preprocessor: {} numeric, {} categorical, {} passthrough -> {} features",
            numeric.len(),
            categorical.len(),
            passthrough.len(),
            width
        );

        Ok(FittedPreprocessor {
            numeric,
            categorical,
            passthrough,
            width,
        })
    }
}

impl FittedPreprocessor {
    /// Width of every encoded row
    pub fn output_width(&self) -> usize {
        self.width
    }

    /// Output column names in encoded order
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.width);
        names.extend(self.numeric.iter().map(|c| format!("num__{}", c.name)));
        for column in &self.categorical {
            names.extend(
                column
                    .categories
                    .iter()
                    .map(|v| format!("cat__{}_{}", column.name, v)),
            );
        }
        names.extend(self.passthrough.iter().map(|c| format!("remainder__{c}")));
        names
    }

    /// Encode `frame` into a dense matrix of [`output_width`](Self::output_width) columns
    pub fn transform(&self, frame: &Frame) -> Result<Array2<f64>, FeatureError> {
        let mut out = Array2::<f64>::zeros((frame.n_rows(), self.width));
        let mut offset = 0;

        for column in &self.numeric {
            let source = frame.column(&column.name)?;
            for (row, &v) in source.iter().enumerate() {
                let v = if v.is_nan() { column.fill } else { v };
                out[[row, offset]] = (v - column.mean) / column.scale;
            }
            offset += 1;
        }

        for column in &self.categorical {
            let source = frame.column(&column.name)?;
            for (row, &v) in source.iter().enumerate() {
                let v = if v.is_nan() { column.fill } else { v };
                // Unknown categories leave the block at zero
                if let Some(pos) = column.position(v) {
                    out[[row, offset + pos]] = 1.0;
                }
            }
            offset += column.categories.len();
        }

        for name in &self.passthrough {
            let source = frame.column(name)?;
            out.column_mut(offset).assign(&source);
            offset += 1;
        }

        debug!("Encoded {} rows into {} features", frame.n_rows(), self.width);
        Ok(out)
    }
}
