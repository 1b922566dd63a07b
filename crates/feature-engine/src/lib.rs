//! Feature Engineering Engine
//!
//! Column schema, the stateless academic feature engineer, and the
//! imputation/scaling/one-hot column preprocessor.

mod features;
mod frame;
mod preprocessor;
pub mod schema;
mod statistics;

pub use features::{FeatureEngineer, ENGINEERED_DIMENSION};
pub use frame::Frame;
pub use preprocessor::{ColumnPreprocessor, FittedPreprocessor};
pub use statistics::{distinct_sorted, median, most_frequent, ColumnStatistics};

use thiserror::Error;

/// Errors during feature derivation and preprocessing
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FeatureError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),
    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),
    #[error("Shape mismatch: expected {expected} values, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("Cannot fit on an empty frame")]
    EmptyFrame,
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}
