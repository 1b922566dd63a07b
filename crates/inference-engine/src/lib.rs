//! Inference Engine
//!
//! The fitted three-stage model pipeline, label encoding, and the
//! prediction service that serves single student records.

mod label;
mod pipeline;
mod service;

pub use label::LabelEncoder;
pub use pipeline::{ModelPipeline, Pipeline};
pub use service::{Prediction, PredictionService};

use classifiers::ClassifierError;
use data_validator::ValidationError;
use feature_engine::FeatureError;
use thiserror::Error;

/// Errors while fitting or applying a pipeline
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("Feature stage failed: {0}")]
    Feature(#[from] FeatureError),
    #[error("Classifier stage failed: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("Non-finite value in feature {feature} (row {row})")]
    NonFiniteFeature { feature: String, row: usize },
    #[error("Unknown label: {0}")]
    UnknownLabel(String),
    #[error("Unknown class code: {0}")]
    UnknownClassCode(usize),
}

/// Errors during prediction
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    #[error("Model not loaded: {0}")]
    NotLoaded(String),
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("Prediction failed: {0}")]
    Pipeline(#[from] PipelineError),
}
