//! Training Pipeline
//!
//! Configuration, CSV loading, the stratified split, evaluation, the
//! model-selection loop and randomized hyperparameter search. The `train`
//! and `tune` binaries are thin wrappers around [`run_training`] and
//! [`run_tuning`].

pub mod config;
pub mod dataset;
pub mod evaluation;
pub mod search;
pub mod selection;

pub use crate::config::{TestSize, TrainingConfig};
pub use dataset::{Dataset, EncodedSplit, Split};
pub use evaluation::{evaluate, ClassificationReport, MetricsRecord, Scoring};
pub use search::{RandomizedSearch, TuningOutcome, TuningReport};
pub use selection::{select_best, Candidate, Selection, TrainingSummary};

use classifiers::{ClassifierError, ModelFamily};
use feature_engine::FeatureError;
use inference_engine::PipelineError;
use std::path::{Path, PathBuf};
use storage::{ArtifactStore, StorageError};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Training errors
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Invalid value {value:?} in column {column} at line {line}")]
    Data {
        line: u64,
        column: String,
        value: String,
    },
    #[error("Training data has no Target column")]
    MissingTarget,
    #[error("Training data has no rows")]
    EmptyDataset,
    #[error("Invalid split: {0}")]
    InvalidSplit(String),
    #[error("Invalid search: {0}")]
    InvalidSearch(String),
    #[error("No param_grid configured for {0}")]
    MissingGrid(String),
    #[error("Feature error: {0}")]
    Feature(#[from] FeatureError),
    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("No candidate model trained successfully")]
    NoSuccessfulCandidate,
}

/// Load, split and encode the training CSV
pub fn prepare(config: &TrainingConfig, data: &Path) -> Result<EncodedSplit, TrainingError> {
    let dataset = Dataset::load_csv(data)?;
    let split = dataset.stratified_split(
        config.data_split.test_size,
        config.data_split.random_state,
    )?;
    split.encode()
}

/// Train every family and persist the most accurate pipeline
pub fn run_training(
    config: &TrainingConfig,
    data: &Path,
    artifacts: &Path,
) -> Result<Selection, TrainingError> {
    let split = prepare(config, data)?;
    let candidates = selection::candidates(config)?;
    let store = ArtifactStore::new(artifacts);
    let selection = select_best(&candidates, &split, &store)?;
    info!("Training complete");
    Ok(selection)
}

/// Tune one family and persist the refitted pipeline
pub fn run_tuning(
    config: &TrainingConfig,
    family: ModelFamily,
    data: &Path,
    artifacts: &Path,
) -> Result<TuningOutcome, TrainingError> {
    let split = prepare(config, data)?;
    let store = ArtifactStore::new(artifacts);
    search::tune(config, family, &split, &store)
}

/// Install the global subscriber: `RUST_LOG` filter (default `info`),
/// plain or JSON lines
pub fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    // a second call keeps the first subscriber
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
