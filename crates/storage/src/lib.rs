//! Storage Layer
//!
//! Versioned binary artifacts and JSON reports in one directory.

mod artifacts;

pub use artifacts::{ArtifactKind, ArtifactStore, ARTIFACT_MAGIC, FORMAT_VERSION};

use std::path::PathBuf;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Artifact not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Incompatible artifact {}: {reason}", path.display())]
    Incompatible { path: PathBuf, reason: String },
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialization error: {0}")]
    Serialization(String),
}
