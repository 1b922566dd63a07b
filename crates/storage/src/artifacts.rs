//! Artifact Store
//!
//! Binary artifacts are postcard payloads wrapped in a small envelope that
//! records what they are and which format wrote them. Reports are pretty
//! JSON. Every write lands in a temp file first and is renamed into place,
//! so readers never see a half-written artifact.

use crate::StorageError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Leading bytes of every binary artifact
pub const ARTIFACT_MAGIC: [u8; 4] = *b"SRPA";

/// Bumped whenever a persisted payload changes shape
pub const FORMAT_VERSION: u16 = 1;

/// Kinds of binary artifact, each with a fixed file name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
    Pipeline,
    LabelEncoder,
}

impl ArtifactKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::Pipeline => "pipeline.bin",
            ArtifactKind::LabelEncoder => "label_encoder.bin",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    magic: [u8; 4],
    format_version: u16,
    kind: ArtifactKind,
    payload: Vec<u8>,
}

/// Directory-backed store for model artifacts and JSON reports
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Store rooted at `root`; the directory is created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, kind: ArtifactKind) -> PathBuf {
        self.root.join(kind.file_name())
    }

    pub fn exists(&self, kind: ArtifactKind) -> bool {
        self.path_of(kind).is_file()
    }

    /// Serialize `value` into an enveloped binary artifact
    pub fn save<T: Serialize>(&self, kind: ArtifactKind, value: &T) -> Result<PathBuf, StorageError> {
        let payload = postcard::to_allocvec(value)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let envelope = Envelope {
            magic: ARTIFACT_MAGIC,
            format_version: FORMAT_VERSION,
            kind,
            payload,
        };
        let bytes = postcard::to_allocvec(&envelope)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let path = self.path_of(kind);
        self.write_atomic(&path, &bytes)?;
        info!("Saved {:?} artifact ({} bytes) to {}", kind, bytes.len(), path.display());
        Ok(path)
    }

    /// Load an enveloped artifact, checking magic, version and kind
    pub fn load<T: DeserializeOwned>(&self, kind: ArtifactKind) -> Result<T, StorageError> {
        let path = self.path_of(kind);
        let bytes = self.read(&path)?;

        let envelope: Envelope = postcard::from_bytes(&bytes).map_err(|e| {
            StorageError::Incompatible {
                path: path.clone(),
                reason: format!("unreadable envelope: {}", e),
            }
        })?;
        if envelope.magic != ARTIFACT_MAGIC {
            return Err(StorageError::Incompatible {
                path,
                reason: "bad magic bytes".to_string(),
            });
        }
        if envelope.format_version != FORMAT_VERSION {
            return Err(StorageError::Incompatible {
                path,
                reason: format!(
                    "format version {} (expected {})",
                    envelope.format_version, FORMAT_VERSION
                ),
            });
        }
        if envelope.kind != kind {
            return Err(StorageError::Incompatible {
                path,
                reason: format!("holds {:?}, expected {:?}", envelope.kind, kind),
            });
        }

        let value = postcard::from_bytes(&envelope.payload).map_err(|e| {
            StorageError::Incompatible {
                path: path.clone(),
                reason: format!("payload does not decode: {}", e),
            }
        })?;
        debug!("Loaded {:?} artifact from {}", kind, path.display());
        Ok(value)
    }

    /// Write a pretty JSON report under `name`
    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf, StorageError> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let path = self.root.join(name);
        self.write_atomic(&path, &bytes)?;
        debug!("Wrote report {}", path.display());
        Ok(path)
    }

    pub fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<T, StorageError> {
        let path = self.root.join(name);
        let bytes = self.read(&path)?;
        serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(path.to_path_buf()),
            _ => StorageError::Io {
                path: path.to_path_buf(),
                source: e,
            },
        })
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        };
        fs::create_dir_all(&self.root).map_err(io_err)?;
        let mut file = NamedTempFile::new_in(&self.root).map_err(io_err)?;
        file.write_all(bytes).map_err(io_err)?;
        file.as_file().sync_all().map_err(io_err)?;
        file.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        name: String,
        weights: Vec<f64>,
    }

    fn payload() -> Payload {
        Payload {
            name: "tree".to_string(),
            weights: vec![0.25, -1.5],
        }
    }

    #[test]
    fn test_envelope_round_trip() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("nested"));
        store.save(ArtifactKind::Pipeline, &payload()).unwrap();
        assert!(store.exists(ArtifactKind::Pipeline));
        let loaded: Payload = store.load(ArtifactKind::Pipeline).unwrap();
        assert_eq!(loaded, payload());
    }

    #[test]
    fn test_missing_artifact_is_not_found() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let err = store.load::<Payload>(ArtifactKind::LabelEncoder).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn test_kind_mismatch_is_incompatible() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.save(ArtifactKind::Pipeline, &payload()).unwrap();
        fs::copy(
            store.path_of(ArtifactKind::Pipeline),
            store.path_of(ArtifactKind::LabelEncoder),
        )
        .unwrap();
        let err = store.load::<Payload>(ArtifactKind::LabelEncoder).unwrap_err();
        assert!(matches!(err, StorageError::Incompatible { .. }));
    }

    #[test]
    fn test_version_and_magic_checked() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        let stale = Envelope {
            magic: ARTIFACT_MAGIC,
            format_version: FORMAT_VERSION + 1,
            kind: ArtifactKind::Pipeline,
            payload: Vec::new(),
        };
        fs::write(
            store.path_of(ArtifactKind::Pipeline),
            postcard::to_allocvec(&stale).unwrap(),
        )
        .unwrap();
        assert!(matches!(
            store.load::<Payload>(ArtifactKind::Pipeline),
            Err(StorageError::Incompatible { .. })
        ));

        fs::write(store.path_of(ArtifactKind::Pipeline), b"not an artifact").unwrap();
        assert!(matches!(
            store.load::<Payload>(ArtifactKind::Pipeline),
            Err(StorageError::Incompatible { .. })
        ));
    }

    #[test]
    fn test_json_reports() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let path = store.write_json("metrics_Test.json", &payload()).unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert!(text.contains("\n  \"name\": \"tree\""));
        let back: Payload = store.read_json("metrics_Test.json").unwrap();
        assert_eq!(back, payload());
    }
}
