//! Server Configuration

use crate::ApiError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment override prefix, e.g. `STUDENT_RISK_API__SERVER__BIND_ADDR`
pub const ENV_PREFIX: &str = "STUDENT_RISK_API";

/// `server` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind_addr: String,
    /// Directory holding `pipeline.bin` and `label_encoder.bin`
    pub artifacts_dir: PathBuf,
    /// Emit JSON log lines
    pub log_json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            artifacts_dir: PathBuf::from("artifacts"),
            log_json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerConfig,
}

impl ServerConfig {
    /// Optional YAML file plus environment overrides
    pub fn load(path: &Path) -> Result<Self, ApiError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ApiError::Config(e.to_string()))?;
        let file: ConfigFile = settings
            .try_deserialize()
            .map_err(|e| ApiError::Config(e.to_string()))?;
        Ok(file.server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ServerConfig::load(&dir.path().join("server.yaml")).unwrap();
        assert_eq!(cfg, ServerConfig::default());
        assert_eq!(cfg.bind_addr, "0.0.0.0:8000");
    }

    #[test]
    fn test_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "server:\n  bind_addr: 127.0.0.1:9000\n  log_json: true").unwrap();

        let cfg = ServerConfig::load(&path).unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:9000");
        assert!(cfg.log_json);
        assert_eq!(cfg.artifacts_dir, PathBuf::from("artifacts"));
    }
}
