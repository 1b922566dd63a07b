//! Training Configuration
//!
//! Loaded from a YAML parameter file and overridden by
//! `STUDENT_RISK__<SECTION>__<KEY>` environment variables.

use crate::evaluation::Scoring;
use crate::TrainingError;
use classifiers::ModelFamily;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment override prefix
pub const ENV_PREFIX: &str = "STUDENT_RISK";

/// Seed used by the search when `tuning.random_state` is absent
pub const DEFAULT_SEARCH_SEED: u64 = 42;

/// Size of the validation split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestSize {
    /// Absolute number of rows
    Count(usize),
    /// Fraction of rows in (0, 1)
    Fraction(f64),
}

impl TestSize {
    /// Number of validation rows out of `n`
    pub fn resolve(&self, n: usize) -> Result<usize, TrainingError> {
        let count = match *self {
            TestSize::Count(count) => count,
            TestSize::Fraction(f) if f > 0.0 && f < 1.0 => (f * n as f64).ceil() as usize,
            TestSize::Fraction(f) => {
                return Err(TrainingError::InvalidSplit(format!(
                    "test_size fraction {} must be in (0, 1)",
                    f
                )))
            }
        };
        if count == 0 || count >= n {
            return Err(TrainingError::InvalidSplit(format!(
                "test_size resolves to {} of {} rows",
                count, n
            )));
        }
        Ok(count)
    }
}

/// `data_split` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSplitConfig {
    pub test_size: TestSize,
    pub random_state: u64,
}

impl Default for DataSplitConfig {
    fn default() -> Self {
        Self {
            test_size: TestSize::Fraction(0.2),
            random_state: 42,
        }
    }
}

/// Search space of one family
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FamilyGrid {
    /// Parameter name (optionally `model__`-prefixed) to candidate values
    pub param_grid: BTreeMap<String, Vec<Value>>,
}

/// `tuning` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// Family to tune; the CLI flag wins
    pub model: Option<String>,
    pub n_iter: usize,
    pub cv: usize,
    pub scoring: Scoring,
    /// Worker threads; `<= 0` uses every core
    pub n_jobs: i32,
    pub random_state: Option<u64>,
    /// Per-family grids, keyed by family name
    #[serde(flatten)]
    pub grids: BTreeMap<String, FamilyGrid>,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            model: None,
            n_iter: 10,
            cv: 5,
            scoring: Scoring::Accuracy,
            n_jobs: -1,
            random_state: None,
            grids: BTreeMap::new(),
        }
    }
}

impl TuningConfig {
    pub fn grid_for(&self, family: ModelFamily) -> Option<&FamilyGrid> {
        find_ignore_case(&self.grids, family.name())
    }
}

/// `paths` section; CLI flags win
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub train_data: PathBuf,
    pub artifacts_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            train_data: PathBuf::from("data/train.csv"),
            artifacts_dir: PathBuf::from("artifacts"),
        }
    }
}

/// Whole parameter file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub data_split: DataSplitConfig,
    /// Hyperparameters per family name
    pub models: BTreeMap<String, Value>,
    pub tuning: TuningConfig,
    pub paths: PathsConfig,
}

fn find_ignore_case<'a, T>(map: &'a BTreeMap<String, T>, key: &str) -> Option<&'a T> {
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

impl TrainingConfig {
    /// Load `path` (required only when `required`) plus environment overrides
    pub fn load(path: &Path, required: bool) -> Result<Self, TrainingError> {
        if !path.exists() {
            if required {
                return Err(TrainingError::Config(format!(
                    "parameter file {} not found",
                    path.display()
                )));
            }
            warn!("Parameter file {} not found; using defaults", path.display());
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(required))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| TrainingError::Config(e.to_string()))?;

        let parsed: TrainingConfig = settings
            .try_deserialize()
            .map_err(|e| TrainingError::Config(e.to_string()))?;
        parsed.check_family_names()?;
        info!("Loaded configuration from {}", path.display());
        Ok(parsed)
    }

    /// Parse YAML text directly, without environment overrides
    pub fn from_yaml(text: &str) -> Result<Self, TrainingError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Yaml))
            .build()
            .map_err(|e| TrainingError::Config(e.to_string()))?;
        let parsed: TrainingConfig = settings
            .try_deserialize()
            .map_err(|e| TrainingError::Config(e.to_string()))?;
        parsed.check_family_names()?;
        Ok(parsed)
    }

    fn check_family_names(&self) -> Result<(), TrainingError> {
        for name in self.models.keys().chain(self.tuning.grids.keys()) {
            name.parse::<ModelFamily>()?;
        }
        Ok(())
    }

    /// Configured hyperparameters of `family`, `null` when not configured
    pub fn model_params(&self, family: ModelFamily) -> Value {
        find_ignore_case(&self.models, family.name())
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Family to tune: explicit choice, then `tuning.model`, then gradient boosting
    pub fn tuning_family(&self, explicit: Option<&str>) -> Result<ModelFamily, TrainingError> {
        match explicit.or(self.tuning.model.as_deref()) {
            Some(name) => Ok(name.parse()?),
            None => Ok(ModelFamily::GradientBoosting),
        }
    }

    pub fn search_seed(&self) -> u64 {
        self.tuning.random_state.unwrap_or(DEFAULT_SEARCH_SEED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: &str = r#"
data_split:
  test_size: 0.25
  random_state: 7
models:
  LogisticRegression:
    C: 0.5
    max_iter: 200
  RandomForest:
    n_estimators: 50
tuning:
  model: RandomForest
  n_iter: 4
  cv: 3
  scoring: f1_weighted
  n_jobs: 2
  RandomForest:
    param_grid:
      model__n_estimators: [50, 100]
      model__max_depth: [3, 5, null]
"#;

    #[test]
    fn test_parse_full_file() {
        let cfg = TrainingConfig::from_yaml(PARAMS).unwrap();
        assert_eq!(cfg.data_split.test_size, TestSize::Fraction(0.25));
        assert_eq!(cfg.data_split.random_state, 7);
        assert_eq!(cfg.tuning.n_iter, 4);
        assert_eq!(cfg.tuning.scoring, Scoring::F1Weighted);
        assert_eq!(cfg.tuning_family(None).unwrap(), ModelFamily::RandomForest);
        assert_eq!(
            cfg.tuning_family(Some("gradientboosting")).unwrap(),
            ModelFamily::GradientBoosting
        );
        assert_eq!(cfg.search_seed(), DEFAULT_SEARCH_SEED);

        let grid = cfg.tuning.grid_for(ModelFamily::RandomForest).unwrap();
        assert_eq!(grid.param_grid.len(), 2);
        let depths = grid
            .param_grid
            .iter()
            .find(|(k, _)| k.ends_with("max_depth"))
            .map(|(_, v)| v.len());
        assert_eq!(depths, Some(3));
    }

    #[test]
    fn test_model_params_lookup() {
        let cfg = TrainingConfig::from_yaml(PARAMS).unwrap();
        let lr = cfg.model_params(ModelFamily::LogisticRegression);
        let estimator =
            classifiers::Estimator::from_value(ModelFamily::LogisticRegression, &lr).unwrap();
        match estimator {
            classifiers::Estimator::LogisticRegression(p) => {
                assert_eq!(p.c, 0.5);
                assert_eq!(p.max_iter, 200);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(cfg.model_params(ModelFamily::Knn), Value::Null);
    }

    #[test]
    fn test_defaults_when_empty() {
        let cfg = TrainingConfig::from_yaml("{}").unwrap();
        assert_eq!(cfg, TrainingConfig::default());
        assert_eq!(cfg.tuning_family(None).unwrap(), ModelFamily::GradientBoosting);
    }

    #[test]
    fn test_unknown_family_rejected() {
        let err = TrainingConfig::from_yaml("models:\n  XGBoost: {}\n").unwrap_err();
        assert!(matches!(err, TrainingError::Classifier(_)));
    }

    #[test]
    fn test_test_size_resolution() {
        assert_eq!(TestSize::Fraction(0.2).resolve(11).unwrap(), 3);
        assert_eq!(TestSize::Count(4).resolve(10).unwrap(), 4);
        assert!(TestSize::Fraction(1.5).resolve(10).is_err());
        assert!(TestSize::Count(10).resolve(10).is_err());
    }
}
