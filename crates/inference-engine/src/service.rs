//! Prediction Service
//!
//! Explicit serving context: either a loaded pipeline with its label
//! encoder, or the reason loading failed. Built once at start-up and shared
//! read-only afterwards.

use crate::label::LabelEncoder;
use crate::pipeline::ModelPipeline;
use crate::InferenceError;
use classifiers::ModelFamily;
use data_validator::{validate, StudentRecord};
use feature_engine::Frame;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use storage::{ArtifactKind, ArtifactStore};
use tracing::{debug, error, info};

/// Outcome of one prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Most probable class name
    pub prediction: String,
    /// Probability per class name, in sorted class order
    pub probability: BTreeMap<String, f64>,
}

/// Serving context
#[derive(Debug, Clone)]
pub enum PredictionService {
    Unloaded {
        reason: String,
    },
    Loaded {
        pipeline: ModelPipeline,
        encoder: LabelEncoder,
    },
}

impl PredictionService {
    /// Load the pipeline and encoder artifacts; never fails, never retries
    pub fn load(store: &ArtifactStore) -> Self {
        let loaded = store
            .load::<ModelPipeline>(ArtifactKind::Pipeline)
            .and_then(|pipeline| {
                store
                    .load::<LabelEncoder>(ArtifactKind::LabelEncoder)
                    .map(|encoder| (pipeline, encoder))
            });

        match loaded {
            Ok((pipeline, encoder)) => Self::from_parts(pipeline, encoder),
            Err(e) => {
                error!("Artifacts not loaded from {}: {}", store.root().display(), e);
                Self::Unloaded {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Pair a pipeline with its encoder, refusing mismatched class counts
    pub fn from_parts(pipeline: ModelPipeline, encoder: LabelEncoder) -> Self {
        if pipeline.n_classes() != encoder.n_classes() {
            let reason = format!(
                "pipeline predicts {} classes but encoder holds {}",
                pipeline.n_classes(),
                encoder.n_classes()
            );
            error!("Artifacts not loaded: {}", reason);
            return Self::Unloaded { reason };
        }
        info!(
            "Model and encoder loaded: {} over classes {:?}",
            pipeline.family(),
            encoder.classes()
        );
        Self::Loaded { pipeline, encoder }
    }

    pub fn unloaded(reason: impl Into<String>) -> Self {
        Self::Unloaded {
            reason: reason.into(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded { .. })
    }

    pub fn model_family(&self) -> Option<ModelFamily> {
        match self {
            Self::Loaded { pipeline, .. } => Some(pipeline.family()),
            Self::Unloaded { .. } => None,
        }
    }

    pub fn classes(&self) -> &[String] {
        match self {
            Self::Loaded { encoder, .. } => encoder.classes(),
            Self::Unloaded { .. } => &[],
        }
    }

    /// Predict one validated record
    pub fn predict(&self, record: &StudentRecord) -> Result<Prediction, InferenceError> {
        let (pipeline, encoder) = match self {
            Self::Loaded { pipeline, encoder } => (pipeline, encoder),
            Self::Unloaded { reason } => return Err(InferenceError::NotLoaded(reason.clone())),
        };

        let frame = Frame::from_rows(StudentRecord::column_names(), &[record.values()])
            .map_err(crate::PipelineError::from)?;
        let proba = pipeline.predict_proba(&frame)?;
        let row = proba.row(0);

        // argmax, lowest code on ties
        let mut best = 0;
        for (code, &p) in row.iter().enumerate() {
            if p > row[best] {
                best = code;
            }
        }

        let probability = encoder
            .classes()
            .iter()
            .cloned()
            .zip(row.iter().copied())
            .collect();
        let prediction = encoder.decode(best)?.to_string();
        debug!("Predicted {} (p={:.4})", prediction, row[best]);

        Ok(Prediction {
            prediction,
            probability,
        })
    }

    /// Validate a raw JSON body, then predict. Load state is checked first.
    pub fn predict_json(&self, body: &Value) -> Result<Prediction, InferenceError> {
        if let Self::Unloaded { reason } = self {
            return Err(InferenceError::NotLoaded(reason.clone()));
        }
        let record = validate(body)?;
        self.predict(&record)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pipeline::tests::two_row_frame;
    use crate::pipeline::Pipeline;
    use classifiers::Estimator;
    use data_validator::FIELDS;
    use serde_json::{json, Map};
    use tempfile::tempdir;

    fn fitted_service() -> (ModelPipeline, LabelEncoder) {
        let encoder = LabelEncoder::fit(&["Dropout", "Graduate"]);
        let pipeline = Pipeline::new(Estimator::default_for(ModelFamily::LogisticRegression))
            .fit(&two_row_frame(), &[0, 1], 2)
            .unwrap();
        (pipeline, encoder)
    }

    fn request(row: &[f64], display: bool) -> Value {
        let mut map = Map::new();
        for (field, value) in FIELDS.iter().zip(row) {
            let key = if display { field.display } else { field.name };
            map.insert(key.to_string(), json!(value));
        }
        Value::Object(map)
    }

    #[test]
    fn test_graduate_row_prefers_graduate() {
        let (pipeline, encoder) = fitted_service();
        let service = PredictionService::from_parts(pipeline, encoder);
        let strong = crate::pipeline::tests::student_row(true);
        let out = service.predict_json(&request(&strong, true)).unwrap();
        assert!(out.probability["Graduate"] >= out.probability["Dropout"]);
        assert_eq!(out.prediction, "Graduate");
        let total: f64 = out.probability.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_spellings_agree() {
        let (pipeline, encoder) = fitted_service();
        let service = PredictionService::from_parts(pipeline, encoder);
        let row = crate::pipeline::tests::student_row(false);
        let a = service.predict_json(&request(&row, true)).unwrap();
        let b = service.predict_json(&request(&row, false)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unloaded_checked_before_validation() {
        let service = PredictionService::unloaded("no artifacts");
        assert!(matches!(
            service.predict_json(&json!("garbage")),
            Err(InferenceError::NotLoaded(_))
        ));
        assert!(!service.is_loaded());
    }

    #[test]
    fn test_validation_error_surfaces() {
        let (pipeline, encoder) = fitted_service();
        let service = PredictionService::from_parts(pipeline, encoder);
        assert!(matches!(
            service.predict_json(&json!({"Course": 1})),
            Err(InferenceError::Validation(_))
        ));
    }

    #[test]
    fn test_load_from_store() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        assert!(!PredictionService::load(&store).is_loaded());

        let (pipeline, encoder) = fitted_service();
        store.save(ArtifactKind::Pipeline, &pipeline).unwrap();
        store.save(ArtifactKind::LabelEncoder, &encoder).unwrap();

        let service = PredictionService::load(&store);
        assert!(service.is_loaded());
        assert_eq!(service.model_family(), Some(ModelFamily::LogisticRegression));
        assert_eq!(service.classes(), &["Dropout", "Graduate"]);
    }

    /// Four weak and four strong students with slightly different admission grades
    fn eight_row_frame() -> (Frame, Vec<usize>) {
        let columns = FIELDS.iter().map(|f| f.display.to_string()).collect();
        let admission = FIELDS
            .iter()
            .position(|f| f.name == "Admission_grade")
            .unwrap();
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..8 {
            let strong = i >= 4;
            let mut row = crate::pipeline::tests::student_row(strong);
            row[admission] += (i % 4) as f64;
            rows.push(row);
            labels.push(usize::from(strong));
        }
        (Frame::from_rows(columns, &rows).unwrap(), labels)
    }

    #[test]
    fn test_every_family_survives_store_round_trip() {
        let (frame, labels) = eight_row_frame();
        let encoder = LabelEncoder::fit(&["Dropout", "Graduate"]);

        for family in ModelFamily::ALL {
            let dir = tempdir().unwrap();
            let store = ArtifactStore::new(dir.path());
            let pipeline = Pipeline::new(Estimator::default_for(family).with_random_state(0))
                .fit(&frame, &labels, 2)
                .unwrap();
            let expected = pipeline.predict_proba(&frame).unwrap();
            store.save(ArtifactKind::Pipeline, &pipeline).unwrap();
            store.save(ArtifactKind::LabelEncoder, &encoder).unwrap();

            let service = PredictionService::load(&store);
            assert_eq!(service.model_family(), Some(family));
            match &service {
                PredictionService::Loaded { pipeline: reloaded, .. } => {
                    assert_eq!(reloaded, &pipeline, "{} changed on reload", family);
                    assert_eq!(reloaded.predict_proba(&frame).unwrap(), expected);
                }
                PredictionService::Unloaded { reason } => {
                    panic!("{} failed to reload: {}", family, reason)
                }
            }
        }
    }

    #[test]
    fn test_mismatched_encoder_stays_unloaded() {
        let (pipeline, _) = fitted_service();
        let encoder = LabelEncoder::fit(&["a", "b", "c"]);
        assert!(!PredictionService::from_parts(pipeline, encoder).is_loaded());
    }
}
