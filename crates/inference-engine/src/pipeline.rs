//! Model Pipeline
//!
//! Three fixed stages: feature engineering, column preprocessing and a
//! classifier. [`Pipeline`] holds the unfitted stages; fitting all three on
//! the same rows yields an immutable [`ModelPipeline`], the persisted
//! artifact.

use crate::PipelineError;
use classifiers::{Estimator, FittedClassifier, ModelFamily};
use feature_engine::{ColumnPreprocessor, FeatureEngineer, FittedPreprocessor, Frame};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Unfitted pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub engineer: FeatureEngineer,
    pub preprocessor: ColumnPreprocessor,
    pub estimator: Estimator,
}

impl Pipeline {
    /// Standard engineer and column groups around `estimator`
    pub fn new(estimator: Estimator) -> Self {
        Self {
            engineer: FeatureEngineer::new(),
            preprocessor: ColumnPreprocessor::default(),
            estimator,
        }
    }

    /// Fit every stage on `frame` with label codes `labels`
    pub fn fit(
        &self,
        frame: &Frame,
        labels: &[usize],
        n_classes: usize,
    ) -> Result<ModelPipeline, PipelineError> {
        let engineered = self.engineer.transform(frame)?;
        let preprocessor = self.preprocessor.fit(&engineered)?;
        let encoded = encode_checked(&preprocessor, &engineered)?;
        let classifier = self.estimator.fit(encoded.view(), labels, n_classes)?;

        info!(
            "Fitted {} pipeline on {} rows ({} encoded features)",
            classifier.family(),
            frame.n_rows(),
            preprocessor.output_width()
        );
        Ok(ModelPipeline {
            engineer: self.engineer,
            preprocessor,
            classifier,
        })
    }
}

/// Encode and reject non-finite output, naming the offending feature
fn encode_checked(preprocessor: &FittedPreprocessor, frame: &Frame) -> Result<Array2<f64>, PipelineError> {
    let encoded = preprocessor.transform(frame)?;
    if let Some(((row, col), _)) = encoded.indexed_iter().find(|(_, v)| !v.is_finite()) {
        let feature = preprocessor
            .feature_names()
            .into_iter()
            .nth(col)
            .unwrap_or_else(|| format!("#{}", col));
        return Err(PipelineError::NonFiniteFeature { feature, row });
    }
    Ok(encoded)
}

/// Fitted three-stage pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPipeline {
    engineer: FeatureEngineer,
    preprocessor: FittedPreprocessor,
    classifier: FittedClassifier,
}

impl ModelPipeline {
    pub fn family(&self) -> ModelFamily {
        self.classifier.family()
    }

    pub fn n_classes(&self) -> usize {
        self.classifier.n_classes()
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.preprocessor.feature_names()
    }

    /// Engineered and encoded feature matrix for `frame`
    pub fn transform(&self, frame: &Frame) -> Result<Array2<f64>, PipelineError> {
        let engineered = self.engineer.transform(frame)?;
        encode_checked(&self.preprocessor, &engineered)
    }

    pub fn predict_proba(&self, frame: &Frame) -> Result<Array2<f64>, PipelineError> {
        let encoded = self.transform(frame)?;
        let proba = self.classifier.predict_proba(encoded.view())?;
        debug!("Scored {} rows with {}", frame.n_rows(), self.family());
        Ok(proba)
    }

    /// Class codes, lowest code on probability ties
    pub fn predict(&self, frame: &Frame) -> Result<Vec<usize>, PipelineError> {
        let encoded = self.transform(frame)?;
        Ok(self.classifier.predict(encoded.view())?)
    }
}
