//! Model Selection
//!
//! Fits every candidate on the training split in order, evaluates it on
//! the validation split and keeps the most accurate one. A failing
//! candidate is logged and skipped; ties keep the earlier candidate.

use crate::config::TrainingConfig;
use crate::dataset::EncodedSplit;
use crate::evaluation::{evaluate, MetricsRecord};
use crate::TrainingError;
use chrono::{DateTime, Utc};
use classifiers::{Estimator, ModelFamily};
use inference_engine::{ModelPipeline, Pipeline};
use serde::Serialize;
use std::time::Instant;
use storage::{ArtifactKind, ArtifactStore};
use tracing::{error, info};
use uuid::Uuid;

/// Run summary file name
pub const SUMMARY_FILE: &str = "training_summary.json";

/// Named estimator to try
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub name: String,
    pub estimator: Estimator,
}

impl Candidate {
    /// Candidate named after its family
    pub fn new(estimator: Estimator) -> Self {
        Self {
            name: estimator.family().name().to_string(),
            estimator,
        }
    }

    pub fn named(name: impl Into<String>, estimator: Estimator) -> Self {
        Self {
            name: name.into(),
            estimator,
        }
    }
}

/// One candidate per family, in the fixed family order
pub fn candidates(config: &TrainingConfig) -> Result<Vec<Candidate>, TrainingError> {
    ModelFamily::ALL
        .into_iter()
        .map(|family| -> Result<Candidate, TrainingError> {
            let estimator = Estimator::from_value(family, &config.model_params(family))?;
            Ok(Candidate::new(estimator))
        })
        .collect()
}

/// How one candidate fared
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateOutcome {
    pub name: String,
    pub family: ModelFamily,
    pub accuracy: Option<f64>,
    pub f1_weighted: Option<f64>,
    pub error: Option<String>,
    pub fit_seconds: f64,
}

/// Contents of `training_summary.json`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub train_rows: usize,
    pub validation_rows: usize,
    pub classes: Vec<String>,
    pub candidates: Vec<CandidateOutcome>,
    pub best_model: String,
    pub best_accuracy: f64,
}

/// Winning pipeline with the run summary
#[derive(Debug, Clone)]
pub struct Selection {
    pub summary: TrainingSummary,
    pub pipeline: ModelPipeline,
}

fn fit_and_evaluate(
    candidate: &Candidate,
    data: &EncodedSplit,
) -> Result<(ModelPipeline, MetricsRecord), TrainingError> {
    let pipeline = Pipeline::new(candidate.estimator.clone()).fit(
        &data.train,
        &data.y_train,
        data.encoder.n_classes(),
    )?;
    let metrics = evaluate(
        &pipeline,
        &data.validation,
        &data.y_validation,
        &data.encoder,
        &candidate.name,
    )?;
    Ok((pipeline, metrics))
}

/// Train, evaluate and persist; the pipeline and encoder are written only
/// when at least one candidate succeeds
pub fn select_best(
    candidates: &[Candidate],
    data: &EncodedSplit,
    store: &ArtifactStore,
) -> Result<Selection, TrainingError> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    info!("Run {}: {} candidates", run_id, candidates.len());

    let mut outcomes = Vec::with_capacity(candidates.len());
    let mut best: Option<(usize, f64, ModelPipeline)> = None;

    for (index, candidate) in candidates.iter().enumerate() {
        info!("--- Training model: {} ---", candidate.name);
        let clock = Instant::now();
        let result = fit_and_evaluate(candidate, data);
        let fit_seconds = clock.elapsed().as_secs_f64();

        match result {
            Ok((pipeline, metrics)) => {
                store.write_json(&format!("metrics_{}.json", candidate.name), &metrics)?;
                outcomes.push(CandidateOutcome {
                    name: candidate.name.clone(),
                    family: candidate.estimator.family(),
                    accuracy: Some(metrics.accuracy),
                    f1_weighted: Some(metrics.f1_weighted),
                    error: None,
                    fit_seconds,
                });
                let improves = best
                    .as_ref()
                    .map_or(true, |(_, accuracy, _)| metrics.accuracy > *accuracy);
                if improves {
                    info!(
                        "New best model: {} with accuracy {:.4}",
                        candidate.name, metrics.accuracy
                    );
                    best = Some((index, metrics.accuracy, pipeline));
                }
            }
            Err(e) => {
                error!("Candidate {} failed: {}", candidate.name, e);
                outcomes.push(CandidateOutcome {
                    name: candidate.name.clone(),
                    family: candidate.estimator.family(),
                    accuracy: None,
                    f1_weighted: None,
                    error: Some(e.to_string()),
                    fit_seconds,
                });
            }
        }
    }

    let (index, best_accuracy, pipeline) = best.ok_or(TrainingError::NoSuccessfulCandidate)?;
    let best_model = candidates[index].name.clone();

    store.save(ArtifactKind::Pipeline, &pipeline)?;
    store.save(ArtifactKind::LabelEncoder, &data.encoder)?;

    let summary = TrainingSummary {
        run_id,
        started_at,
        finished_at: Utc::now(),
        train_rows: data.y_train.len(),
        validation_rows: data.y_validation.len(),
        classes: data.encoder.classes().to_vec(),
        candidates: outcomes,
        best_model,
        best_accuracy,
    };
    store.write_json(SUMMARY_FILE, &summary)?;
    info!(
        "Best model {} (accuracy {:.4}) saved to {}",
        summary.best_model,
        summary.best_accuracy,
        store.root().display()
    );
    Ok(Selection { summary, pipeline })
}
