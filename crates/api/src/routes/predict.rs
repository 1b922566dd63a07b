//! Prediction Route

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use inference_engine::InferenceError;
use metrics::{counter, histogram};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::error_response;
use crate::AppState;

/// Detail returned while no model is loaded
pub const MODEL_NOT_LOADED: &str = "Model not loaded.";

fn count(outcome: &'static str) {
    counter!("predictions_total", "outcome" => outcome).increment(1);
}

/// Score one student record.
///
/// Load state is checked before the body is parsed or validated.
pub async fn predict(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    if !state.service.is_loaded() {
        count("unloaded");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, MODEL_NOT_LOADED);
    }

    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            count("invalid");
            debug!("Rejected request body: {}", rejection.body_text());
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    let clock = Instant::now();
    match state.service.predict_json(&body) {
        Ok(prediction) => {
            count("success");
            histogram!("prediction_latency_seconds").record(clock.elapsed().as_secs_f64());
            (StatusCode::OK, Json(prediction)).into_response()
        }
        Err(InferenceError::NotLoaded(_)) => {
            count("unloaded");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, MODEL_NOT_LOADED)
        }
        Err(InferenceError::Validation(e)) => {
            count("invalid");
            debug!("Invalid request: {}", e);
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(InferenceError::Pipeline(e)) => {
            count("error");
            warn!("Prediction error: {}", e);
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
    }
}
