//! Liveness, Health and Metrics Routes

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error_response;
use crate::AppState;

/// Liveness body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
    pub status: String,
}

/// Health response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` with a model, `degraded` without
    pub status: String,
    pub model_loaded: bool,
    pub model_family: Option<String>,
    pub classes: Vec<String>,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Always 200, loaded or not
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Student Risk API is running!".to_string(),
        status: "OK".to_string(),
    })
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let loaded = state.service.is_loaded();
    Json(HealthResponse {
        status: if loaded { "healthy" } else { "degraded" }.to_string(),
        model_loaded: loaded,
        model_family: state.service.model_family().map(|f| f.to_string()),
        classes: state.service.classes().to_vec(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

/// Prometheus text exposition
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match &state.prometheus {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Metrics recorder not installed."),
    }
}
