//! Student Risk API Server
//!
//! Serves single-record predictions from the persisted pipeline, plus
//! liveness, health and Prometheus metrics endpoints.

use axum::routing::{get, post};
use axum::Router;
use inference_engine::PredictionService;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;
use storage::ArtifactStore;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod routes;

pub use crate::config::ServerConfig;

/// API server errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Metrics recorder error: {0}")]
    Metrics(String),
    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state shared across handlers
pub struct AppState {
    /// Loaded pipeline, or the reason loading failed
    pub service: PredictionService,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: Instant,
    /// Present when a Prometheus recorder is installed
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(service: PredictionService) -> Self {
        Self {
            service,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
            prometheus: None,
        }
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes::system::root))
        .route("/health", get(routes::system::health))
        .route("/metrics", get(routes::system::metrics))
        .route("/predict", post(routes::predict::predict))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Install the global Prometheus recorder
pub fn install_recorder() -> Result<PrometheusHandle, ApiError> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ApiError::Metrics(e.to_string()))
}

/// Initialize logging from `RUST_LOG` (default `info`)
pub fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Load the artifacts once and serve until the listener fails
pub async fn run_server(config: ServerConfig) -> Result<(), ApiError> {
    let store = ArtifactStore::new(&config.artifacts_dir);
    let service = PredictionService::load(&store);
    if !service.is_loaded() {
        warn!("Serving without a model; /predict answers 500 until restarted with artifacts");
    }

    let state = AppState::new(service).with_prometheus(install_recorder()?);
    let app = create_router(Arc::new(state));

    info!("Starting API server on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use classifiers::{Estimator, ModelFamily};
    use data_validator::FIELDS;
    use feature_engine::Frame;
    use inference_engine::{LabelEncoder, Pipeline};
    use serde_json::{json, Map, Value};
    use tower::ServiceExt;

    fn student_row(strong: bool) -> Vec<f64> {
        FIELDS
            .iter()
            .map(|f| match f.name {
                n if n.contains("approved") => if strong { 6.0 } else { 0.0 },
                n if n.starts_with("Curricular") && n.ends_with("_grade") => {
                    if strong { 14.0 } else { 0.0 }
                }
                n if n.contains("enrolled") || n.contains("evaluations") => 6.0,
                "Admission_grade" | "Previous_qualification_grade" => {
                    if strong { 150.0 } else { 110.0 }
                }
                _ => 1.0,
            })
            .collect()
    }

    fn loaded_state() -> Arc<AppState> {
        let columns = FIELDS.iter().map(|f| f.display.to_string()).collect();
        let frame = Frame::from_rows(columns, &[student_row(false), student_row(true)]).unwrap();
        let pipeline = Pipeline::new(Estimator::default_for(ModelFamily::LogisticRegression))
            .fit(&frame, &[0, 1], 2)
            .unwrap();
        let encoder = LabelEncoder::fit(&["Dropout", "Graduate"]);
        Arc::new(AppState::new(PredictionService::from_parts(pipeline, encoder)))
    }

    fn unloaded_state() -> Arc<AppState> {
        Arc::new(AppState::new(PredictionService::unloaded("no artifacts")))
    }

    fn body_for(row: &[f64], display: bool) -> Value {
        let mut map = Map::new();
        for (field, value) in FIELDS.iter().zip(row) {
            let key = if display { field.display } else { field.name };
            map.insert(key.to_string(), json!(value));
        }
        Value::Object(map)
    }

    fn post_json(body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/predict")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(state: Arc<AppState>, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = create_router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_root_always_ok() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let (status, body) = send(unloaded_state(), request).await;
        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            value,
            json!({"message": "Student Risk API is running!", "status": "OK"})
        );
    }

    #[tokio::test]
    async fn test_spellings_give_identical_bytes() {
        let state = loaded_state();
        let row = student_row(true);
        let display = body_for(&row, true).to_string();
        let underscore = body_for(&row, false).to_string();

        let (status_a, bytes_a) = send(state.clone(), post_json(display)).await;
        let (status_b, bytes_b) = send(state, post_json(underscore)).await;
        assert_eq!(status_a, StatusCode::OK);
        assert_eq!(status_b, StatusCode::OK);
        assert_eq!(bytes_a, bytes_b);

        let value: Value = serde_json::from_slice(&bytes_a).unwrap();
        assert_eq!(value["prediction"], json!("Graduate"));
        assert!(value["probability"]["Dropout"].is_number());
    }

    #[tokio::test]
    async fn test_missing_field_is_400_naming_it() {
        let mut body = body_for(&student_row(true), true);
        body.as_object_mut().unwrap().remove("Course");
        let (status, bytes) = send(loaded_state(), post_json(body.to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(value["detail"].as_str().unwrap().contains("Course"));
    }

    #[tokio::test]
    async fn test_malformed_json_is_400() {
        let (status, bytes) = send(loaded_state(), post_json("{not json".to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(value["detail"].is_string());
    }

    #[tokio::test]
    async fn test_unloaded_predict_is_500() {
        let body = body_for(&student_row(true), true).to_string();
        let (status, bytes) = send(unloaded_state(), post_json(body)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({"detail": "Model not loaded."}));
    }

    #[tokio::test]
    async fn test_health_reports_degraded() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, bytes) = send(unloaded_state(), request).await;
        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["status"], json!("degraded"));
        assert_eq!(value["model_loaded"], json!(false));

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (_, bytes) = send(loaded_state(), request).await;
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["status"], json!("healthy"));
        assert_eq!(value["model_family"], json!("LogisticRegression"));
    }

    #[tokio::test]
    async fn test_metrics_without_recorder_is_404() {
        let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let (status, _) = send(unloaded_state(), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
