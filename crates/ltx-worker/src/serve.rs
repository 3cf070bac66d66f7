//! Local HTTP API for running jobs without the serverless platform.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use ltx_models::{JobId, JobResponse};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handler::JobHandler;

/// Inline base64 images can be large.
pub const MAX_BODY_SIZE: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct ServeState {
    pub handler: JobHandler,
}

/// `POST /runsync` body.
#[derive(Debug, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub input: Value,
}

/// `POST /runsync` response, shaped like the hosted endpoint's.
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub id: String,
    pub status: &'static str,
    pub output: JobResponse,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub supports_i2v: bool,
}

async fn runsync(State(state): State<ServeState>, Json(request): Json<RunRequest>) -> Json<RunResponse> {
    let job_id = request
        .id
        .map(JobId::from_string)
        .unwrap_or_else(JobId::new);

    let output = state.handler.handle(&job_id, request.input).await;

    Json(RunResponse {
        id: job_id.to_string(),
        status: "COMPLETED",
        output,
    })
}

async fn health(State(state): State<ServeState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        supports_i2v: state.handler.engine().pipelines().supports_i2v(),
    })
}

/// Create the local API router.
pub fn create_router(handler: JobHandler, metrics_handle: Option<PrometheusHandle>) -> Router {
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .route("/runsync", post(runsync))
        .route("/health", get(health))
        .with_state(ServeState { handler })
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
}
