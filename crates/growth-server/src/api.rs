//! HTTP API for predictions, health checks and Prometheus metrics

use crate::error::ApiError;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use growth_lib::{
    dataset::ReferenceDataset,
    health::{ComponentStatus, HealthRegistry},
    models::{ClassifiedResult, FeatureVector, FEATURE_NAMES},
    service::PredictionService,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
    pub dataset: Option<Arc<ReferenceDataset>>,
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(
        service: Arc<PredictionService>,
        dataset: Option<ReferenceDataset>,
        health_registry: HealthRegistry,
    ) -> Self {
        Self {
            service,
            dataset: dataset.map(Arc::new),
            health_registry,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub instances: Vec<FeatureVector>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub predictions: Vec<ClassifiedResult>,
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "message": "Business Growth Potential API",
        "version": API_VERSION,
    }))
}

/// Liveness summary, always 200. `n_example_rows` is null without a dataset.
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let n_example_rows: Option<usize> = state.dataset.as_ref().map(|d| d.rows);
    Json(json!({
        "status": "ok",
        "model_loaded": state.service.resolver().is_loaded(),
        "n_example_rows": n_example_rows,
    }))
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn model_info(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let model = state.service.resolver().resolve().await?;

    Ok(Json(json!({
        "model_type": model.description.model_type,
        "params": model.description.params,
        "feature_order": FEATURE_NAMES,
        "source": model.source_label(),
        "checksum": model.checksum,
        "loaded_at": model.loaded_at,
    })))
}

async fn predict(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<FeatureVector>, JsonRejection>,
) -> Result<Json<ClassifiedResult>, ApiError> {
    let Json(features) = payload?;
    let result = state.service.predict_one(&features).await?;
    Ok(Json(result))
}

async fn predict_batch(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchResponse>, ApiError> {
    let Json(request) = payload?;
    let predictions = state.service.predict_batch(&request.instances).await?;
    Ok(Json(BatchResponse { predictions }))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/model-info", get(model_info))
        .route("/predict", post(predict))
        .route("/predict-batch", post(predict_batch))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the API server and run until `shutdown` completes
pub async fn serve<F>(port: u16, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
