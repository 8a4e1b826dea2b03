//! Shared application state, router assembly and the small utility endpoints.

use crate::api::messages::create_message;
use crate::core::{AdmissionGate, AppConfig, AppError, MetricsMiddleware, RateLimiter, Result};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Application state shared across handlers.
pub struct AppState {
    pub config: AppConfig,
    pub http_client: reqwest::Client,
    /// Process-wide admission gate, passed before every upstream call.
    pub gate: Arc<dyn AdmissionGate>,
}

impl AppState {
    /// State with the rate limiter described by `config.rate_limit`.
    pub fn new(config: AppConfig, http_client: reqwest::Client) -> Self {
        let gate: Arc<dyn AdmissionGate> = Arc::new(RateLimiter::new(&config.rate_limit));
        Self::with_gate(config, http_client, gate)
    }

    pub fn with_gate(
        config: AppConfig,
        http_client: reqwest::Client,
        gate: Arc<dyn AdmissionGate>,
    ) -> Self {
        Self {
            config,
            http_client,
            gate,
        }
    }
}

/// Build the HTTP client used for upstream calls.
pub fn create_http_client(config: &AppConfig) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(!config.upstream.verify_ssl)
        .timeout(Duration::from_secs(config.upstream.request_timeout_secs))
        .pool_max_idle_per_host(100)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()?;
    Ok(client)
}

/// Assemble the router with all routes and layers.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/messages", post(create_message))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(axum::middleware::from_fn(MetricsMiddleware::track_metrics))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok"
    }))
}

/// Prometheus metrics endpoint.
pub async fn metrics_handler() -> Result<Response> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", encoder.format_type())
        .body(buffer.into())
        .map_err(|e| AppError::Internal(e.to_string()))
}
