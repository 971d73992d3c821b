use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;

use crate::services::metrics as relay_metrics;
use crate::AppState;

/// Root endpoint - basic status
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "Xtream Relay",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "runtime": "rust"
    }))
}

/// Relay counters since start
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayStats {
    manifests_rewritten: u64,
    upstream_retries: u64,
    upstream_timeouts: u64,
    client_disconnects: u64,
}

/// Health check response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: String,
    uptime: u64,
    environment: String,
    relay: RelayStats,
}

/// GET /health - Process health and relay counters
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // The relay is stateless; if we can answer, we are healthy
    let status = if state.shutdown.is_cancelled() {
        "shutting_down"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status: status.to_string(),
        uptime: state.start_time.elapsed().as_secs(),
        environment: state.config.node_env.clone(),
        relay: RelayStats {
            manifests_rewritten: relay_metrics::MANIFESTS_REWRITTEN.get(),
            upstream_retries: relay_metrics::UPSTREAM_RETRIES.get(),
            upstream_timeouts: relay_metrics::UPSTREAM_TIMEOUTS.get(),
            client_disconnects: relay_metrics::CLIENT_DISCONNECTS.get(),
        },
    })
}

/// GET /metrics - Prometheus metrics
pub async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                b"Internal Server Error".to_vec(),
            )
        }
    }
}

/// Liveness probe (for Kubernetes)
pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, "alive")
}
