//! Xtream Relay
//!
//! CORS and mixed-content relay for Xtream Codes streams, the metadata
//! pass-through the browser player needs, and playback negotiation.

pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

use axum::{
    routing::{any, get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::Config;
use crate::services::{forwarder::RelayForwarder, xtream::build_http_client};

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub forwarder: RelayForwarder,
    /// Client for Xtream metadata calls (separate timeouts from the relay)
    pub xtream_http: reqwest::Client,
    pub start_time: Instant,
    /// Cancelled on shutdown; every relay request holds a child token
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let forwarder = RelayForwarder::new(config.relay_policy())?;
        let xtream_http = build_http_client(&config.user_agent, config.xtream_timeout_secs)?;

        Ok(Self {
            config,
            forwarder,
            xtream_http,
            start_time: Instant::now(),
            shutdown: CancellationToken::new(),
        })
    }
}

/// Build the router
pub fn app(state: Arc<AppState>) -> Router {
    // The relay sets its own CORS headers, including on errors and preflights
    let relay = Router::new().route(
        "/relay/:media_type/:username/:password/:file",
        any(routes::relay::relay),
    );

    let api = Router::new()
        // Health endpoints
        .route("/", get(routes::health::root))
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        .route("/live", get(routes::health::live))
        // Xtream Codes metadata pass-through
        .route("/api/xtream/authenticate", post(routes::xtream::authenticate))
        .route("/api/xtream/categories", post(routes::xtream::categories))
        .route("/api/xtream/streams", post(routes::xtream::streams))
        .route("/api/xtream/epg", post(routes::xtream::epg))
        .route("/api/xtream/vod-info", post(routes::xtream::vod_info))
        .route("/api/xtream/series-info", post(routes::xtream::series_info))
        // Playback negotiation
        .route("/api/playback/plan", get(routes::playback::plan))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    Router::new()
        .merge(relay)
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
