//! Playback plan route
//!
//! Hands the browser player its ordered candidate list, the attempt to
//! start with, and the external-player links to fall back on when every
//! candidate fails.

use axum::{extract::Query, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::models::{MediaType, StreamReference};
use crate::services::negotiator::{
    AttemptToken, CandidateStreamUrl, ExternalPlayerLinks, LoadAttempt, PlaybackMechanism,
    PlaybackNegotiator, PlayerCapabilities,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanQuery {
    #[serde(default)]
    pub server_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    #[serde(default)]
    pub stream_id: String,
    pub extension: Option<String>,
    #[serde(default)]
    pub native_hls: bool,
    #[serde(default)]
    pub hls_library: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedCandidate {
    #[serde(flatten)]
    pub candidate: CandidateStreamUrl,
    pub mechanism: PlaybackMechanism,
    pub start_delay_ms: u64,
    pub load_timeout_ms: u64,
}

/// The attempt the player opens with
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialAttempt {
    pub token: AttemptToken,
    pub index: usize,
    pub muted: bool,
}

impl From<&LoadAttempt> for InitialAttempt {
    fn from(attempt: &LoadAttempt) -> Self {
        Self {
            token: attempt.token,
            index: attempt.index,
            muted: attempt.muted,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackPlan {
    pub candidates: Vec<PlannedCandidate>,
    pub initial_attempt: InitialAttempt,
    pub external: ExternalPlayerLinks,
}

/// GET /api/playback/plan
pub async fn plan(
    Query(query): Query<PlanQuery>,
) -> Result<Json<PlaybackPlan>, (StatusCode, Json<serde_json::Value>)> {
    let bad_request = |message: String| {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": message })),
        )
    };

    let media_type: MediaType = query
        .media_type
        .as_deref()
        .unwrap_or("live")
        .parse()
        .map_err(bad_request)?;

    let stream = StreamReference::new(
        &query.server_url,
        &query.username,
        &query.password,
        &query.stream_id,
        media_type,
        query.extension.as_deref().filter(|e| !e.is_empty()),
    )
    .map_err(|e| bad_request(e.to_string()))?;

    let capabilities = PlayerCapabilities {
        native_hls: query.native_hls,
        hls_library: query.hls_library,
    };

    let mut negotiator = PlaybackNegotiator::new(stream, capabilities);
    let first = negotiator.start();
    let external = negotiator.escape_hatch();
    let candidates = negotiator
        .candidates()
        .iter()
        .cloned()
        .map(|candidate| {
            let (start_delay, load_timeout) = candidate.format.playback_timing();
            PlannedCandidate {
                mechanism: capabilities.mechanism_for(&candidate.format),
                start_delay_ms: start_delay.as_millis() as u64,
                load_timeout_ms: load_timeout.as_millis() as u64,
                candidate,
            }
        })
        .collect();

    Ok(Json(PlaybackPlan {
        candidates,
        initial_attempt: InitialAttempt::from(&first),
        external,
    }))
}
