//! Xtream Codes API Client
//!
//! Thin client for the Player API v2 (`player_api.php`). Responses are kept
//! as raw JSON: the relay only passes them through to the browser.

use super::types::{ListAction, XtreamCredentials};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};

/// Xtream API error types
#[derive(Debug, thiserror::Error)]
pub enum XtreamError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP error! status: {0}")]
    Http(u16),
    #[error("Parse error: {0}")]
    Parse(String),
}

/// First 500 characters of a response body, for logs
fn preview(text: &str) -> String {
    text.chars().take(500).collect()
}

/// Build the shared HTTP client used for metadata calls
pub fn build_http_client(user_agent: &str, timeout_secs: u64) -> Result<Client, XtreamError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(user_agent)
        .gzip(true)
        // Many Xtream servers have self-signed certs
        .danger_accept_invalid_certs(true)
        .build()
        .map_err(|e| XtreamError::Network(format!("Failed to create HTTP client: {}", e)))
}

/// Xtream API Client
pub struct XtreamClient {
    http: Client,
    base_url: String,
}

impl XtreamClient {
    pub fn new(http: Client, creds: &XtreamCredentials) -> Self {
        Self {
            http,
            base_url: creds.api_url(),
        }
    }

    /// GET `player_api.php` with extra query parameters appended verbatim
    async fn get(&self, query: &str) -> Result<Value, XtreamError> {
        let url = if query.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}&{}", self.base_url, query)
        };

        debug!("Xtream API request: {}", if query.is_empty() { "auth" } else { query });

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| XtreamError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(XtreamError::Http(status.as_u16()));
        }

        let text = response
            .text()
            .await
            .map_err(|e| XtreamError::Network(e.to_string()))?;

        // Some endpoints answer with nothing when there are no results
        if text.trim().is_empty() {
            return Ok(Value::Array(Vec::new()));
        }

        serde_json::from_str(&text).map_err(|e| {
            error!("Failed to parse Xtream response for '{}': {}", query, e);
            debug!("Response text: {}", preview(&text));
            XtreamError::Parse(e.to_string())
        })
    }

    /// Account profile (`user_info` + `server_info`)
    pub async fn authenticate(&self) -> Result<Value, XtreamError> {
        let profile = self.get("").await?;
        if let Some(status) = profile
            .get("user_info")
            .and_then(|u| u.get("status"))
            .and_then(Value::as_str)
        {
            info!(status, "Xtream account authenticated");
        }
        Ok(profile)
    }

    /// Category or stream listing, optionally narrowed to one category
    pub async fn list(
        &self,
        action: ListAction,
        category_id: Option<&str>,
    ) -> Result<Value, XtreamError> {
        let mut query = format!("action={}", action);
        if let Some(id) = category_id.filter(|id| !id.is_empty()) {
            query.push_str(&format!("&category_id={}", urlencoding::encode(id)));
        }
        self.get(&query).await
    }

    /// Short EPG for a live stream
    pub async fn short_epg(&self, stream_id: i64) -> Result<Value, XtreamError> {
        self.get(&format!("action=get_short_epg&stream_id={}", stream_id))
            .await
    }

    /// Detailed VOD info
    pub async fn vod_info(&self, vod_id: i64) -> Result<Value, XtreamError> {
        self.get(&format!("action=get_vod_info&vod_id={}", vod_id))
            .await
    }

    /// Detailed series info with episodes
    pub async fn series_info(&self, series_id: i64) -> Result<Value, XtreamError> {
        self.get(&format!("action=get_series_info&series_id={}", series_id))
            .await
    }
}
