//! Xtream Codes API Types
//!
//! Request bodies accepted by the metadata pass-through and the credential
//! helpers shared with the relay.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::models::StreamReference;

/// Provider credentials (e.g. server "http://example.com:8080")
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XtreamCredentials {
    pub server: String,
    pub username: String,
    pub password: String,
}

impl XtreamCredentials {
    pub fn new(server: &str, username: &str, password: &str) -> Self {
        Self {
            server: server.trim().trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    /// Credentials a stream reference was built from
    pub fn from_stream(stream: &StreamReference) -> Self {
        Self::new(stream.provider_base_url(), stream.username(), stream.password())
    }

    /// Build the player_api.php base URL
    pub fn api_url(&self) -> String {
        format!(
            "{}/player_api.php?username={}&password={}",
            self.server,
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password)
        )
    }

    /// Full M3U playlist for external players
    pub fn m3u_url(&self) -> String {
        format!(
            "{}/get.php?username={}&password={}&type=m3u_plus&output=ts",
            self.server,
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password)
        )
    }

    /// Same server over HTTPS
    pub fn upgraded_to_https(&self) -> Self {
        match self.server.strip_prefix("http://") {
            Some(rest) => Self {
                server: format!("https://{}", rest),
                ..self.clone()
            },
            None => self.clone(),
        }
    }
}

/// Provider config as sent by the browser
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XtreamConfig {
    pub server_url: String,
    pub username: String,
    pub password: String,
}

impl XtreamConfig {
    pub fn credentials(&self) -> XtreamCredentials {
        XtreamCredentials::new(&self.server_url, &self.username, &self.password)
    }
}

/// Body of every `/api/xtream/*` call
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XtreamProxyRequest {
    pub config: XtreamConfig,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub stream_id: Option<i64>,
    #[serde(default)]
    pub vod_id: Option<i64>,
    #[serde(default)]
    pub series_id: Option<i64>,
}

/// Listing actions the pass-through forwards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListAction {
    LiveCategories,
    VodCategories,
    SeriesCategories,
    LiveStreams,
    VodStreams,
    Series,
}

impl ListAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListAction::LiveCategories => "get_live_categories",
            ListAction::VodCategories => "get_vod_categories",
            ListAction::SeriesCategories => "get_series_categories",
            ListAction::LiveStreams => "get_live_streams",
            ListAction::VodStreams => "get_vod_streams",
            ListAction::Series => "get_series",
        }
    }

    pub fn is_category_listing(&self) -> bool {
        matches!(
            self,
            ListAction::LiveCategories | ListAction::VodCategories | ListAction::SeriesCategories
        )
    }
}

impl fmt::Display for ListAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "get_live_categories" => Ok(ListAction::LiveCategories),
            "get_vod_categories" => Ok(ListAction::VodCategories),
            "get_series_categories" => Ok(ListAction::SeriesCategories),
            "get_live_streams" => Ok(ListAction::LiveStreams),
            "get_vod_streams" => Ok(ListAction::VodStreams),
            "get_series" => Ok(ListAction::Series),
            other => Err(format!("Unsupported action: {}", other)),
        }
    }
}
