//! Media relay route
//!
//! `GET|HEAD|OPTIONS /relay/:media_type/:username/:password/:file?origin=<base>`
//!
//! The relay keeps no state between requests: everything needed to reach the
//! origin is in the path and the `origin` query parameter.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method},
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::RelayError;
use crate::models::{FetchProfile, MediaType, StreamReference};
use crate::services::forwarder::{RelayMethod, RelayRequest};
use crate::services::metrics;
use crate::services::streamer::{cors_headers, stream_response, PublicAddress};
use crate::AppState;

/// Query parameters for the relay
#[derive(Debug, Default, Deserialize)]
pub struct RelayQuery {
    /// URL-encoded provider base URL
    #[serde(default)]
    pub origin: Option<String>,
    /// Older clients send the base URL as `server`
    #[serde(default)]
    pub server: Option<String>,
}

impl RelayQuery {
    fn origin(&self) -> Option<&str> {
        self.origin
            .as_deref()
            .or(self.server.as_deref())
            .filter(|s| !s.trim().is_empty())
    }
}

/// Split `12345.m3u8` into id and extension. No extension means "use the default".
fn split_file(file: &str) -> (&str, Option<&str>) {
    match file.rsplit_once('.') {
        Some((id, ext)) if !id.is_empty() && !ext.is_empty() => (id, Some(ext)),
        _ => (file, None),
    }
}

/// True when the client reached us over HTTPS (directly or via a proxy)
pub fn inbound_is_https(headers: &HeaderMap) -> bool {
    headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|proto| proto.trim().eq_ignore_ascii_case("https"))
        .unwrap_or(false)
}

/// Where clients should reach the relay, for rewritten manifest URLs
pub fn public_address(state: &AppState, headers: &HeaderMap) -> PublicAddress {
    let host = state
        .config
        .public_host
        .clone()
        .or_else(|| {
            headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| format!("localhost:{}", state.config.port));

    let scheme = state
        .config
        .public_scheme
        .clone()
        .or_else(|| {
            headers
                .get("x-forwarded-proto")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(|s| s.trim().to_ascii_lowercase())
        })
        // Browsers on HTTPS pages block mixed-content segment fetches
        .unwrap_or_else(|| "https".to_string());

    PublicAddress { scheme, host }
}

fn header_text(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Relay handler for every method; only GET and HEAD reach the origin
pub async fn relay(
    State(state): State<Arc<AppState>>,
    method: Method,
    Path((media_type, username, password, file)): Path<(String, String, String, String)>,
    Query(query): Query<RelayQuery>,
    headers: HeaderMap,
) -> Result<Response, RelayError> {
    let relay_method = match method {
        Method::OPTIONS => {
            let mut response = Response::new(Body::empty());
            cors_headers(response.headers_mut());
            return Ok(response);
        }
        Method::GET => RelayMethod::Get,
        Method::HEAD => RelayMethod::Head,
        _ => return Err(RelayError::MethodNotAllowed),
    };

    let origin = query
        .origin()
        .ok_or_else(|| RelayError::InvalidRequest("Server URL is required".to_string()))?;
    let media_type: MediaType = media_type.parse().map_err(RelayError::InvalidRequest)?;
    let (stream_id, extension) = split_file(&file);

    let mut stream = StreamReference::new(
        origin,
        &username,
        &password,
        stream_id,
        media_type,
        extension,
    )?;

    if state.config.upgrade_origin_https && inbound_is_https(&headers) {
        let upgraded = stream.upgraded_to_https();
        if upgraded != stream {
            debug!(origin = %upgraded.provider_base_url(), "Upgrading origin to HTTPS");
            stream = upgraded;
        }
    }

    let req = RelayRequest {
        method: relay_method,
        stream,
        range: header_text(&headers, header::RANGE),
        referer: header_text(&headers, header::REFERER),
    };

    let format = req.format();
    metrics::RELAY_REQUESTS
        .with_label_values(&[format.metric_label(), relay_method.as_str()])
        .inc();
    info!(
        method = relay_method.as_str(),
        media_type = %media_type,
        stream_id = %req.stream.stream_id(),
        format = %format,
        range = req.range.as_deref().unwrap_or("-"),
        "Relay request"
    );

    // Dropping this request (client gone) cancels the upstream fetch
    let cancel = state.shutdown.child_token();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let outcome = state.forwarder.forward(&req, &cancel).await?;
    let public = public_address(&state, &headers);
    let read_timeout = state.forwarder.policy().timeout_for(FetchProfile::Standard);

    stream_response(outcome, &req, &public, read_timeout).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::forwarder::JitterRange;
    use crate::services::test_origin::{serve, spawn_origin, OriginLog};
    use axum::{http::StatusCode, routing::get, Router};

    async fn relay_app(config_changes: impl FnOnce(&mut Config)) -> String {
        let mut config = Config::from_env();
        config.segment_jitter = JitterRange::ZERO;
        config.media_jitter = JitterRange::ZERO;
        config.retry_jitter = JitterRange::ZERO;
        config.public_host = None;
        config.public_scheme = None;
        config_changes(&mut config);

        let state = Arc::new(AppState::new(config).unwrap());
        serve(crate::app(state)).await
    }

    fn relay_url(relay: &str, path: &str, origin: &str) -> String {
        format!("{}{}?origin={}", relay, path, urlencoding::encode(origin))
    }

    #[test]
    fn test_split_file() {
        assert_eq!(split_file("12345.m3u8"), ("12345", Some("m3u8")));
        assert_eq!(split_file("a.b.mp4"), ("a.b", Some("mp4")));
        assert_eq!(split_file("777"), ("777", None));
        assert_eq!(split_file(".ts"), (".ts", None));
    }

    #[test]
    fn test_inbound_https_detection() {
        let mut headers = HeaderMap::new();
        assert!(!inbound_is_https(&headers));
        headers.insert("x-forwarded-proto", "https, http".parse().unwrap());
        assert!(inbound_is_https(&headers));
    }

    #[tokio::test]
    async fn test_head_returns_headers_without_body() {
        let log = OriginLog::default();
        let origin = spawn_origin(
            Router::new().route(
                "/movie/u/p/77.mp4",
                get(|| async {
                    (
                        [(axum::http::header::CONTENT_LENGTH, "5000000")],
                        Body::empty(),
                    )
                }),
            ),
            log.clone(),
        )
        .await;
        let relay = relay_app(|_| {}).await;

        let response = reqwest::Client::new()
            .head(relay_url(&relay, "/relay/movie/u/p/77.mp4", &origin))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(
            response.headers().get("content-length").unwrap(),
            "5000000"
        );
        assert_eq!(response.headers().get("content-type").unwrap(), "video/mp4");
        assert_eq!(response.headers().get("accept-ranges").unwrap(), "bytes");
        assert!(response.bytes().await.unwrap().is_empty());

        let seen = log.requests();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, "HEAD");
        assert_eq!(seen[0].header("range").as_deref(), Some("bytes=0-"));
    }

    #[tokio::test]
    async fn test_unknown_extensions_share_one_metric_series() {
        let origin = spawn_origin(
            Router::new().fallback(|| async { StatusCode::OK }),
            OriginLog::default(),
        )
        .await;
        let relay = relay_app(|_| {}).await;
        let client = reqwest::Client::new();

        let other = metrics::RELAY_REQUESTS.with_label_values(&["other", "HEAD"]);
        let before = other.get();
        for n in 0..20 {
            let path = format!("/relay/movie/u/p/9.weird{}", n);
            let response = client
                .head(relay_url(&relay, &path, &origin))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status().as_u16(), 200);
        }
        assert!(other.get() >= before + 20);

        let allowed = ["hls", "ts", "mp4", "mkv", "other"];
        for family in prometheus::gather() {
            if family.get_name() != "relay_requests_total" {
                continue;
            }
            for metric in family.get_metric() {
                for label in metric.get_label() {
                    if label.get_name() == "format" {
                        assert!(allowed.contains(&label.get_value()));
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn test_manifest_segments_point_back_at_relay() {
        let origin = spawn_origin(
            Router::new().route(
                "/live/u/p/12345.m3u8",
                get(|| async { "#EXTM3U\n#EXTINF:10,\nsegment_1.ts\n" }),
            ),
            OriginLog::default(),
        )
        .await;
        let relay = relay_app(|config| {
            config.public_host = Some("tv.example".to_string());
            config.public_scheme = Some("https".to_string());
        })
        .await;

        let response = reqwest::Client::new()
            .get(relay_url(&relay, "/relay/live/u/p/12345.m3u8", &origin))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/vnd.apple.mpegurl"
        );
        assert!(response.headers().get("accept-ranges").is_none());

        let body = response.text().await.unwrap();
        let lines: Vec<&str> = body.split('\n').collect();
        assert_eq!(lines[0], "#EXTM3U");
        assert_eq!(
            lines[2],
            format!(
                "https://tv.example/relay/live/u/p/segment_1.ts?origin={}",
                urlencoding::encode(&origin)
            )
        );
    }

    #[tokio::test]
    async fn test_client_range_is_forwarded() {
        let log = OriginLog::default();
        let origin = spawn_origin(
            Router::new().route("/series/u/p/9.mkv", get(|| async { "mkv-bytes" })),
            log.clone(),
        )
        .await;
        let relay = relay_app(|_| {}).await;

        let response = reqwest::Client::new()
            .get(relay_url(&relay, "/relay/series/u/p/9.mkv", &origin))
            .header("range", "bytes=100-")
            .header("referer", "https://app.example/")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "video/x-matroska"
        );
        assert_eq!(response.text().await.unwrap(), "mkv-bytes");

        let seen = log.requests();
        assert_eq!(seen[0].header("range").as_deref(), Some("bytes=100-"));
        assert_eq!(seen[0].header("referer").as_deref(), Some("https://app.example/"));
        assert_eq!(
            seen[0].header("user-agent").as_deref(),
            Some("VLC/3.0.20 LibVLC/3.0.20")
        );
    }

    #[tokio::test]
    async fn test_upstream_status_is_mirrored_with_error_body() {
        let origin = spawn_origin(
            Router::new().route(
                "/live/u/p/5.ts",
                get(|| async { StatusCode::NOT_FOUND }),
            ),
            OriginLog::default(),
        )
        .await;
        let relay = relay_app(|_| {}).await;

        let response = reqwest::Client::new()
            .get(relay_url(&relay, "/relay/live/u/p/5.ts", &origin))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 404);
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Stream not available");
        assert_eq!(body["attempts"], 1);
    }

    #[tokio::test]
    async fn test_options_and_unsupported_methods() {
        let relay = relay_app(|_| {}).await;
        let client = reqwest::Client::new();
        let url = relay_url(&relay, "/relay/live/u/p/1.ts", "http://origin.invalid");

        let preflight = client
            .request(reqwest::Method::OPTIONS, &url)
            .send()
            .await
            .unwrap();
        assert_eq!(preflight.status().as_u16(), 200);
        assert_eq!(
            preflight.headers().get("access-control-allow-methods").unwrap(),
            "GET, HEAD, OPTIONS"
        );
        assert!(preflight.bytes().await.unwrap().is_empty());

        let post = client.post(&url).send().await.unwrap();
        assert_eq!(post.status().as_u16(), 405);
        let body: serde_json::Value = post.json().await.unwrap();
        assert_eq!(body["error"], "Method not allowed");
    }

    #[tokio::test]
    async fn test_missing_origin_is_rejected() {
        let relay = relay_app(|_| {}).await;
        let client = reqwest::Client::new();

        let response = client
            .get(format!("{}/relay/live/u/p/1.ts", relay))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Server URL is required");

        let bad_type = client
            .get(relay_url(&relay, "/relay/radio/u/p/1.ts", "http://origin.example"))
            .send()
            .await
            .unwrap();
        assert_eq!(bad_type.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn test_legacy_server_parameter() {
        let origin = spawn_origin(
            Router::new().route("/movie/u/p/3.mp4", get(|| async { "ok" })),
            OriginLog::default(),
        )
        .await;
        let relay = relay_app(|_| {}).await;

        let response = reqwest::Client::new()
            .get(format!(
                "{}/relay/movie/u/p/3.mp4?server={}",
                relay,
                urlencoding::encode(&origin)
            ))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.text().await.unwrap(), "ok");
    }
}
