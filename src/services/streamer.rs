//! Turns an upstream outcome into the client response
//!
//! Manifests are read whole, rewritten and sent with a recomputed length.
//! Everything else is copied chunk by chunk as it arrives; if the client
//! goes away the body is dropped, which stops the copy and releases the
//! upstream connection.

use async_stream::stream;
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
};
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::models::MediaFormat;
use crate::services::forwarder::{RelayOutcome, RelayRequest};
use crate::services::metrics;
use crate::services::playlist_rewriter::rewrite_playlist;

/// Scheme and host the relay is reachable at, used in rewritten manifests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicAddress {
    pub scheme: String,
    pub host: String,
}

/// Permissive CORS headers shared by every relay response
pub fn cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, HEAD, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Range, Content-Range, Content-Length, Content-Type"),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("Content-Length, Content-Range, Accept-Ranges, Content-Type"),
    );
}

/// Headers derived from the requested format alone
fn base_headers(format: &MediaFormat) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&format.content_type())
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    cors_headers(&mut headers);

    // Manifests are rewritten per request, so they are not range-addressable
    if !format.is_manifest() {
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    }
    headers
}

fn build(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Write `outcome` back to the client
pub async fn stream_response(
    outcome: RelayOutcome,
    req: &RelayRequest,
    public: &PublicAddress,
    manifest_read_timeout: Duration,
) -> Result<Response, RelayError> {
    let format = req.format();
    let status = StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::OK);
    let mut headers = base_headers(&format);

    if format.is_manifest() {
        let Some(upstream) = outcome.body else {
            return Ok(build(status, headers, Body::empty()));
        };

        let text = tokio::time::timeout(manifest_read_timeout, upstream.text())
            .await
            .map_err(|_| RelayError::UpstreamTimeout {
                timeout_ms: manifest_read_timeout.as_millis() as u64,
            })?
            .map_err(|e| RelayError::Network(req.stream.redact(&e.to_string())))?;

        let rewritten = rewrite_playlist(&text, &req.stream, &public.host, &public.scheme);
        metrics::MANIFESTS_REWRITTEN.inc();
        info!(
            original_len = text.len(),
            rewritten_len = rewritten.len(),
            scheme = %public.scheme,
            "Rewrote HLS manifest"
        );

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(rewritten.len() as u64));
        return Ok(build(status, headers, Body::from(rewritten)));
    }

    if let Some(length) = outcome.headers.content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }
    if let Some(range) = outcome
        .headers
        .content_range
        .as_deref()
        .and_then(|r| HeaderValue::from_str(r).ok())
    {
        headers.insert(header::CONTENT_RANGE, range);
    }

    debug!(
        status = outcome.status,
        upstream_content_type = outcome.headers.content_type.as_deref().unwrap_or("-"),
        attempts = outcome.attempt.attempt_number,
        "Relaying media body"
    );
    let body = match outcome.body {
        Some(upstream) => relay_body(upstream, req.stream.redact(req.stream.stream_id())),
        None => Body::empty(),
    };

    Ok(build(status, headers, body))
}

/// Tracks a body copy so an early drop can be told apart from a clean end
struct CopyGuard {
    label: String,
    bytes: u64,
    finished: bool,
}

impl Drop for CopyGuard {
    fn drop(&mut self) {
        if !self.finished {
            metrics::CLIENT_DISCONNECTS.inc();
            debug!(stream = %self.label, bytes = self.bytes, "Client disconnected, stopping stream");
        }
    }
}

fn relay_body(upstream: reqwest::Response, label: String) -> Body {
    let mut guard = CopyGuard {
        label,
        bytes: 0,
        finished: false,
    };

    let body = stream! {
        let mut chunks = upstream.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(bytes) => {
                    guard.bytes += bytes.len() as u64;
                    yield Ok::<_, std::io::Error>(bytes);
                }
                Err(e) => {
                    // Already-sent bytes stay sent; just stop copying
                    warn!(stream = %guard.label, bytes = guard.bytes, error = %e, "Upstream body ended early");
                    break;
                }
            }
        }
        guard.finished = true;
        debug!(stream = %guard.label, bytes = guard.bytes, "Stream finished");
    };

    Body::from_stream(body)
}
