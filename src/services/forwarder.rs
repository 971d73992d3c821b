//! Upstream fetch for relay requests
//!
//! Origin IPTV servers sit behind WAFs that fingerprint header combinations
//! and rate-limit bursts, so every request goes out with the same stable
//! player identity, a jittered start, and a small retry budget for the 406
//! soft block those WAFs answer with.

use reqwest::{Client, Method, Response};
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::models::{FetchProfile, MediaFormat, StreamReference};
use crate::services::metrics;
use crate::services::stream_urls::build_origin_url;

// reqwest and axum depend on different `http` versions, so reqwest's header
// names are used for everything sent to or read from the origin.
mod reqwest_header {
    pub use reqwest::header::{
        ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONNECTION, CONTENT_LENGTH, CONTENT_RANGE,
        CONTENT_TYPE, RANGE, REFERER, USER_AGENT,
    };
}

/// Status some WAFs use for a soft block that clears on retry
const SOFT_BLOCK_STATUS: u16 = 406;

/// Range sent when the client did not ask for one
pub const DEFAULT_RANGE: &str = "bytes=0-";

/// Inclusive random delay window, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl JitterRange {
    pub const ZERO: JitterRange = JitterRange { min_ms: 0, max_ms: 0 };

    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub fn sample(&self) -> Duration {
        use rand::Rng;

        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::rng().random_range(self.min_ms..=self.max_ms))
    }
}

/// Timing and identity used for every upstream fetch
#[derive(Debug, Clone)]
pub struct RelayPolicy {
    pub user_agent: String,
    pub segment_timeout: Duration,
    pub media_timeout: Duration,
    pub max_retries: u32,
    pub segment_jitter: JitterRange,
    pub media_jitter: JitterRange,
    pub retry_jitter: JitterRange,
}

impl RelayPolicy {
    /// Whole-request budget: covers every attempt and the pauses between them
    pub fn timeout_for(&self, profile: FetchProfile) -> Duration {
        match profile {
            FetchProfile::Segment => self.segment_timeout,
            FetchProfile::Standard => self.media_timeout,
        }
    }

    pub fn jitter_for(&self, profile: FetchProfile) -> JitterRange {
        match profile {
            FetchProfile::Segment => self.segment_jitter,
            FetchProfile::Standard => self.media_jitter,
        }
    }
}

impl Default for RelayPolicy {
    fn default() -> Self {
        Self {
            user_agent: "VLC/3.0.20 LibVLC/3.0.20".to_string(),
            segment_timeout: Duration::from_secs(15),
            media_timeout: Duration::from_secs(60),
            max_retries: 2,
            segment_jitter: JitterRange::new(200, 700),
            media_jitter: JitterRange::new(1_000, 3_000),
            retry_jitter: JitterRange::new(1_200, 1_800),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMethod {
    Get,
    Head,
}

impl RelayMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayMethod::Get => "GET",
            RelayMethod::Head => "HEAD",
        }
    }

    fn to_reqwest(self) -> Method {
        match self {
            RelayMethod::Get => Method::GET,
            RelayMethod::Head => Method::HEAD,
        }
    }
}

/// One client call to the relay endpoint
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub method: RelayMethod,
    pub stream: StreamReference,
    pub range: Option<String>,
    pub referer: Option<String>,
}

impl RelayRequest {
    pub fn format(&self) -> MediaFormat {
        self.stream.format()
    }

    /// Range header sent upstream: mandatory for media, never for manifests
    pub fn upstream_range(&self) -> Option<String> {
        if self.format().is_manifest() {
            return None;
        }
        Some(
            self.range
                .clone()
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_RANGE.to_string()),
        )
    }
}

/// Retry bookkeeping for one relay request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardAttempt {
    pub attempt_number: u32,
    pub last_status_code: Option<u16>,
    pub elapsed: Duration,
}

impl ForwardAttempt {
    fn first() -> Self {
        Self {
            attempt_number: 1,
            last_status_code: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn retries(&self) -> u32 {
        self.attempt_number.saturating_sub(1)
    }
}

/// Upstream headers the streamer cares about
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamHeaders {
    pub content_length: Option<u64>,
    pub content_range: Option<String>,
    pub content_type: Option<String>,
}

impl UpstreamHeaders {
    fn from_response(response: &Response) -> Self {
        let text = |name: reqwest::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };

        Self {
            // Read the header itself: for HEAD responses the body size is 0
            content_length: text(reqwest_header::CONTENT_LENGTH).and_then(|v| v.trim().parse().ok()),
            content_range: text(reqwest_header::CONTENT_RANGE),
            content_type: text(reqwest_header::CONTENT_TYPE),
        }
    }
}

/// Successful upstream answer; the body is left unread for the streamer
#[derive(Debug)]
pub struct RelayOutcome {
    pub status: u16,
    pub headers: UpstreamHeaders,
    /// `None` for HEAD requests
    pub body: Option<Response>,
    pub attempt: ForwardAttempt,
}

/// Performs upstream fetches for relay requests
#[derive(Clone)]
pub struct RelayForwarder {
    client: Client,
    policy: RelayPolicy,
}

impl RelayForwarder {
    pub fn new(policy: RelayPolicy) -> Result<Self, RelayError> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            // Relay bytes verbatim; never let reqwest decode them
            .no_gzip()
            .build()
            .map_err(|e| RelayError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, policy })
    }

    pub fn policy(&self) -> &RelayPolicy {
        &self.policy
    }

    /// Fetch the origin media for `req`.
    ///
    /// Waits a jittered delay, then runs up to `max_retries + 1` attempts
    /// inside one shared timeout budget. Only 406 is retried; any other
    /// non-2xx status is returned at once as `UpstreamUnavailable`.
    pub async fn forward(
        &self,
        req: &RelayRequest,
        cancel: &CancellationToken,
    ) -> Result<RelayOutcome, RelayError> {
        let profile = req.format().fetch_profile();
        let url = build_origin_url(&req.stream);
        let redacted = req.stream.redact(&url);

        let jitter = self.policy.jitter_for(profile).sample();
        debug!(url = %redacted, jitter_ms = jitter.as_millis() as u64, "Delaying upstream request");
        tokio::select! {
            _ = cancel.cancelled() => return Err(RelayError::Cancelled),
            _ = sleep(jitter) => {}
        }

        let budget = self.policy.timeout_for(profile);
        let deadline = tokio::time::Instant::now() + budget;
        info!(method = req.method.as_str(), url = %redacted, "Requesting origin");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(url = %redacted, "Upstream request cancelled");
                Err(RelayError::Cancelled)
            }
            result = timeout_at(deadline, self.attempt_loop(req, &url, &redacted)) => match result {
                Ok(outcome) => outcome,
                Err(_) => {
                    metrics::UPSTREAM_TIMEOUTS.inc();
                    warn!(url = %redacted, timeout_ms = budget.as_millis() as u64, "Upstream request timed out");
                    Err(RelayError::UpstreamTimeout {
                        timeout_ms: budget.as_millis() as u64,
                    })
                }
            }
        }
    }

    async fn attempt_loop(
        &self,
        req: &RelayRequest,
        url: &str,
        redacted: &str,
    ) -> Result<RelayOutcome, RelayError> {
        let started = Instant::now();
        let mut attempt = ForwardAttempt::first();

        loop {
            let response = self.build_request(req, url).send().await.map_err(|e| {
                warn!(url = %redacted, error = %e, "Upstream request failed");
                RelayError::Network(req.stream.redact(&e.to_string()))
            })?;

            let status = response.status().as_u16();
            attempt.last_status_code = Some(status);
            attempt.elapsed = started.elapsed();

            if status == SOFT_BLOCK_STATUS && attempt.retries() < self.policy.max_retries {
                warn!(
                    url = %redacted,
                    retry = attempt.attempt_number,
                    max_retries = self.policy.max_retries,
                    "Got 406, retrying"
                );
                metrics::UPSTREAM_RETRIES.inc();
                drop(response);
                sleep(self.policy.retry_jitter.sample()).await;
                attempt.attempt_number += 1;
                continue;
            }

            if !response.status().is_success() {
                warn!(url = %redacted, status, attempts = attempt.attempt_number, "Stream failed");
                metrics::UPSTREAM_FAILURES
                    .with_label_values(&[status.to_string().as_str()])
                    .inc();
                return Err(RelayError::UpstreamUnavailable {
                    status,
                    attempts: attempt.attempt_number,
                    url: redacted.to_string(),
                });
            }

            debug!(
                url = %redacted,
                status,
                attempts = attempt.attempt_number,
                elapsed_ms = attempt.elapsed.as_millis() as u64,
                "Origin responded"
            );
            let headers = UpstreamHeaders::from_response(&response);
            let body = match req.method {
                RelayMethod::Get => Some(response),
                RelayMethod::Head => None,
            };

            return Ok(RelayOutcome {
                status,
                headers,
                body,
                attempt,
            });
        }
    }

    fn build_request(&self, req: &RelayRequest, url: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .request(req.method.to_reqwest(), url)
            .header(reqwest_header::USER_AGENT, &self.policy.user_agent)
            .header(reqwest_header::ACCEPT, req.format().accept())
            .header(reqwest_header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(reqwest_header::CONNECTION, "keep-alive")
            .header(reqwest_header::CACHE_CONTROL, "no-cache");

        if let Some(range) = req.upstream_range() {
            request = request.header(reqwest_header::RANGE, range);
        }

        if let Some(ref referer) = req.referer {
            request = request.header(reqwest_header::REFERER, referer);
        }

        request
    }
}
