use std::env;
use std::time::Duration;

use crate::services::forwarder::{JitterRange, RelayPolicy};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub port: u16,
    pub node_env: String,

    // Relay addressing
    pub public_host: Option<String>,
    pub public_scheme: Option<String>,
    pub upgrade_origin_https: bool,

    // Upstream fetch policy
    pub user_agent: String,
    pub segment_timeout_ms: u64,
    pub media_timeout_ms: u64,
    pub max_retries: u32,
    pub segment_jitter: JitterRange,
    pub media_jitter: JitterRange,
    pub retry_jitter: JitterRange,

    // Xtream metadata API
    pub xtream_timeout_secs: u64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            // Server
            port: env_or("PORT", 5000),
            node_env: env::var("NODE_ENV").unwrap_or_else(|_| "development".to_string()),

            // Relay addressing
            public_host: env_opt("RELAY_PUBLIC_HOST"),
            public_scheme: env_opt("RELAY_PUBLIC_SCHEME"),
            upgrade_origin_https: env_or("UPGRADE_ORIGIN_HTTPS", true),

            // Use VLC user agent to avoid IPTV server blocks
            user_agent: env::var("USER_AGENT")
                .unwrap_or_else(|_| "VLC/3.0.20 LibVLC/3.0.20".to_string()),
            segment_timeout_ms: env_or("SEGMENT_TIMEOUT_MS", 15_000), // 15 seconds
            media_timeout_ms: env_or("MEDIA_TIMEOUT_MS", 60_000),     // 1 minute
            max_retries: env_or("RELAY_MAX_RETRIES", 2),
            segment_jitter: JitterRange::new(
                env_or("SEGMENT_JITTER_MIN_MS", 200),
                env_or("SEGMENT_JITTER_MAX_MS", 700),
            ),
            media_jitter: JitterRange::new(
                env_or("MEDIA_JITTER_MIN_MS", 1_000),
                env_or("MEDIA_JITTER_MAX_MS", 3_000),
            ),
            retry_jitter: JitterRange::new(
                env_or("RETRY_JITTER_MIN_MS", 1_200),
                env_or("RETRY_JITTER_MAX_MS", 1_800),
            ),

            xtream_timeout_secs: env_or("XTREAM_TIMEOUT_SECS", 30),
        }
    }

    /// Upstream fetch policy derived from this configuration
    pub fn relay_policy(&self) -> RelayPolicy {
        RelayPolicy {
            user_agent: self.user_agent.clone(),
            segment_timeout: Duration::from_millis(self.segment_timeout_ms),
            media_timeout: Duration::from_millis(self.media_timeout_ms),
            max_retries: self.max_retries,
            segment_jitter: self.segment_jitter,
            media_jitter: self.media_jitter,
            retry_jitter: self.retry_jitter,
        }
    }
}
