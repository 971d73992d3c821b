use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Xtream media section a stream lives under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Live,
    Movie,
    Series,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Live => "live",
            MediaType::Movie => "movie",
            MediaType::Series => "series",
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, MediaType::Live)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "live" => Ok(MediaType::Live),
            "movie" | "vod" => Ok(MediaType::Movie),
            "series" => Ok(MediaType::Series),
            other => Err(format!(
                "Invalid media type '{}'. Use: live, movie, or series",
                other
            )),
        }
    }
}

/// Upstream fetch profile, selects jitter and timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchProfile {
    /// Live segments: short jitter, short timeout
    Segment,
    /// Everything else
    Standard,
}

/// Container/protocol a relay request or playback candidate refers to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MediaFormat {
    Hls,
    TransportStream,
    Mp4,
    Mkv,
    /// Any other container, kept as the lowercase extension
    Original(String),
}

impl MediaFormat {
    /// Classify an extension (case-insensitive, leading dot tolerated)
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "m3u8" => MediaFormat::Hls,
            "ts" => MediaFormat::TransportStream,
            "mp4" => MediaFormat::Mp4,
            "mkv" => MediaFormat::Mkv,
            _ => MediaFormat::Original(ext),
        }
    }

    pub fn extension(&self) -> &str {
        match self {
            MediaFormat::Hls => "m3u8",
            MediaFormat::TransportStream => "ts",
            MediaFormat::Mp4 => "mp4",
            MediaFormat::Mkv => "mkv",
            MediaFormat::Original(ext) => ext,
        }
    }

    /// Closed set of names for metric labels; every unknown container is "other"
    pub fn metric_label(&self) -> &'static str {
        match self {
            MediaFormat::Hls => "hls",
            MediaFormat::TransportStream => "ts",
            MediaFormat::Mp4 => "mp4",
            MediaFormat::Mkv => "mkv",
            MediaFormat::Original(_) => "other",
        }
    }

    pub fn content_type(&self) -> String {
        match self {
            MediaFormat::Hls => "application/vnd.apple.mpegurl".to_string(),
            MediaFormat::TransportStream => "video/mp2t".to_string(),
            MediaFormat::Mp4 => "video/mp4".to_string(),
            MediaFormat::Mkv => "video/x-matroska".to_string(),
            MediaFormat::Original(ext) => format!("video/{}", ext),
        }
    }

    /// Short label shown to users while negotiating playback
    pub fn label(&self) -> String {
        match self {
            MediaFormat::Hls => "HLS".to_string(),
            MediaFormat::TransportStream => "MPEG-TS".to_string(),
            MediaFormat::Mp4 => "MP4".to_string(),
            MediaFormat::Mkv => "MKV".to_string(),
            MediaFormat::Original(ext) => ext.to_ascii_uppercase(),
        }
    }

    pub fn is_manifest(&self) -> bool {
        matches!(self, MediaFormat::Hls)
    }

    pub fn fetch_profile(&self) -> FetchProfile {
        match self {
            MediaFormat::TransportStream => FetchProfile::Segment,
            _ => FetchProfile::Standard,
        }
    }

    /// Accept header sent upstream
    pub fn accept(&self) -> &'static str {
        if self.is_manifest() {
            "application/vnd.apple.mpegurl,*/*"
        } else {
            "*/*"
        }
    }

    /// Delay before a player starts on this format, and how long it may take to load
    pub fn playback_timing(&self) -> (Duration, Duration) {
        match self {
            MediaFormat::Hls => (Duration::ZERO, Duration::from_secs(15)),
            MediaFormat::TransportStream => (Duration::from_millis(500), Duration::from_secs(20)),
            _ => (Duration::from_millis(1_000), Duration::from_secs(30)),
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
