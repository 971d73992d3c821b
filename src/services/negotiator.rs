//! Client playback negotiation
//!
//! A player gets an ordered list of relay URLs for one stream and walks it
//! until something plays. The walk is an explicit state machine:
//!
//! ```text
//! Idle -> Loading(0) -> Loading(1) -> ... -> Playing
//!                                        \-> Failed
//! ```
//!
//! Every load attempt carries a monotonically increasing token. Events for
//! anything but the current token are dropped, so a slow attempt that
//! resolves after a manual retry cannot overwrite the newer attempt.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::{MediaFormat, StreamReference};
use crate::services::stream_urls::{build_origin_url, relay_path};
use crate::services::xtream::XtreamCredentials;

/// How long the "tap to unmute" hint stays on screen
pub const UNMUTE_HINT_DURATION: Duration = Duration::from_secs(4);

/// How a candidate gets handed to the browser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackMechanism {
    /// Adaptive-streaming library feeding MSE
    HlsLibrary,
    /// The browser's own HLS support
    NativeHls,
    /// Plain `src` assignment on the media element
    Direct,
}

/// What the browser can do with HLS
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerCapabilities {
    pub native_hls: bool,
    pub hls_library: bool,
}

impl PlayerCapabilities {
    pub fn mechanism_for(&self, format: &MediaFormat) -> PlaybackMechanism {
        if !format.is_manifest() {
            return PlaybackMechanism::Direct;
        }
        if self.native_hls {
            PlaybackMechanism::NativeHls
        } else if self.hls_library {
            PlaybackMechanism::HlsLibrary
        } else {
            PlaybackMechanism::Direct
        }
    }
}

/// One format to try, as a relay URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateStreamUrl {
    pub url: String,
    pub format_label: String,
    pub description: String,
    pub extension_hint: String,
    #[serde(skip)]
    pub format: MediaFormat,
    #[serde(skip)]
    pub stream: StreamReference,
}

impl CandidateStreamUrl {
    fn new(stream: &StreamReference, extension: &str, description: String) -> Self {
        let stream = stream.with_extension(extension);
        let format = stream.format();
        Self {
            url: relay_path(&stream),
            format_label: format.label(),
            description,
            extension_hint: format.extension().to_string(),
            format,
            stream,
        }
    }

    /// Origin URL, for players that talk to the provider directly
    pub fn direct_url(&self) -> String {
        build_origin_url(&self.stream)
    }
}

/// Ordered candidates for a stream. Never empty.
///
/// Live: HLS, then raw MPEG-TS, then MP4. VOD: the container the provider
/// lists, then MP4, then MKV.
pub fn build_candidates(stream: &StreamReference) -> Vec<CandidateStreamUrl> {
    if stream.media_type().is_live() {
        return vec![
            CandidateStreamUrl::new(stream, "m3u8", "HLS adaptive stream".to_string()),
            CandidateStreamUrl::new(stream, "ts", "Raw MPEG-TS stream".to_string()),
            CandidateStreamUrl::new(stream, "mp4", "MP4 fallback".to_string()),
        ];
    }

    let original = stream.extension().to_string();
    let mut candidates = vec![CandidateStreamUrl::new(
        stream,
        &original,
        format!("Original format ({})", original.to_ascii_uppercase()),
    )];

    for (ext, description) in [
        ("mp4", "MP4 container"),
        ("mkv", "MKV container (limited browser support)"),
    ] {
        if ext != original {
            candidates.push(CandidateStreamUrl::new(stream, ext, description.to_string()));
        }
    }
    candidates
}

/// Identifies one load attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AttemptToken(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loading { index: usize, token: AttemptToken },
    Playing { index: usize, token: AttemptToken },
    Failed { attempted: Vec<String> },
}

/// Why a candidate was abandoned
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    #[error("Media decode error: {0}")]
    Decode(String),
    #[error("Manifest load error: {0}")]
    ManifestLoad(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Format not supported: {0}")]
    Unsupported(String),
    #[error("Load timed out after {0:?}")]
    LoadTimeout(Duration),
}

/// Everything a player needs to run one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadAttempt {
    pub token: AttemptToken,
    pub index: usize,
    pub candidate: CandidateStreamUrl,
    pub mechanism: PlaybackMechanism,
    pub start_delay: Duration,
    pub load_timeout: Duration,
    pub muted: bool,
}

/// Transient hint shown while playing muted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnmuteHint {
    pub visible_for: Duration,
}

/// What to do after a fatal error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fallback {
    Next(LoadAttempt),
    Exhausted { attempted: Vec<String> },
}

/// What to do after the browser blocked autoplay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoplayRecovery {
    RetryMuted(LoadAttempt),
    AwaitUserGesture,
}

/// Ways out when nothing plays in the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalPlayerLinks {
    pub direct_urls: Vec<String>,
    pub vlc_deep_link: String,
    pub m3u_url: String,
}

/// Candidate walk for one stream
pub struct PlaybackNegotiator {
    stream: StreamReference,
    capabilities: PlayerCapabilities,
    candidates: Vec<CandidateStreamUrl>,
    state: PlaybackState,
    next_token: u64,
    muted: bool,
    failures: Vec<(String, PlaybackError)>,
    unmute_hint: Option<UnmuteHint>,
}

impl PlaybackNegotiator {
    pub fn new(stream: StreamReference, capabilities: PlayerCapabilities) -> Self {
        let candidates = build_candidates(&stream);
        Self {
            stream,
            capabilities,
            candidates,
            state: PlaybackState::Idle,
            next_token: 0,
            muted: true,
            failures: Vec::new(),
            unmute_hint: None,
        }
    }

    pub fn candidates(&self) -> &[CandidateStreamUrl] {
        &self.candidates
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn unmute_hint(&self) -> Option<UnmuteHint> {
        self.unmute_hint
    }

    /// Errors recorded for each abandoned candidate, in order
    pub fn failures(&self) -> &[(String, PlaybackError)] {
        &self.failures
    }

    /// Begin from the first candidate. Also serves as the manual retry.
    pub fn start(&mut self) -> LoadAttempt {
        self.muted = true;
        self.failures.clear();
        self.unmute_hint = None;
        self.load(0)
    }

    /// User unmuted (or otherwise interacted with) the player
    pub fn unmute(&mut self) {
        self.muted = false;
        self.unmute_hint = None;
    }

    fn load(&mut self, index: usize) -> LoadAttempt {
        self.next_token += 1;
        let token = AttemptToken(self.next_token);
        self.state = PlaybackState::Loading { index, token };

        let candidate = self.candidates[index].clone();
        let (start_delay, load_timeout) = candidate.format.playback_timing();
        let mechanism = self.capabilities.mechanism_for(&candidate.format);

        info!(
            format = %candidate.format_label,
            index,
            mechanism = ?mechanism,
            "Trying playback candidate"
        );

        LoadAttempt {
            token,
            index,
            candidate,
            mechanism,
            start_delay,
            load_timeout,
            muted: self.muted,
        }
    }

    /// Index of the loading attempt `token` belongs to, if it is current
    fn current(&self, token: AttemptToken) -> Option<usize> {
        match self.state {
            PlaybackState::Loading { index, token: current } if current == token => Some(index),
            _ => {
                debug!(token = token.0, "Ignoring event for stale attempt");
                None
            }
        }
    }

    /// Playback began. Returns the unmute hint when playing muted.
    pub fn on_playing(&mut self, token: AttemptToken) -> Option<UnmuteHint> {
        let index = self.current(token)?;
        self.state = PlaybackState::Playing { index, token };
        info!(format = %self.candidates[index].format_label, "Playback started");

        self.unmute_hint = self.muted.then_some(UnmuteHint {
            visible_for: UNMUTE_HINT_DURATION,
        });
        self.unmute_hint
    }

    /// The current candidate cannot play; move on or give up
    pub fn on_fatal_error(&mut self, token: AttemptToken, error: PlaybackError) -> Option<Fallback> {
        let index = self.current(token)?;
        let label = self.candidates[index].format_label.clone();
        warn!(format = %label, error = %error, "Playback candidate failed");
        self.failures.push((label, error));

        if index + 1 < self.candidates.len() {
            return Some(Fallback::Next(self.load(index + 1)));
        }

        let attempted = self.attempted_labels();
        warn!(attempted = ?attempted, "All playback candidates failed");
        self.state = PlaybackState::Failed {
            attempted: attempted.clone(),
        };
        Some(Fallback::Exhausted { attempted })
    }

    /// The browser refused to autoplay the current candidate
    pub fn on_autoplay_rejected(&mut self, token: AttemptToken) -> Option<AutoplayRecovery> {
        let index = self.current(token)?;
        if self.muted {
            info!("Muted autoplay blocked, waiting for user gesture");
            return Some(AutoplayRecovery::AwaitUserGesture);
        }

        self.muted = true;
        Some(AutoplayRecovery::RetryMuted(self.load(index)))
    }

    /// Labels of every candidate tried so far
    pub fn attempted_labels(&self) -> Vec<String> {
        self.failures.iter().map(|(label, _)| label.clone()).collect()
    }

    pub fn escape_hatch(&self) -> ExternalPlayerLinks {
        external_player_links(&self.stream, &self.candidates)
    }
}

/// Direct origin URLs, a VLC deep link and the provider's M3U
pub fn external_player_links(
    stream: &StreamReference,
    candidates: &[CandidateStreamUrl],
) -> ExternalPlayerLinks {
    let direct_urls: Vec<String> = candidates.iter().map(|c| c.direct_url()).collect();
    let first = direct_urls
        .first()
        .cloned()
        .unwrap_or_else(|| build_origin_url(stream));

    ExternalPlayerLinks {
        vlc_deep_link: format!("vlc://{}", first),
        direct_urls,
        m3u_url: XtreamCredentials::from_stream(stream).m3u_url(),
    }
}

/// How an engine attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    Fatal(PlaybackError),
    AutoplayRejected,
}

/// A media element (or anything standing in for one) that can try a candidate
#[async_trait]
pub trait PlaybackEngine: Send {
    /// Resolve once playback has begun
    async fn load(&mut self, attempt: &LoadAttempt) -> Result<(), EngineError>;
}

/// Run the negotiator against `engine` until something plays, every
/// candidate fails, or a user gesture is needed
pub async fn drive<E: PlaybackEngine>(
    negotiator: &mut PlaybackNegotiator,
    engine: &mut E,
) -> PlaybackState {
    let mut attempt = negotiator.start();

    loop {
        tokio::time::sleep(attempt.start_delay).await;

        let result = match tokio::time::timeout(attempt.load_timeout, engine.load(&attempt)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Fatal(PlaybackError::LoadTimeout(attempt.load_timeout))),
        };

        match result {
            Ok(()) => {
                negotiator.on_playing(attempt.token);
                break;
            }
            Err(EngineError::Fatal(error)) => match negotiator.on_fatal_error(attempt.token, error) {
                Some(Fallback::Next(next)) => attempt = next,
                _ => break,
            },
            Err(EngineError::AutoplayRejected) => {
                match negotiator.on_autoplay_rejected(attempt.token) {
                    Some(AutoplayRecovery::RetryMuted(next)) => attempt = next,
                    _ => break,
                }
            }
        }
    }

    negotiator.state().clone()
}
