//! HLS manifest rewriting
//!
//! Every segment reference in a manifest is replaced by a relay URL so the
//! player fetches segments through the relay too. Output keeps the exact
//! line count and order of the input: directives, comments and blank lines
//! are copied byte for byte, and a line that cannot be understood is kept
//! as-is instead of being dropped.

use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

use crate::models::StreamReference;
use crate::services::stream_urls::relay_url;

lazy_static! {
    /// Trailing `.ext`, optionally followed by a query string
    static ref EXTENSION_REGEX: Regex = Regex::new(r"\.([^.?]+)(\?|$)").unwrap();
    /// Everything from the last `.ext` to the end (query string included)
    static ref EXTENSION_SUFFIX_REGEX: Regex = Regex::new(r"\.[^.?]+(\?.*)?$").unwrap();
    static ref NUMERIC_REGEX: Regex = Regex::new(r"^\d+$").unwrap();
}

/// Segments without a recognisable extension are assumed to be MPEG-TS
const DEFAULT_SEGMENT_EXTENSION: &str = "ts";

/// Segment file name split into base name and extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentName {
    pub base_name: String,
    pub extension: String,
}

impl SegmentName {
    /// Split a file name such as `12345.ts` or `chunk_7.aac?token=x`
    pub fn from_filename(filename: &str) -> Option<Self> {
        let extension = EXTENSION_REGEX
            .captures(filename)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| DEFAULT_SEGMENT_EXTENSION.to_string());

        let base_name = EXTENSION_SUFFIX_REGEX.replace(filename, "").to_string();
        if base_name.is_empty() {
            return None;
        }

        Some(Self {
            base_name,
            extension,
        })
    }
}

/// One classified manifest line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistLine<'a> {
    Comment(&'a str),
    BlankLine(&'a str),
    AbsoluteSegmentUri { raw: &'a str, segment: SegmentName },
    RelativeSegmentUri { raw: &'a str, segment: SegmentName },
    NumericSegmentId { raw: &'a str, segment: SegmentName },
    Unrecognized(&'a str),
}

impl<'a> PlaylistLine<'a> {
    /// Classify a single raw line (without its `\n`)
    pub fn classify(raw: &'a str) -> Self {
        let token = raw.trim();

        if token.is_empty() {
            return PlaylistLine::BlankLine(raw);
        }
        if raw.starts_with('#') {
            return PlaylistLine::Comment(raw);
        }

        if token.starts_with("http://") || token.starts_with("https://") {
            let filename = match Url::parse(token) {
                Ok(url) => url
                    .path_segments()
                    .and_then(|mut segments| segments.next_back())
                    .unwrap_or_default()
                    .to_string(),
                Err(e) => {
                    tracing::warn!(line = token, error = %e, "Unparseable absolute segment URI, keeping original");
                    return PlaylistLine::Unrecognized(raw);
                }
            };

            return match SegmentName::from_filename(&filename) {
                Some(segment) => PlaylistLine::AbsoluteSegmentUri { raw, segment },
                None => PlaylistLine::Unrecognized(raw),
            };
        }

        if token.contains('.') {
            let filename = token.rsplit('/').next().unwrap_or(token);
            return match SegmentName::from_filename(filename) {
                Some(segment) => PlaylistLine::RelativeSegmentUri { raw, segment },
                None => PlaylistLine::Unrecognized(raw),
            };
        }

        if NUMERIC_REGEX.is_match(token) {
            return PlaylistLine::NumericSegmentId {
                raw,
                segment: SegmentName {
                    base_name: token.to_string(),
                    extension: DEFAULT_SEGMENT_EXTENSION.to_string(),
                },
            };
        }

        PlaylistLine::Unrecognized(raw)
    }

    pub fn raw(&self) -> &'a str {
        match self {
            PlaylistLine::Comment(raw)
            | PlaylistLine::BlankLine(raw)
            | PlaylistLine::Unrecognized(raw) => raw,
            PlaylistLine::AbsoluteSegmentUri { raw, .. }
            | PlaylistLine::RelativeSegmentUri { raw, .. }
            | PlaylistLine::NumericSegmentId { raw, .. } => raw,
        }
    }

    pub fn segment(&self) -> Option<&SegmentName> {
        match self {
            PlaylistLine::AbsoluteSegmentUri { segment, .. }
            | PlaylistLine::RelativeSegmentUri { segment, .. }
            | PlaylistLine::NumericSegmentId { segment, .. } => Some(segment),
            _ => None,
        }
    }
}

/// Rewrite every segment reference of `body` into a relay URL.
///
/// `stream` supplies media type, credentials and origin server; the segment's
/// own base name and extension replace the stream id and extension.
pub fn rewrite_playlist(
    body: &str,
    stream: &StreamReference,
    relay_host: &str,
    relay_scheme: &str,
) -> String {
    let mut rewritten = 0usize;
    let mut kept = 0usize;

    let lines: Vec<String> = body
        .split('\n')
        .map(|raw| {
            let line = PlaylistLine::classify(raw);
            match line.segment() {
                Some(segment) => {
                    rewritten += 1;
                    let target = stream.with_stream_id(&segment.base_name, &segment.extension);
                    let mut out = relay_url(&target, relay_scheme, relay_host);
                    if raw.ends_with('\r') {
                        out.push('\r');
                    }
                    out
                }
                None => {
                    if let PlaylistLine::Unrecognized(token) = &line {
                        kept += 1;
                        tracing::debug!(line = token.trim(), "Unknown segment format, keeping original");
                    }
                    line.raw().to_string()
                }
            }
        })
        .collect();

    tracing::debug!(
        lines = lines.len(),
        rewritten,
        unrecognized = kept,
        "Manifest rewritten"
    );

    lines.join("\n")
}
