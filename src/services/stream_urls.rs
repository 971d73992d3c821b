//! Origin and relay URL construction
//!
//! Xtream providers serve media at a fixed layout:
//! ```text
//! {server}/{live|movie|series}/{username}/{password}/{stream_id}.{ext}
//! ```
//! The relay mirrors that layout under `/relay` and carries the provider
//! base URL in the `origin` query parameter, so any relay URL holds enough
//! information to re-fetch the exact media later without server-side state.

use urlencoding::encode;

use crate::models::StreamReference;

/// Path prefix the relay is mounted at
pub const RELAY_PREFIX: &str = "/relay";

/// Build the origin media URL for a stream reference
pub fn build_origin_url(stream: &StreamReference) -> String {
    format!(
        "{}/{}/{}/{}/{}.{}",
        stream.provider_base_url(),
        stream.media_type(),
        stream.username(),
        stream.password(),
        stream.stream_id(),
        stream.extension()
    )
}

/// Relative relay URL (`/relay/...?...`), used by browser clients on the same host
pub fn relay_path(stream: &StreamReference) -> String {
    format!(
        "{}/{}/{}/{}/{}.{}?origin={}",
        RELAY_PREFIX,
        stream.media_type(),
        encode(stream.username()),
        encode(stream.password()),
        encode(stream.stream_id()),
        stream.extension(),
        encode(stream.provider_base_url())
    )
}

/// Absolute relay URL, used when rewriting manifests
pub fn relay_url(stream: &StreamReference, scheme: &str, host: &str) -> String {
    format!("{}://{}{}", scheme, host, relay_path(stream))
}
