use serde::Serialize;
use thiserror::Error;
use url::Url;

use super::media::{MediaFormat, MediaType};

/// Why a stream reference could not be built
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamRefError {
    #[error("Server URL is required")]
    MissingServer,
    #[error("Server URL must be an absolute http(s) URL: {0}")]
    InvalidServer(String),
    #[error("{0} is required")]
    MissingField(&'static str),
}

/// Identifies one piece of origin media: who, where, what and in which container.
///
/// Built once per playback or relay request and never mutated; derived
/// references (another extension, another segment id) are new values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamReference {
    provider_base_url: String,
    username: String,
    #[serde(skip_serializing)]
    password: String,
    stream_id: String,
    media_type: MediaType,
    container_extension: Option<String>,
}

impl StreamReference {
    /// Validate and build a reference.
    ///
    /// `base_url` must be an absolute `http` or `https` URL; a trailing slash
    /// is dropped so URL joins never produce `//`.
    pub fn new(
        base_url: &str,
        username: &str,
        password: &str,
        stream_id: &str,
        media_type: MediaType,
        container_extension: Option<&str>,
    ) -> Result<Self, StreamRefError> {
        let base = base_url.trim();
        if base.is_empty() {
            return Err(StreamRefError::MissingServer);
        }

        let parsed = Url::parse(base).map_err(|_| StreamRefError::InvalidServer(base.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(StreamRefError::InvalidServer(base.to_string()));
        }

        if username.is_empty() {
            return Err(StreamRefError::MissingField("username"));
        }
        if password.is_empty() {
            return Err(StreamRefError::MissingField("password"));
        }
        if stream_id.is_empty() {
            return Err(StreamRefError::MissingField("streamId"));
        }

        let container_extension = container_extension
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty());

        Ok(Self {
            provider_base_url: base.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            stream_id: stream_id.to_string(),
            media_type,
            container_extension,
        })
    }

    pub fn provider_base_url(&self) -> &str {
        &self.provider_base_url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    /// Effective container extension.
    ///
    /// An explicit extension always wins. Without one, live streams default to
    /// MPEG-TS and movies/series to MP4.
    pub fn extension(&self) -> &str {
        match (&self.container_extension, self.media_type) {
            (Some(ext), _) => ext,
            (None, MediaType::Live) => "ts",
            (None, _) => "mp4",
        }
    }

    pub fn format(&self) -> MediaFormat {
        MediaFormat::from_extension(self.extension())
    }

    /// Same stream in another container
    pub fn with_extension(&self, extension: &str) -> Self {
        Self {
            container_extension: Some(extension.trim_start_matches('.').to_ascii_lowercase()),
            ..self.clone()
        }
    }

    /// Sibling media (e.g. a manifest segment) under the same credentials
    pub fn with_stream_id(&self, stream_id: &str, extension: &str) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            container_extension: Some(extension.trim_start_matches('.').to_ascii_lowercase()),
            ..self.clone()
        }
    }

    /// Same reference with an `http://` provider upgraded to `https://`
    pub fn upgraded_to_https(&self) -> Self {
        match self.provider_base_url.strip_prefix("http://") {
            Some(rest) => Self {
                provider_base_url: format!("https://{}", rest),
                ..self.clone()
            },
            None => self.clone(),
        }
    }

    /// Hide the password in anything that gets logged
    pub fn redact(&self, text: &str) -> String {
        text.replace(&format!("/{}/", self.password), "/***/")
    }
}
