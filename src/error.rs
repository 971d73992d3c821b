use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::models::StreamRefError;

/// Non-standard status used when the client went away before we answered
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Relay failures, each mapped to a structured HTTP response
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Stream not available")]
    UpstreamUnavailable {
        status: u16,
        attempts: u32,
        url: String,
    },

    #[error("Request timeout - stream took too long to respond")]
    UpstreamTimeout { timeout_ms: u64 },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Failed to reach origin server: {0}")]
    Network(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            RelayError::UpstreamUnavailable { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            RelayError::UpstreamTimeout { .. } => StatusCode::REQUEST_TIMEOUT,
            RelayError::Cancelled => {
                StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_REQUEST)
            }
            RelayError::Network(_) => StatusCode::BAD_GATEWAY,
            RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            RelayError::UpstreamUnavailable {
                status,
                attempts,
                url,
            } => Some(serde_json::json!({
                "details": format!("Server returned {}", status),
                "attempts": attempts,
                "url": url,
            })),
            RelayError::UpstreamTimeout { timeout_ms } => Some(serde_json::json!({
                "details": format!("No response within {}ms", timeout_ms),
            })),
            _ => None,
        }
    }
}

impl From<StreamRefError> for RelayError {
    fn from(err: StreamRefError) -> Self {
        RelayError::InvalidRequest(err.to_string())
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let mut body = serde_json::json!({ "error": self.to_string() });
        if let (Some(extra), Some(obj)) = (self.details(), body.as_object_mut()) {
            if let Some(fields) = extra.as_object() {
                for (key, value) in fields {
                    obj.insert(key.clone(), value.clone());
                }
            }
        }

        let mut response = (status, Json(body)).into_response();
        // Browsers must be able to read relay errors cross-origin
        response.headers_mut().insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            RelayError::InvalidRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RelayError::MethodNotAllowed.status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            RelayError::UpstreamTimeout { timeout_ms: 15_000 }.status_code(),
            StatusCode::REQUEST_TIMEOUT
        );
        assert_eq!(RelayError::Cancelled.status_code().as_u16(), 499);
        assert_eq!(
            RelayError::Network("refused".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_upstream_status_is_mirrored() {
        let err = RelayError::UpstreamUnavailable {
            status: 404,
            attempts: 1,
            url: "http://o/live/u/***/1.ts".into(),
        };
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
    }

    #[test]
    fn test_stream_ref_errors_are_bad_requests() {
        let err: RelayError = StreamRefError::MissingServer.into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Server URL is required");
    }
}
