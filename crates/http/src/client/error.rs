//! Client error types

use portcullis_core::types::ErrorBody;
use std::sync::Arc;
use thiserror::Error;

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or request error
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server returned an error status
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Authentication failed (401)
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Forbidden (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Request rejected by validation (other 4xx)
    #[error("Bad request: {message}")]
    BadRequest { status: u16, message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Exchanging the refresh token failed; the session has been cleared
    #[error("Token refresh failed: {0}")]
    RefreshFailed(#[source] Arc<ClientError>),

    /// The session was cleared while the request was in flight
    #[error("Session was cleared while the request was in flight")]
    SessionCleared,
}

impl ClientError {
    /// Create error from HTTP status code and raw response body
    ///
    /// A JSON body with a `message` (or `error`) field contributes that text;
    /// otherwise the raw body, or the status reason when the body is empty.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(ErrorBody::into_message)
            .or_else(|| {
                let trimmed = body.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .unwrap_or_else(|| status.to_string());

        match status.as_u16() {
            401 => Self::AuthenticationFailed(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            code @ 400..=499 => Self::BadRequest {
                status: code,
                message,
            },
            code => Self::ServerError {
                status: code,
                message,
            },
        }
    }

    /// Build the error for a non-success response, consuming its body
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Self::from_status(status, &body)
    }

    /// HTTP status behind this error, if it came from a response
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::AuthenticationFailed(_) => Some(401),
            Self::Forbidden(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::BadRequest { status, .. } | Self::ServerError { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            Self::RefreshFailed(inner) => inner.status(),
            _ => None,
        }
    }

    /// 401/403 responses and failed refreshes: the session is no longer usable
    pub const fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed(_)
                | Self::Forbidden(_)
                | Self::RefreshFailed(_)
                | Self::SessionCleared
        )
    }

    /// 401/403 straight from a response, the trigger of the refresh protocol
    pub(crate) const fn is_refreshable(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_) | Self::Forbidden(_))
    }

    /// Transport-level failure (unreachable host, timeout, broken connection)
    pub fn is_network(&self) -> bool {
        match self {
            Self::Request(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Self::RefreshFailed(inner) => inner.is_network(),
            _ => false,
        }
    }

    /// Message the service attached to a rejected request
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::AuthenticationFailed(message)
            | Self::Forbidden(message)
            | Self::NotFound(message)
            | Self::BadRequest { message, .. }
            | Self::ServerError { message, .. } => Some(message),
            Self::RefreshFailed(inner) => inner.server_message(),
            _ => None,
        }
    }
}
