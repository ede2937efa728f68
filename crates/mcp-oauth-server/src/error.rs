//! Error types for the OAuth authorization server.
//!
//! Uses `thiserror` for structured error handling. Every variant maps to an
//! RFC 6749 / RFC 6750 / RFC 7591 error code and an HTTP status; the
//! [`IntoResponse`] impl is the one place an error becomes a response.

use std::time::Duration;

use axum::{
    Json,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// Errors raised by the OAuth endpoints, stores and providers.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OAuthError {
    /// Malformed or missing required parameters.
    #[error("invalid_request: {0}")]
    InvalidRequest(String),

    /// Unknown client, reported before any client authentication took place.
    #[error("invalid_client: {0}")]
    InvalidClient(String),

    /// Client authentication failed (missing, wrong or expired secret).
    #[error("invalid_client: {0}")]
    ClientAuthenticationFailed(String),

    /// Bad, expired or reused grant (authorization code, PKCE verifier, refresh token).
    #[error("invalid_grant: {0}")]
    InvalidGrant(String),

    /// The client is not permitted to use the requested grant.
    #[error("unauthorized_client: {0}")]
    UnauthorizedClient(String),

    /// The `grant_type` is not recognized.
    #[error("unsupported_grant_type: {0}")]
    UnsupportedGrantType(String),

    /// Requested scope exceeds what the client or grant allows.
    #[error("invalid_scope: {0}")]
    InvalidScope(String),

    /// Bearer token is missing, malformed, expired or unknown.
    #[error("invalid_token: {0}")]
    InvalidToken(String),

    /// Bearer token lacks a required scope.
    #[error("insufficient_scope: {0}")]
    InsufficientScope(String),

    /// Dynamic client registration payload is invalid.
    #[error("invalid_client_metadata: {0}")]
    InvalidClientMetadata(String),

    /// Known endpoint, wrong HTTP method.
    #[error("method_not_allowed: {method} is not allowed")]
    MethodNotAllowed {
        /// The method that was used.
        method: Method,
        /// Methods the endpoint accepts.
        allowed: Vec<Method>,
    },

    /// Rate limit exceeded.
    #[error("too_many_requests: retry after {retry_after:?}")]
    TooManyRequests {
        /// Time until the current window resets.
        retry_after: Duration,
    },

    /// Unexpected or unclassified failure.
    #[error("server_error: {0}")]
    ServerError(String),
}

impl OAuthError {
    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::InvalidRequest(description.into())
    }

    /// Create an invalid grant error.
    #[must_use]
    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::InvalidGrant(description.into())
    }

    /// Create an invalid scope error.
    #[must_use]
    pub fn invalid_scope(description: impl Into<String>) -> Self {
        Self::InvalidScope(description.into())
    }

    /// Create an invalid token error.
    #[must_use]
    pub fn invalid_token(description: impl Into<String>) -> Self {
        Self::InvalidToken(description.into())
    }

    /// Create a server error.
    #[must_use]
    pub fn server(description: impl Into<String>) -> Self {
        Self::ServerError(description.into())
    }

    /// Create a rate limited error with retry-after duration.
    #[must_use]
    pub fn rate_limited(retry_after: Duration) -> Self {
        Self::TooManyRequests { retry_after }
    }

    /// Machine-readable OAuth error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidClient(_) | Self::ClientAuthenticationFailed(_) => "invalid_client",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::UnauthorizedClient(_) => "unauthorized_client",
            Self::UnsupportedGrantType(_) => "unsupported_grant_type",
            Self::InvalidScope(_) => "invalid_scope",
            Self::InvalidToken(_) => "invalid_token",
            Self::InsufficientScope(_) => "insufficient_scope",
            Self::InvalidClientMetadata(_) => "invalid_client_metadata",
            Self::MethodNotAllowed { .. } => "method_not_allowed",
            Self::TooManyRequests { .. } => "too_many_requests",
            Self::ServerError(_) => "server_error",
        }
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::InvalidRequest(s)
            | Self::InvalidClient(s)
            | Self::ClientAuthenticationFailed(s)
            | Self::InvalidGrant(s)
            | Self::UnauthorizedClient(s)
            | Self::UnsupportedGrantType(s)
            | Self::InvalidScope(s)
            | Self::InvalidToken(s)
            | Self::InsufficientScope(s)
            | Self::InvalidClientMetadata(s)
            | Self::ServerError(s) => s.clone(),
            Self::MethodNotAllowed { method, .. } => {
                format!("The method {method} is not allowed for this endpoint")
            }
            Self::TooManyRequests { .. } => {
                "You have exceeded the rate limit for this endpoint".to_string()
            }
        }
    }

    /// HTTP status used when the error is returned as a direct response.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_)
            | Self::InvalidClient(_)
            | Self::InvalidGrant(_)
            | Self::UnauthorizedClient(_)
            | Self::UnsupportedGrantType(_)
            | Self::InvalidScope(_)
            | Self::InvalidClientMetadata(_) => StatusCode::BAD_REQUEST,
            Self::ClientAuthenticationFailed(_) | Self::InvalidToken(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::InsufficientScope(_) => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Body object for this error.
    #[must_use]
    pub fn to_response_body(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.error_code().to_string(),
            error_description: Some(self.description()),
            error_uri: None,
        }
    }
}

/// OAuth error body: `{error, error_description?, error_uri?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "OAuth request failed");
        }

        let mut response = (status, Json(self.to_response_body())).into_response();
        let headers = response.headers_mut();

        match &self {
            Self::MethodNotAllowed { allowed, .. } => {
                let allow = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
                if let Ok(value) = HeaderValue::from_str(&allow) {
                    headers.insert(header::ALLOW, value);
                }
            }
            Self::TooManyRequests { retry_after } => {
                headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs(*retry_after)));
            }
            Self::ClientAuthenticationFailed(_) => {
                headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Basic"));
            }
            _ => {}
        }

        response
    }
}

/// Whole seconds for a `Retry-After` header, rounded up and never zero.
#[must_use]
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

/// Result type alias for OAuth operations.
pub type OAuthResult<T> = Result<T, OAuthError>;
