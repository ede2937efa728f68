//! Bearer token authentication (RFC 6750).
//!
//! [`BearerAuthenticator`] checks `Authorization: Bearer <token>` against a
//! [`TokenVerifier`]. It never builds a success response: on success the
//! caller receives the token's [`AuthInfo`] and decides how to proceed.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::provider::TokenVerifier;
use crate::clock::Clock;
use crate::error::OAuthError;
use crate::models::AuthInfo;

/// Authenticates requests carrying a bearer token.
#[derive(Clone)]
pub struct BearerAuthenticator {
    verifier: Arc<dyn TokenVerifier>,
    clock: Arc<dyn Clock>,
    required_scopes: Vec<String>,
    resource_metadata_url: Option<String>,
}

impl BearerAuthenticator {
    #[must_use]
    pub fn new(verifier: Arc<dyn TokenVerifier>, clock: Arc<dyn Clock>) -> Self {
        Self { verifier, clock, required_scopes: Vec::new(), resource_metadata_url: None }
    }

    /// Scopes every token must carry.
    #[must_use]
    pub fn with_required_scopes(mut self, scopes: Vec<String>) -> Self {
        self.required_scopes = scopes;
        self
    }

    /// Advertise the protected-resource metadata URL in `WWW-Authenticate`.
    #[must_use]
    pub fn with_resource_metadata_url(mut self, url: impl Into<String>) -> Self {
        self.resource_metadata_url = Some(url.into());
        self
    }

    /// Authenticate a request from its headers.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthInfo, BearerError> {
        self.check(headers).await.map_err(|error| BearerError {
            error,
            resource_metadata_url: self.resource_metadata_url.clone(),
        })
    }

    async fn check(&self, headers: &HeaderMap) -> Result<AuthInfo, OAuthError> {
        let token = extract_bearer(headers)?;

        let info = self.verifier.verify_access_token(token).await.map_err(classify)?;

        match info.expires_at {
            Some(expires_at) if expires_at >= self.clock.now_secs() => {}
            Some(_) => return Err(OAuthError::invalid_token("Token has expired")),
            None => return Err(OAuthError::invalid_token("Token has no expiration time")),
        }

        if !info.has_scopes(&self.required_scopes) {
            return Err(OAuthError::InsufficientScope("Insufficient scope".to_string()));
        }

        Ok(info)
    }
}

impl std::fmt::Debug for BearerAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuthenticator")
            .field("required_scopes", &self.required_scopes)
            .field("resource_metadata_url", &self.resource_metadata_url)
            .finish()
    }
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, OAuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| OAuthError::invalid_token("Missing Authorization header"))?
        .to_str()
        .map_err(|_| OAuthError::invalid_token("Malformed Authorization header"))?;

    let (scheme, token) = value.split_once(' ').unwrap_or((value, ""));
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(OAuthError::invalid_token(
            "Invalid Authorization header format, expected 'Bearer TOKEN'",
        ));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(OAuthError::invalid_token("Missing bearer token"));
    }
    Ok(token)
}

/// Verifier failures keep their kind only for `invalid_token` and
/// `insufficient_scope`; anything else is a server error.
fn classify(err: OAuthError) -> OAuthError {
    match err {
        OAuthError::InvalidToken(_) | OAuthError::InsufficientScope(_) => err,
        other => OAuthError::server(other.description()),
    }
}

/// `Bearer error="..", error_description=".."[, resource_metadata=".."]`
#[must_use]
pub fn www_authenticate(error: &OAuthError, resource_metadata_url: Option<&str>) -> Option<HeaderValue> {
    let mut value = format!(
        r#"Bearer error="{}", error_description="{}""#,
        error.error_code(),
        error.description().escape_default()
    );
    if let Some(url) = resource_metadata_url {
        value.push_str(&format!(r#", resource_metadata="{}""#, url.escape_default()));
    }
    HeaderValue::try_from(value).ok()
}

/// A failed bearer authentication, rendered with `WWW-Authenticate` on 401/403.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerError {
    pub error: OAuthError,
    pub resource_metadata_url: Option<String>,
}

impl IntoResponse for BearerError {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        let challenge = matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
            .then(|| www_authenticate(&self.error, self.resource_metadata_url.as_deref()))
            .flatten();

        let mut response = self.error.into_response();
        if let Some(value) = challenge {
            response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}

/// Middleware guarding a route with a [`BearerAuthenticator`].
///
/// On success the token's [`AuthInfo`] is inserted into the request
/// extensions for downstream handlers.
///
/// ```ignore
/// let app = Router::new()
///     .route("/mcp", post(handler))
///     .layer(axum::middleware::from_fn_with_state(auth, require_bearer_auth));
/// ```
pub async fn require_bearer_auth(
    State(auth): State<Arc<BearerAuthenticator>>,
    mut request: Request,
    next: Next,
) -> Response {
    match auth.authenticate(request.headers()).await {
        Ok(info) => {
            request.extensions_mut().insert(info);
            next.run(request).await
        }
        Err(err) => {
            tracing::debug!(error = %err.error, "Bearer authentication failed");
            err.into_response()
        }
    }
}
