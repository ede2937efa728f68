//! OAuth 2.0 endpoint handlers.
//!
//! Implements:
//! - RFC 6749: Authorization Code and Refresh Token grants
//! - RFC 7636: PKCE (S256)
//! - RFC 7591: Dynamic Client Registration
//! - RFC 7009: Token Revocation
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 9728: OAuth Protected Resource Metadata
//!
//! Handlers take the shared [`OAuthState`] and the raw request and return
//! `OAuthResult<Response>`; the router turns errors into responses.

pub mod authorize;
pub mod metadata;
pub mod register;
pub mod revoke;
pub mod token;

use std::sync::Arc;

use axum::{
    extract::{FromRequest, Request},
    http::{HeaderValue, header},
    response::Response,
};
use serde::de::DeserializeOwned;

use super::provider::OAuthServerProvider;
use crate::clock::{Clock, RandomSource};
use crate::config::ServerConfig;
use crate::error::{OAuthError, OAuthResult};

/// Everything the handlers share. Immutable once built.
#[derive(Clone)]
pub struct OAuthState {
    pub config: Arc<ServerConfig>,
    pub provider: Arc<dyn OAuthServerProvider>,
    pub clock: Arc<dyn Clock>,
    pub random: Arc<dyn RandomSource>,
}

impl OAuthState {
    /// Whether `/register` is served.
    #[must_use]
    pub fn registration_enabled(&self) -> bool {
        self.provider.clients_store().supports_registration()
    }

    /// Whether `/revoke` is served.
    #[must_use]
    pub fn revocation_enabled(&self) -> bool {
        self.provider.supports_revocation()
    }
}

impl std::fmt::Debug for OAuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthState").field("issuer", &self.config.issuer_url).finish()
    }
}

/// Parse a form body; rejections become `invalid_request`.
async fn parse_form<T: DeserializeOwned>(request: Request) -> OAuthResult<T> {
    axum::Form::<T>::from_request(request, &())
        .await
        .map(|axum::Form(form)| form)
        .map_err(|rejection| OAuthError::invalid_request(rejection.body_text()))
}

/// `Cache-Control: no-store` (and `Pragma: no-cache`) on credential responses.
fn no_store(response: &mut Response) {
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
}
