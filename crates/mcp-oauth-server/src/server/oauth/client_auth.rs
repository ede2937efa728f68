//! Client authentication shared by `/token` and `/revoke`.
//!
//! Credentials come from the form body (`client_secret_post`, or `none` for
//! public clients) or, when the body carries no `client_id`, from HTTP Basic
//! (`client_secret_basic`).

use axum::http::HeaderMap;
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Basic};

use super::pkce::constant_time_eq;
use super::store::ClientStore;
use crate::error::{OAuthError, OAuthResult};
use crate::models::OAuthClientInformation;

/// Credentials presented by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: Option<String>,
}

impl ClientCredentials {
    /// Pick credentials from the form body, falling back to HTTP Basic.
    pub fn from_request(
        client_id: Option<&str>,
        client_secret: Option<&str>,
        headers: &HeaderMap,
    ) -> OAuthResult<Self> {
        if let Some(client_id) = client_id.filter(|id| !id.is_empty()) {
            return Ok(Self {
                client_id: client_id.to_string(),
                client_secret: client_secret.filter(|s| !s.is_empty()).map(str::to_string),
            });
        }

        if let Some(Authorization(basic)) = headers.typed_get::<Authorization<Basic>>() {
            if !basic.username().is_empty() {
                return Ok(Self {
                    client_id: basic.username().to_string(),
                    client_secret: Some(basic.password().to_string())
                        .filter(|s| !s.is_empty()),
                });
            }
        }

        Err(OAuthError::invalid_request("client_id is required"))
    }

    /// Look up and authenticate the client.
    ///
    /// A client holding a secret must present it, it must match exactly and
    /// it must not have expired. Every failure is `invalid_client` (401).
    pub async fn authenticate(
        &self,
        store: &dyn ClientStore,
        now_secs: u64,
    ) -> OAuthResult<OAuthClientInformation> {
        let client = store
            .get_client(&self.client_id)
            .await?
            .ok_or_else(|| failed(&self.client_id, "Invalid client_id"))?;

        if let Some(expected) = &client.client_secret {
            let Some(presented) = &self.client_secret else {
                return Err(failed(&self.client_id, "Client secret is required"));
            };
            if !constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
                return Err(failed(&self.client_id, "Invalid client_secret"));
            }
            if client.secret_expired(now_secs) {
                return Err(failed(&self.client_id, "Client secret has expired"));
            }
        }

        Ok(client)
    }
}

fn failed(client_id: &str, description: &str) -> OAuthError {
    tracing::debug!(client_id = %client_id, reason = description, "Client authentication failed");
    OAuthError::ClientAuthenticationFailed(description.to_string())
}
