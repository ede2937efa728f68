//! OAuth client records (RFC 7591).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{OAuthError, OAuthResult};

/// `token_endpoint_auth_method` of public clients.
pub const AUTH_METHOD_NONE: &str = "none";
/// Secret sent in the form body.
pub const AUTH_METHOD_CLIENT_SECRET_POST: &str = "client_secret_post";
/// Secret sent via HTTP Basic.
pub const AUTH_METHOD_CLIENT_SECRET_BASIC: &str = "client_secret_basic";

/// Authorization code grant.
pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
/// Refresh token grant.
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";

/// Client metadata as submitted to `/register`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthClientMetadata {
    /// Absolute redirection URIs. Must not be empty.
    pub redirect_uris: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_types: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_types: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,

    /// Space-delimited allow-list of scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contacts: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tos_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software_version: Option<String>,
}

impl OAuthClientMetadata {
    /// Whether the client registered as public (`token_endpoint_auth_method = "none"`).
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.token_endpoint_auth_method.as_deref() == Some(AUTH_METHOD_NONE)
    }
}

/// A registered client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthClientInformation {
    pub client_id: String,

    /// Absent for public clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Seconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id_issued_at: Option<u64>,

    /// Seconds since the epoch; `0` or absent means the secret never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_expires_at: Option<u64>,

    #[serde(flatten)]
    pub metadata: OAuthClientMetadata,
}

impl OAuthClientInformation {
    /// Build a public client with the given redirect URIs and scope allow-list.
    #[must_use]
    pub fn public(client_id: impl Into<String>, redirect_uris: Vec<String>, scope: Option<&str>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            client_id_issued_at: None,
            client_secret_expires_at: None,
            metadata: OAuthClientMetadata {
                redirect_uris,
                token_endpoint_auth_method: Some(AUTH_METHOD_NONE.to_string()),
                scope: scope.map(str::to_string),
                ..OAuthClientMetadata::default()
            },
        }
    }

    /// Turn this client into a confidential one holding `secret`.
    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>, expires_at: Option<u64>) -> Self {
        self.client_secret = Some(secret.into());
        self.client_secret_expires_at = expires_at;
        self.metadata.token_endpoint_auth_method =
            Some(AUTH_METHOD_CLIENT_SECRET_POST.to_string());
        self
    }

    /// Scopes this client may request.
    #[must_use]
    pub fn allowed_scopes(&self) -> HashSet<&str> {
        self.metadata.scope.as_deref().map(|s| s.split_whitespace().collect()).unwrap_or_default()
    }

    /// Whether the client may use `grant_type`. Clients that registered no
    /// `grant_types` may use any supported grant.
    #[must_use]
    pub fn permits_grant(&self, grant_type: &str) -> bool {
        self.metadata.grant_types.as_ref().is_none_or(|grants| grants.iter().any(|g| g == grant_type))
    }

    /// Whether the secret has passed its expiry at `now_secs`.
    #[must_use]
    pub fn secret_expired(&self, now_secs: u64) -> bool {
        matches!(self.client_secret_expires_at, Some(at) if at != 0 && at < now_secs)
    }

    /// Resolve the redirect URI for an authorization request.
    ///
    /// An explicit URI must exactly match a registered one. Without one, the
    /// client must have registered exactly one URI.
    pub fn resolve_redirect_uri(&self, requested: Option<&str>) -> OAuthResult<String> {
        match requested {
            Some(uri) => {
                if self.metadata.redirect_uris.iter().any(|u| u == uri) {
                    Ok(uri.to_string())
                } else {
                    Err(OAuthError::invalid_request("Unregistered redirect_uri"))
                }
            }
            None => match self.metadata.redirect_uris.as_slice() {
                [only] => Ok(only.clone()),
                [] => Err(OAuthError::invalid_request("Client has no registered redirect_uri")),
                _ => Err(OAuthError::invalid_request(
                    "redirect_uri must be specified when client has multiple registered URIs",
                )),
            },
        }
    }
}

/// A client about to be stored. `client_id` is `None` when the store assigns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRegistration {
    pub client_id: Option<String>,
    pub client_id_issued_at: Option<u64>,
    pub client_secret: Option<String>,
    pub client_secret_expires_at: Option<u64>,
    pub metadata: OAuthClientMetadata,
}

impl ClientRegistration {
    /// Finish the registration with a concrete `client_id`.
    #[must_use]
    pub fn into_client(self, client_id: String, issued_at: u64) -> OAuthClientInformation {
        OAuthClientInformation {
            client_id,
            client_secret: self.client_secret,
            client_id_issued_at: Some(self.client_id_issued_at.unwrap_or(issued_at)),
            client_secret_expires_at: self.client_secret_expires_at,
            metadata: self.metadata,
        }
    }
}
