//! Token models.

use serde::{Deserialize, Serialize};
use url::Url;

/// Token endpoint success body (RFC 6749 §5.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl OAuthTokens {
    /// A `Bearer` token set.
    #[must_use]
    pub fn bearer(access_token: String, expires_in: u64, refresh_token: Option<String>, scopes: &[String]) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: Some(expires_in),
            refresh_token,
            scope: (!scopes.is_empty()).then(|| scopes.join(" ")),
        }
    }
}

/// What a verified access token grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    pub token: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    /// Seconds since the epoch. `None` is treated as invalid by the bearer authenticator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    /// RFC 8707 resource indicator the token is bound to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Map<String, serde_json::Value>>,
}

impl AuthInfo {
    /// Whether every scope in `required` was granted.
    #[must_use]
    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|r| self.scopes.iter().any(|s| s == r))
    }
}

/// Which kind of token a revocation request refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenTypeHint {
    AccessToken,
    RefreshToken,
}

impl TokenTypeHint {
    /// Parse a hint; unknown hints are ignored (RFC 7009 §2.1).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "access_token" => Some(Self::AccessToken),
            "refresh_token" => Some(Self::RefreshToken),
            _ => None,
        }
    }
}

/// A validated revocation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRevocationRequest {
    pub token: String,
    pub token_type_hint: Option<TokenTypeHint>,
}
