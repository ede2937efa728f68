//! Input models for the OAuth endpoints.
//!
//! Raw structs mirror the wire parameters with every field optional, so a
//! missing parameter surfaces as a precise OAuth error instead of a generic
//! deserialization rejection. `validate`-style methods turn them into the
//! typed values the handlers work with.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use url::Url;

use super::client::{
    AUTH_METHOD_CLIENT_SECRET_BASIC, AUTH_METHOD_CLIENT_SECRET_POST, AUTH_METHOD_NONE,
    GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN, OAuthClientMetadata,
};
use super::token::{TokenRevocationRequest, TokenTypeHint};
use crate::error::{OAuthError, OAuthResult};

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

/// Split a space-delimited scope string, dropping empty entries.
#[must_use]
pub fn parse_scope(scope: &str) -> Vec<String> {
    scope.split(' ').filter(|s| !s.is_empty()).map(str::to_string).collect()
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

fn parse_resource(resource: Option<&String>) -> OAuthResult<Option<Url>> {
    let Some(resource) = non_empty(resource) else {
        return Ok(None);
    };
    let url = Url::parse(resource)
        .map_err(|_| OAuthError::invalid_request("resource must be an absolute URL"))?;
    if url.fragment().is_some() {
        return Err(OAuthError::invalid_request("resource must not contain a fragment"));
    }
    Ok(Some(url))
}

// ─── Authorization Endpoint ──────────────────────────────────────────────────

/// Parameters of `/authorize`, from the query string (GET) or form body (POST).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizeQuery {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub response_type: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub resource: Option<String>,
}

/// Phase 1 of `/authorize`: identifies the client and redirect target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAuthorizationParams {
    pub client_id: String,
    pub redirect_uri: Option<String>,
}

/// Phase 2 of `/authorize`: everything validated after the redirect target is trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestAuthorizationParams {
    pub code_challenge: String,
    pub scopes: Option<Vec<String>>,
    pub state: Option<String>,
    pub resource: Option<Url>,
}

/// Finalized parameters handed to the provider's authorize step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationParams {
    /// Resolved redirect URI, one of the client's registered URIs.
    pub redirect_uri: String,
    pub code_challenge: String,
    pub state: Option<String>,
    pub scopes: Vec<String>,
    pub resource: Option<Url>,
}

impl AuthorizeQuery {
    /// Validate the client-identifying parameters.
    pub fn client_params(&self) -> OAuthResult<ClientAuthorizationParams> {
        let client_id = non_empty(self.client_id.as_ref())
            .ok_or_else(|| OAuthError::invalid_request("client_id is required"))?;

        let redirect_uri = match non_empty(self.redirect_uri.as_ref()) {
            Some(uri) => {
                Url::parse(uri)
                    .map_err(|_| OAuthError::invalid_request("redirect_uri must be a valid URL"))?;
                Some(uri.to_string())
            }
            None => None,
        };

        Ok(ClientAuthorizationParams { client_id: client_id.to_string(), redirect_uri })
    }

    /// Validate the remaining parameters.
    pub fn request_params(&self) -> OAuthResult<RequestAuthorizationParams> {
        if self.response_type.as_deref() != Some("code") {
            return Err(OAuthError::invalid_request("response_type must be 'code'"));
        }

        let code_challenge = non_empty(self.code_challenge.as_ref())
            .ok_or_else(|| OAuthError::invalid_request("code_challenge is required"))?;

        if self.code_challenge_method.as_deref() != Some("S256") {
            return Err(OAuthError::invalid_request("code_challenge_method must be 'S256'"));
        }

        Ok(RequestAuthorizationParams {
            code_challenge: code_challenge.to_string(),
            scopes: self.scope.as_deref().map(parse_scope),
            state: self.state.clone(),
            resource: parse_resource(self.resource.as_ref())?,
        })
    }
}

// ─── Token Endpoint ──────────────────────────────────────────────────────────

/// Form body of `/token`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub code: Option<String>,
    pub code_verifier: Option<String>,
    pub redirect_uri: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub resource: Option<String>,
}

/// A grant the token endpoint knows how to redeem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenGrant {
    AuthorizationCode {
        code: String,
        code_verifier: Option<String>,
        redirect_uri: Option<String>,
        resource: Option<Url>,
    },
    RefreshToken {
        refresh_token: String,
        scopes: Option<Vec<String>>,
        resource: Option<Url>,
    },
}

impl TokenGrant {
    /// Wire name of the grant.
    #[must_use]
    pub const fn grant_type(&self) -> &'static str {
        match self {
            Self::AuthorizationCode { .. } => GRANT_AUTHORIZATION_CODE,
            Self::RefreshToken { .. } => GRANT_REFRESH_TOKEN,
        }
    }
}

impl TokenRequest {
    /// Validate `grant_type` and the parameters it requires.
    pub fn grant(&self) -> OAuthResult<TokenGrant> {
        let grant_type = non_empty(self.grant_type.as_ref())
            .ok_or_else(|| OAuthError::invalid_request("grant_type is required"))?;

        match grant_type {
            "authorization_code" => {
                let code = non_empty(self.code.as_ref())
                    .ok_or_else(|| OAuthError::invalid_request("code is required"))?;
                Ok(TokenGrant::AuthorizationCode {
                    code: code.to_string(),
                    code_verifier: non_empty(self.code_verifier.as_ref()).map(str::to_string),
                    redirect_uri: non_empty(self.redirect_uri.as_ref()).map(str::to_string),
                    resource: parse_resource(self.resource.as_ref())?,
                })
            }
            "refresh_token" => {
                let refresh_token = non_empty(self.refresh_token.as_ref())
                    .ok_or_else(|| OAuthError::invalid_request("refresh_token is required"))?;
                Ok(TokenGrant::RefreshToken {
                    refresh_token: refresh_token.to_string(),
                    // An empty scope is the same as an omitted one (RFC 6749 §6).
                    scopes: non_empty(self.scope.as_ref())
                        .map(parse_scope)
                        .filter(|scopes| !scopes.is_empty()),
                    resource: parse_resource(self.resource.as_ref())?,
                })
            }
            other => Err(OAuthError::UnsupportedGrantType(format!(
                "The grant type '{other}' is not supported by this authorization server"
            ))),
        }
    }
}

// ─── Revocation Endpoint ─────────────────────────────────────────────────────

/// Form body of `/revoke`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RevocationForm {
    pub token: Option<String>,
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl RevocationForm {
    /// Validate the token parameters.
    pub fn revocation_request(&self) -> OAuthResult<TokenRevocationRequest> {
        let token = non_empty(self.token.as_ref())
            .ok_or_else(|| OAuthError::invalid_request("token is required"))?;
        Ok(TokenRevocationRequest {
            token: token.to_string(),
            token_type_hint: self.token_type_hint.as_deref().and_then(TokenTypeHint::parse),
        })
    }
}

// ─── Registration Endpoint ───────────────────────────────────────────────────

fn check_url(field: &str, value: &str) -> OAuthResult<()> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|_| OAuthError::InvalidClientMetadata(format!("{field} must be a valid URL")))
}

impl OAuthClientMetadata {
    /// Semantic checks beyond what deserialization enforces.
    pub fn validate(&self) -> OAuthResult<()> {
        if self.redirect_uris.is_empty() {
            return Err(OAuthError::InvalidClientMetadata(
                "redirect_uris must contain at least one URI".to_string(),
            ));
        }
        for uri in &self.redirect_uris {
            let url = Url::parse(uri).map_err(|_| {
                OAuthError::InvalidClientMetadata("redirect_uris must be valid URLs".to_string())
            })?;
            if url.fragment().is_some() {
                return Err(OAuthError::InvalidClientMetadata(format!(
                    "redirect_uri '{uri}' must not contain a fragment"
                )));
            }
        }

        let optional_uris = [
            ("client_uri", &self.client_uri),
            ("logo_uri", &self.logo_uri),
            ("tos_uri", &self.tos_uri),
            ("policy_uri", &self.policy_uri),
            ("jwks_uri", &self.jwks_uri),
        ];
        for (field, value) in optional_uris {
            if let Some(value) = value {
                check_url(field, value)?;
            }
        }

        for contact in self.contacts.iter().flatten() {
            if !EMAIL.is_match(contact) {
                return Err(OAuthError::InvalidClientMetadata(format!(
                    "contacts must be email addresses, got '{contact}'"
                )));
            }
        }

        if let Some(method) = self.token_endpoint_auth_method.as_deref() {
            if ![AUTH_METHOD_NONE, AUTH_METHOD_CLIENT_SECRET_POST, AUTH_METHOD_CLIENT_SECRET_BASIC]
                .contains(&method)
            {
                return Err(OAuthError::InvalidClientMetadata(format!(
                    "Unsupported token_endpoint_auth_method '{method}'"
                )));
            }
        }

        Ok(())
    }
}
