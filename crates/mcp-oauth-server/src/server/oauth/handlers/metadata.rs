//! Discovery documents. Both are derived from configuration only.

use axum::{
    Json,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use super::OAuthState;
use crate::config::Endpoint;
use crate::models::{
    AUTH_METHOD_CLIENT_SECRET_BASIC, AUTH_METHOD_CLIENT_SECRET_POST, AUTH_METHOD_NONE,
};

// ─── RFC 8414: Authorization Server Metadata ─────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes_supported: Vec<String>,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint_auth_methods_supported: Option<Vec<String>>,
    pub code_challenge_methods_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_documentation: Option<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

impl AuthorizationServerMetadata {
    #[must_use]
    pub fn from_state(state: &OAuthState) -> Self {
        let config = &state.config;
        let auth_methods =
            strings(&[AUTH_METHOD_CLIENT_SECRET_POST, AUTH_METHOD_CLIENT_SECRET_BASIC, AUTH_METHOD_NONE]);
        let revocation = state.revocation_enabled();

        Self {
            issuer: config.issuer_url.clone(),
            authorization_endpoint: config.endpoint_url(Endpoint::Authorize),
            token_endpoint: config.endpoint_url(Endpoint::Token),
            registration_endpoint: state
                .registration_enabled()
                .then(|| config.endpoint_url(Endpoint::Register)),
            revocation_endpoint: revocation.then(|| config.endpoint_url(Endpoint::Revoke)),
            scopes_supported: config.scopes_supported.clone(),
            response_types_supported: strings(&["code"]),
            grant_types_supported: strings(&["authorization_code", "refresh_token"]),
            token_endpoint_auth_methods_supported: auth_methods.clone(),
            revocation_endpoint_auth_methods_supported: revocation.then_some(auth_methods),
            code_challenge_methods_supported: strings(&["S256"]),
            service_documentation: config.service_documentation_url.clone(),
        }
    }
}

/// `GET /.well-known/oauth-authorization-server`
pub fn handle_auth_server_metadata(state: &OAuthState) -> Response {
    Json(AuthorizationServerMetadata::from_state(state)).into_response()
}

// ─── RFC 9728: Protected Resource Metadata ───────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    pub resource: String,
    pub authorization_servers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes_supported: Vec<String>,
    pub bearer_methods_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_documentation: Option<String>,
}

/// `GET /.well-known/oauth-protected-resource`
///
/// Tells clients where to find the authorization server for this resource.
pub fn handle_protected_resource(state: &OAuthState) -> Response {
    let config = &state.config;
    Json(ProtectedResourceMetadata {
        resource: config.resource_server_url.clone(),
        authorization_servers: vec![config.issuer_url.clone()],
        scopes_supported: config.scopes_supported.clone(),
        bearer_methods_supported: strings(&["header"]),
        resource_name: config.resource_name.clone(),
        resource_documentation: config.service_documentation_url.clone(),
    })
    .into_response()
}
