//! `GET|POST /authorize`
//!
//! Validation runs in two phases. Until the client and its redirect URI are
//! known, errors are returned directly as JSON. After that every error,
//! including one raised by the provider, is reported by redirecting back to
//! the client.

use axum::{
    extract::{Query, Request},
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use url::Url;

use super::{OAuthState, parse_form};
use crate::error::{OAuthError, OAuthResult};
use crate::models::{AuthorizationParams, AuthorizeQuery, OAuthClientInformation};

/// Handle an authorization request.
pub async fn handle_authorize(state: &OAuthState, request: Request) -> OAuthResult<Response> {
    let query = if request.method() == Method::GET {
        Query::<AuthorizeQuery>::try_from_uri(request.uri())
            .map(|Query(query)| query)
            .map_err(|rejection| OAuthError::invalid_request(rejection.body_text()))?
    } else {
        parse_form::<AuthorizeQuery>(request).await?
    };

    // Phase 1: no trusted redirect target yet.
    let client_params = query.client_params()?;
    let client = state
        .provider
        .clients_store()
        .get_client(&client_params.client_id)
        .await?
        .ok_or_else(|| OAuthError::InvalidClient("Invalid client_id".to_string()))?;
    let redirect_uri = client.resolve_redirect_uri(client_params.redirect_uri.as_deref())?;

    // Phase 2: errors go back to the client.
    match authorize_client(state, &client, &query, redirect_uri.clone()).await {
        Ok(target) => Ok(found(target.as_str())),
        Err(err) => {
            tracing::debug!(client_id = %client.client_id, error = %err, "Authorization request rejected");
            error_redirect(&redirect_uri, &err, query.state.as_deref())
        }
    }
}

async fn authorize_client(
    state: &OAuthState,
    client: &OAuthClientInformation,
    query: &AuthorizeQuery,
    redirect_uri: String,
) -> OAuthResult<Url> {
    let request = query.request_params()?;

    let scopes = request.scopes.unwrap_or_default();
    let allowed = client.allowed_scopes();
    if let Some(scope) = scopes.iter().find(|s| !allowed.contains(s.as_str())) {
        return Err(OAuthError::invalid_scope(format!(
            "Client was not registered with scope {scope}"
        )));
    }

    let params = AuthorizationParams {
        redirect_uri,
        code_challenge: request.code_challenge,
        state: request.state,
        scopes,
        resource: request.resource,
    };

    state.provider.authorize(client, params).await
}

/// Encode an error into the redirect URI's query string.
fn error_redirect(redirect_uri: &str, err: &OAuthError, state: Option<&str>) -> OAuthResult<Response> {
    let mut target = Url::parse(redirect_uri)
        .map_err(|_| OAuthError::invalid_request("redirect_uri must be a valid URL"))?;

    let body = err.to_response_body();
    {
        let mut query = target.query_pairs_mut();
        query.append_pair("error", &body.error);
        if let Some(description) = &body.error_description {
            query.append_pair("error_description", description);
        }
        if let Some(uri) = &body.error_uri {
            query.append_pair("error_uri", uri);
        }
        if let Some(state) = state {
            query.append_pair("state", state);
        }
    }

    Ok(found(target.as_str()))
}

fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(location) => (
            StatusCode::FOUND,
            [
                (header::LOCATION, location),
                (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
            ],
        )
            .into_response(),
        Err(_) => OAuthError::server("redirect target is not a valid header value").into_response(),
    }
}
