//! `POST /token`

use axum::{
    Json,
    extract::Request,
    response::{IntoResponse, Response},
};

use super::{OAuthState, no_store, parse_form};
use crate::error::{OAuthError, OAuthResult};
use crate::models::{OAuthClientInformation, OAuthTokens, TokenGrant, TokenRequest};
use crate::server::oauth::client_auth::ClientCredentials;
use crate::server::oauth::pkce;

/// Exchange an authorization code or refresh token for a token set.
pub async fn handle_token(state: &OAuthState, request: Request) -> OAuthResult<Response> {
    let headers = request.headers().clone();
    let form: TokenRequest = parse_form(request).await?;

    let credentials = ClientCredentials::from_request(
        form.client_id.as_deref(),
        form.client_secret.as_deref(),
        &headers,
    )?;
    let client = credentials
        .authenticate(state.provider.clients_store(), state.clock.now_secs())
        .await?;

    let grant = form.grant()?;
    if !client.permits_grant(grant.grant_type()) {
        tracing::debug!(client_id = %client.client_id, grant_type = grant.grant_type(), "Grant not registered");
        return Err(OAuthError::UnauthorizedClient(format!(
            "Client is not registered for the '{}' grant",
            grant.grant_type()
        )));
    }

    let tokens = match grant {
        TokenGrant::AuthorizationCode { code, code_verifier, redirect_uri, resource } => {
            let passthrough = if state.provider.skip_local_pkce_validation() {
                code_verifier
            } else {
                let verifier = code_verifier
                    .ok_or_else(|| OAuthError::invalid_request("code_verifier is required"))?;
                let challenge =
                    state.provider.challenge_for_authorization_code(&client, &code).await?;
                pkce::check_code_verifier(&verifier, &challenge)?;
                None
            };

            state
                .provider
                .exchange_authorization_code(
                    &client,
                    &code,
                    passthrough.as_deref(),
                    redirect_uri.as_deref(),
                    resource.as_ref(),
                )
                .await?
        }
        TokenGrant::RefreshToken { refresh_token, scopes, resource } => {
            if let Some(scopes) = &scopes {
                check_registered_scopes(&client, scopes)?;
            }
            state
                .provider
                .exchange_refresh_token(&client, &refresh_token, scopes.as_deref(), resource.as_ref())
                .await?
        }
    };

    Ok(token_success(tokens))
}

fn check_registered_scopes(client: &OAuthClientInformation, scopes: &[String]) -> OAuthResult<()> {
    let allowed = client.allowed_scopes();
    match scopes.iter().find(|s| !allowed.contains(s.as_str())) {
        Some(scope) => Err(OAuthError::invalid_scope(format!(
            "Client was not registered with scope {scope}"
        ))),
        None => Ok(()),
    }
}

fn token_success(tokens: OAuthTokens) -> Response {
    let mut response = Json(tokens).into_response();
    no_store(&mut response);
    response
}
