//! `POST /revoke` (RFC 7009)
//!
//! Once the client is authenticated the answer is always `200 {}`, whether
//! or not the token existed or belonged to the caller.

use axum::{
    Json,
    extract::Request,
    response::{IntoResponse, Response},
};

use super::{OAuthState, parse_form};
use crate::error::OAuthResult;
use crate::models::RevocationForm;
use crate::server::oauth::client_auth::ClientCredentials;

/// Revoke an access or refresh token.
pub async fn handle_revoke(state: &OAuthState, request: Request) -> OAuthResult<Response> {
    let headers = request.headers().clone();
    let form: RevocationForm = parse_form(request).await?;

    let credentials = ClientCredentials::from_request(
        form.client_id.as_deref(),
        form.client_secret.as_deref(),
        &headers,
    )?;
    let client = credentials
        .authenticate(state.provider.clients_store(), state.clock.now_secs())
        .await?;
    let revocation = form.revocation_request()?;

    if let Err(err) = state.provider.revoke_token(&client, &revocation).await {
        tracing::warn!(client_id = %client.client_id, error = %err, "Token revocation failed");
    }

    Ok(Json(serde_json::json!({})).into_response())
}
