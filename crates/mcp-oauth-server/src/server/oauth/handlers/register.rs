//! `POST /register` (RFC 7591 Dynamic Client Registration)

use axum::{
    Json,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::{OAuthState, no_store};
use crate::error::{OAuthError, OAuthResult};
use crate::models::{AUTH_METHOD_CLIENT_SECRET_POST, ClientRegistration, OAuthClientMetadata};

/// Register a new OAuth client dynamically.
pub async fn handle_register(state: &OAuthState, request: Request) -> OAuthResult<Response> {
    let Json(mut metadata) = Json::<OAuthClientMetadata>::from_request(request, &())
        .await
        .map_err(|rejection| OAuthError::InvalidClientMetadata(rejection.body_text()))?;
    metadata.validate()?;

    if metadata.token_endpoint_auth_method.is_none() {
        metadata.token_endpoint_auth_method = Some(AUTH_METHOD_CLIENT_SECRET_POST.to_string());
    }
    if metadata.grant_types.is_none() {
        metadata.grant_types =
            Some(vec!["authorization_code".to_string(), "refresh_token".to_string()]);
    }
    if metadata.response_types.is_none() {
        metadata.response_types = Some(vec!["code".to_string()]);
    }

    let issued_at = state.clock.now_secs();
    let (client_secret, client_secret_expires_at) = if metadata.is_public() {
        (None, None)
    } else {
        (
            Some(state.random.client_secret()),
            Some(state.config.client_secret_expires_at(issued_at)),
        )
    };

    let registration = ClientRegistration {
        client_id: state.config.client_id_generation.then(|| state.random.identifier()),
        client_id_issued_at: Some(issued_at),
        client_secret,
        client_secret_expires_at,
        metadata,
    };

    let client = state.provider.clients_store().register_client(registration).await?;

    tracing::info!(
        client_id = %client.client_id,
        public = client.client_secret.is_none(),
        "Registered OAuth client"
    );

    let mut response = (StatusCode::CREATED, Json(client)).into_response();
    no_store(&mut response);
    Ok(response)
}
