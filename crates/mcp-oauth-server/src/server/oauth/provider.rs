//! Pluggable authorization logic and the in-memory reference provider.
//!
//! The endpoint handlers own protocol validation; a provider owns what is
//! issued and persisted: authorization codes, access tokens and refresh
//! tokens.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use url::Url;

use super::pkce;
use super::store::{ClientStore, InMemoryClientStore};
use crate::clock::{Clock, RandomSource, SystemClock, UuidRandom};
use crate::error::{OAuthError, OAuthResult};
use crate::models::{
    AuthInfo, AuthorizationParams, GRANT_REFRESH_TOKEN, OAuthClientInformation, OAuthTokens,
    TokenRevocationRequest, TokenTypeHint,
};

/// Auth code lifetime: 10 minutes.
const AUTH_CODE_LIFETIME: u64 = 600;
/// Access token lifetime: 1 hour.
const ACCESS_TOKEN_LIFETIME: u64 = 3600;
/// Refresh token lifetime: 30 days.
const REFRESH_TOKEN_LIFETIME: u64 = 30 * 24 * 3600;
/// Cleanup interval: 5 minutes.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Verifies bearer access tokens.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Resolve a token to what it grants. Unknown or expired tokens fail
    /// with `invalid_token`.
    async fn verify_access_token(&self, token: &str) -> OAuthResult<AuthInfo>;
}

/// Issues and redeems grants on behalf of the endpoint handlers.
#[async_trait]
pub trait OAuthServerProvider: TokenVerifier {
    /// Store used to look up and register clients.
    fn clients_store(&self) -> &dyn ClientStore;

    /// Issue an authorization code and return the redirect target carrying
    /// it (and `state`, if any).
    async fn authorize(
        &self,
        client: &OAuthClientInformation,
        params: AuthorizationParams,
    ) -> OAuthResult<Url>;

    /// The PKCE challenge stored when `code` was issued to `client`.
    async fn challenge_for_authorization_code(
        &self,
        client: &OAuthClientInformation,
        code: &str,
    ) -> OAuthResult<String>;

    /// Redeem an authorization code. The code must be invalidated
    /// atomically so that it can be redeemed at most once.
    ///
    /// `code_verifier` is only passed when local PKCE validation is skipped.
    async fn exchange_authorization_code(
        &self,
        client: &OAuthClientInformation,
        code: &str,
        code_verifier: Option<&str>,
        redirect_uri: Option<&str>,
        resource: Option<&Url>,
    ) -> OAuthResult<OAuthTokens>;

    /// Rotate a refresh token: invalidate it and its access token, then
    /// issue a new pair. Scopes outside the original grant fail with
    /// `invalid_scope`.
    async fn exchange_refresh_token(
        &self,
        client: &OAuthClientInformation,
        refresh_token: &str,
        scopes: Option<&[String]>,
        resource: Option<&Url>,
    ) -> OAuthResult<OAuthTokens>;

    /// Whether [`OAuthServerProvider::revoke_token`] is implemented.
    /// Controls whether `/revoke` is served.
    fn supports_revocation(&self) -> bool {
        false
    }

    /// Revoke an access or refresh token belonging to `client`. Tokens that
    /// do not exist or belong to another client are ignored.
    async fn revoke_token(
        &self,
        client: &OAuthClientInformation,
        request: &TokenRevocationRequest,
    ) -> OAuthResult<()> {
        let _ = (client, request);
        Err(OAuthError::server("token revocation is not supported by this provider"))
    }

    /// Skip the handler's PKCE check and pass the verifier to the provider
    /// instead (for providers that proxy to an upstream server).
    fn skip_local_pkce_validation(&self) -> bool {
        false
    }
}

#[async_trait]
impl TokenVerifier for Arc<dyn OAuthServerProvider> {
    async fn verify_access_token(&self, token: &str) -> OAuthResult<AuthInfo> {
        (**self).verify_access_token(token).await
    }
}

// ─── In-memory provider ──────────────────────────────────────────────────────

struct CodeRecord {
    client_id: String,
    redirect_uri: String,
    code_challenge: String,
    scopes: Vec<String>,
    resource: Option<Url>,
    expires_at: u64,
}

struct AccessRecord {
    client_id: String,
    scopes: Vec<String>,
    resource: Option<Url>,
    expires_at: u64,
}

struct RefreshRecord {
    client_id: String,
    access_token: String,
    scopes: Vec<String>,
    resource: Option<Url>,
    expires_at: u64,
}

/// All grant state behind one lock, so redemption and rotation are
/// compare-and-delete operations.
#[derive(Default)]
struct GrantState {
    codes: HashMap<String, CodeRecord>,
    access_tokens: HashMap<String, AccessRecord>,
    refresh_tokens: HashMap<String, RefreshRecord>,
}

/// In-memory provider that auto-approves every authorization request.
#[derive(Clone)]
pub struct InMemoryOAuthProvider {
    clients: Arc<dyn ClientStore>,
    state: Arc<RwLock<GrantState>>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
}

impl InMemoryOAuthProvider {
    /// Provider backed by a fresh [`InMemoryClientStore`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryClientStore::new()))
    }

    /// Provider backed by the given client store.
    #[must_use]
    pub fn with_store(clients: Arc<dyn ClientStore>) -> Self {
        Self::with_sources(clients, Arc::new(SystemClock), Arc::new(UuidRandom))
    }

    /// Provider with an injected clock and random source.
    #[must_use]
    pub fn with_sources(
        clients: Arc<dyn ClientStore>,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        Self { clients, state: Arc::new(RwLock::new(GrantState::default())), clock, random }
    }

    /// Issue an access token, plus a refresh token when the client is
    /// registered for the refresh grant.
    fn issue_tokens(
        &self,
        state: &mut GrantState,
        client: &OAuthClientInformation,
        scopes: Vec<String>,
        resource: Option<Url>,
    ) -> OAuthTokens {
        let now = self.clock.now_secs();
        let client_id = client.client_id.as_str();
        let access_token = self.random.token();

        state.access_tokens.insert(
            access_token.clone(),
            AccessRecord {
                client_id: client_id.to_string(),
                scopes: scopes.clone(),
                resource: resource.clone(),
                expires_at: now + ACCESS_TOKEN_LIFETIME,
            },
        );

        if !client.permits_grant(GRANT_REFRESH_TOKEN) {
            return OAuthTokens::bearer(access_token, ACCESS_TOKEN_LIFETIME, None, &scopes);
        }

        let refresh_token = self.random.token();
        state.refresh_tokens.insert(
            refresh_token.clone(),
            RefreshRecord {
                client_id: client_id.to_string(),
                access_token: access_token.clone(),
                scopes: scopes.clone(),
                resource,
                expires_at: now + REFRESH_TOKEN_LIFETIME,
            },
        );

        OAuthTokens::bearer(access_token, ACCESS_TOKEN_LIFETIME, Some(refresh_token), &scopes)
    }

    fn revoke_access(state: &mut GrantState, client_id: &str, token: &str) -> bool {
        if state.access_tokens.get(token).is_some_and(|t| t.client_id == client_id) {
            state.access_tokens.remove(token);
            return true;
        }
        false
    }

    fn revoke_refresh(state: &mut GrantState, client_id: &str, token: &str) -> bool {
        if state.refresh_tokens.get(token).is_some_and(|t| t.client_id == client_id) {
            if let Some(record) = state.refresh_tokens.remove(token) {
                state.access_tokens.remove(&record.access_token);
            }
            return true;
        }
        false
    }

    /// Start background cleanup task for expired tokens and codes.
    pub fn start_cleanup_task(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                self.cleanup_expired().await;
            }
        });
    }

    /// Drop expired codes and tokens.
    pub async fn cleanup_expired(&self) {
        let now = self.clock.now_secs();
        let mut state = self.state.write().await;

        state.codes.retain(|_, code| code.expires_at > now);

        let before = state.access_tokens.len();
        state.access_tokens.retain(|_, token| token.expires_at > now);
        let removed = before - state.access_tokens.len();
        if removed > 0 {
            tracing::debug!(count = removed, "Cleaned up expired access tokens");
        }

        let before = state.refresh_tokens.len();
        state.refresh_tokens.retain(|_, token| token.expires_at > now);
        let removed = before - state.refresh_tokens.len();
        if removed > 0 {
            tracing::debug!(count = removed, "Cleaned up expired refresh tokens");
        }
    }
}

impl Default for InMemoryOAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryOAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryOAuthProvider").finish()
    }
}

#[async_trait]
impl TokenVerifier for InMemoryOAuthProvider {
    async fn verify_access_token(&self, token: &str) -> OAuthResult<AuthInfo> {
        let state = self.state.read().await;
        let record = state
            .access_tokens
            .get(token)
            .ok_or_else(|| OAuthError::invalid_token("Invalid or expired token"))?;

        if record.expires_at < self.clock.now_secs() {
            return Err(OAuthError::invalid_token("Token has expired"));
        }

        Ok(AuthInfo {
            token: token.to_string(),
            client_id: record.client_id.clone(),
            scopes: record.scopes.clone(),
            expires_at: Some(record.expires_at),
            resource: record.resource.clone(),
            extra: None,
        })
    }
}

#[async_trait]
impl OAuthServerProvider for InMemoryOAuthProvider {
    fn clients_store(&self) -> &dyn ClientStore {
        self.clients.as_ref()
    }

    async fn authorize(
        &self,
        client: &OAuthClientInformation,
        params: AuthorizationParams,
    ) -> OAuthResult<Url> {
        let mut target = Url::parse(&params.redirect_uri)
            .map_err(|_| OAuthError::invalid_request("redirect_uri must be a valid URL"))?;
        let code = self.random.token();

        self.state.write().await.codes.insert(
            code.clone(),
            CodeRecord {
                client_id: client.client_id.clone(),
                redirect_uri: params.redirect_uri,
                code_challenge: params.code_challenge,
                scopes: params.scopes,
                resource: params.resource,
                expires_at: self.clock.now_secs() + AUTH_CODE_LIFETIME,
            },
        );

        {
            let mut query = target.query_pairs_mut();
            query.append_pair("code", &code);
            if let Some(state) = &params.state {
                query.append_pair("state", state);
            }
        }

        tracing::info!(client_id = %client.client_id, "Issued authorization code");
        Ok(target)
    }

    async fn challenge_for_authorization_code(
        &self,
        client: &OAuthClientInformation,
        code: &str,
    ) -> OAuthResult<String> {
        let state = self.state.read().await;
        let record = state
            .codes
            .get(code)
            .ok_or_else(|| OAuthError::invalid_grant("Invalid authorization code"))?;

        if record.client_id != client.client_id {
            return Err(OAuthError::invalid_grant(
                "Authorization code was not issued to this client",
            ));
        }
        if record.expires_at < self.clock.now_secs() {
            return Err(OAuthError::invalid_grant("Authorization code has expired"));
        }

        Ok(record.code_challenge.clone())
    }

    async fn exchange_authorization_code(
        &self,
        client: &OAuthClientInformation,
        code: &str,
        code_verifier: Option<&str>,
        redirect_uri: Option<&str>,
        resource: Option<&Url>,
    ) -> OAuthResult<OAuthTokens> {
        let now = self.clock.now_secs();
        let mut state = self.state.write().await;

        let record = state
            .codes
            .get(code)
            .ok_or_else(|| OAuthError::invalid_grant("Invalid authorization code"))?;

        if record.client_id != client.client_id {
            return Err(OAuthError::invalid_grant(
                "Authorization code was not issued to this client",
            ));
        }
        if record.expires_at < now {
            state.codes.remove(code);
            return Err(OAuthError::invalid_grant("Authorization code has expired"));
        }
        if let Some(redirect_uri) = redirect_uri {
            if redirect_uri != record.redirect_uri {
                return Err(OAuthError::invalid_grant("redirect_uri mismatch"));
            }
        }
        if let Some(resource) = resource {
            if record.resource.as_ref() != Some(resource) {
                return Err(OAuthError::invalid_grant("resource mismatch"));
            }
        }
        if let Some(verifier) = code_verifier {
            pkce::check_code_verifier(verifier, &record.code_challenge)?;
        }

        let Some(record) = state.codes.remove(code) else {
            return Err(OAuthError::invalid_grant("Invalid authorization code"));
        };

        let tokens = self.issue_tokens(&mut state, client, record.scopes, record.resource);
        tracing::info!(client_id = %client.client_id, "Issued token pair");
        Ok(tokens)
    }

    async fn exchange_refresh_token(
        &self,
        client: &OAuthClientInformation,
        refresh_token: &str,
        scopes: Option<&[String]>,
        resource: Option<&Url>,
    ) -> OAuthResult<OAuthTokens> {
        let now = self.clock.now_secs();
        let mut state = self.state.write().await;

        let record = state
            .refresh_tokens
            .get(refresh_token)
            .ok_or_else(|| OAuthError::invalid_grant("Invalid refresh token"))?;

        if record.client_id != client.client_id {
            return Err(OAuthError::invalid_grant("Refresh token was not issued to this client"));
        }
        if record.expires_at < now {
            let access_token = record.access_token.clone();
            state.refresh_tokens.remove(refresh_token);
            state.access_tokens.remove(&access_token);
            return Err(OAuthError::invalid_grant("Refresh token has expired"));
        }
        if let Some(requested) = scopes {
            if let Some(extra) = requested.iter().find(|s| !record.scopes.contains(s)) {
                return Err(OAuthError::invalid_scope(format!(
                    "Scope '{extra}' was not part of the original grant"
                )));
            }
        }
        if let Some(resource) = resource {
            if record.resource.as_ref() != Some(resource) {
                return Err(OAuthError::invalid_grant("resource mismatch"));
            }
        }

        let Some(old) = state.refresh_tokens.remove(refresh_token) else {
            return Err(OAuthError::invalid_grant("Invalid refresh token"));
        };
        state.access_tokens.remove(&old.access_token);

        let scopes = scopes.map_or(old.scopes, <[String]>::to_vec);
        let tokens = self.issue_tokens(&mut state, client, scopes, old.resource);
        tracing::info!(client_id = %client.client_id, "Refreshed token pair");
        Ok(tokens)
    }

    fn supports_revocation(&self) -> bool {
        true
    }

    async fn revoke_token(
        &self,
        client: &OAuthClientInformation,
        request: &TokenRevocationRequest,
    ) -> OAuthResult<()> {
        let mut state = self.state.write().await;
        let client_id = client.client_id.as_str();
        let token = request.token.as_str();

        let revoked = match request.token_type_hint {
            Some(TokenTypeHint::RefreshToken) => {
                Self::revoke_refresh(&mut state, client_id, token)
                    || Self::revoke_access(&mut state, client_id, token)
            }
            _ => {
                Self::revoke_access(&mut state, client_id, token)
                    || Self::revoke_refresh(&mut state, client_id, token)
            }
        };

        tracing::debug!(client_id = %client_id, revoked, "Processed revocation");
        Ok(())
    }
}
