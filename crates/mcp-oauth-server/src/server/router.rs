//! Request router for the OAuth endpoints.
//!
//! Dispatches on exact path and method. Requests for paths it does not own
//! come back as [`RouteOutcome::Unhandled`] so the server can be composed
//! with other handlers; a known path with the wrong method is a 405.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};

use super::oauth::handlers::{OAuthState, authorize, metadata, register, revoke, token};
use super::oauth::rate_limit::RateLimitInfo;
use super::oauth::{BearerAuthenticator, RateLimiter, TokenVerifier};
use crate::config::{Endpoint, paths};
use crate::error::{OAuthError, OAuthResult, retry_after_secs};

const GET: &[Method] = &[Method::GET];
const POST: &[Method] = &[Method::POST];
const GET_POST: &[Method] = &[Method::GET, Method::POST];

/// Rate limiter cleanup interval.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// What the router did with a request.
#[derive(Debug)]
pub enum RouteOutcome {
    /// The router produced a response.
    Handled(Response),
    /// Not an OAuth path; ownership of the request goes back to the caller.
    /// If the path is bearer-protected, the verified `AuthInfo` is in the
    /// request extensions.
    Unhandled(Request),
}

impl RouteOutcome {
    /// The response, if the request was handled.
    #[must_use]
    pub fn handled(self) -> Option<Response> {
        match self {
            Self::Handled(response) => Some(response),
            Self::Unhandled(_) => None,
        }
    }
}

/// Dispatch table plus the rate limiter and bearer interception.
#[derive(Debug, Clone)]
pub struct OAuthRouter {
    state: OAuthState,
    limiter: RateLimiter,
    bearer: Option<BearerAuthenticator>,
}

impl OAuthRouter {
    #[must_use]
    pub fn new(state: OAuthState) -> Self {
        let config = &state.config;
        let limiter = RateLimiter::new(
            config.rate_limits.clone(),
            config.client_identity.clone(),
            Arc::clone(&state.clock),
        );

        let bearer = (!config.bearer_protection.path_prefixes.is_empty()).then(|| {
            let verifier: Arc<dyn TokenVerifier> = Arc::new(Arc::clone(&state.provider));
            BearerAuthenticator::new(verifier, Arc::clone(&state.clock))
                .with_required_scopes(config.bearer_protection.required_scopes.clone())
                .with_resource_metadata_url(config.resource_metadata_url())
        });

        Self { state, limiter, bearer }
    }

    /// Shared handler state.
    #[must_use]
    pub const fn state(&self) -> &OAuthState {
        &self.state
    }

    /// Endpoint and accepted methods for `path`, honoring disabled features.
    fn route(&self, path: &str) -> Option<(Endpoint, &'static [Method])> {
        match path {
            paths::AUTHORIZE => Some((Endpoint::Authorize, GET_POST)),
            paths::TOKEN => Some((Endpoint::Token, POST)),
            paths::REGISTER if self.state.registration_enabled() => {
                Some((Endpoint::Register, POST))
            }
            paths::REVOKE if self.state.revocation_enabled() => Some((Endpoint::Revoke, POST)),
            paths::AUTHORIZATION_SERVER_METADATA => {
                Some((Endpoint::AuthorizationServerMetadata, GET))
            }
            paths::PROTECTED_RESOURCE_METADATA => Some((Endpoint::ProtectedResourceMetadata, GET)),
            _ => None,
        }
    }

    /// Route one request.
    pub async fn handle(&self, request: Request) -> RouteOutcome {
        let cors = self.state.config.cors;

        if cors && request.method() == Method::OPTIONS {
            let mut response = StatusCode::NO_CONTENT.into_response();
            append_cors(response.headers_mut());
            return RouteOutcome::Handled(response);
        }

        match self.dispatch(request).await {
            RouteOutcome::Handled(mut response) => {
                if cors {
                    append_cors(response.headers_mut());
                }
                RouteOutcome::Handled(response)
            }
            unhandled @ RouteOutcome::Unhandled(_) => unhandled,
        }
    }

    async fn dispatch(&self, mut request: Request) -> RouteOutcome {
        let path = request.uri().path().to_string();

        let Some((endpoint, allowed)) = self.route(&path) else {
            if let Some(bearer) = self.protecting(&path) {
                match bearer.authenticate(request.headers()).await {
                    Ok(info) => {
                        request.extensions_mut().insert(info);
                    }
                    Err(err) => {
                        tracing::debug!(path = %path, error = %err.error, "Rejected unauthenticated request");
                        return RouteOutcome::Handled(err.into_response());
                    }
                }
            }
            return RouteOutcome::Unhandled(request);
        };

        let response = match self.call(endpoint, allowed, request).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        };
        RouteOutcome::Handled(response)
    }

    fn protecting(&self, path: &str) -> Option<&BearerAuthenticator> {
        let prefixes = &self.state.config.bearer_protection.path_prefixes;
        self.bearer.as_ref().filter(|_| prefixes.iter().any(|p| under_prefix(path, p)))
    }

    async fn call(
        &self,
        endpoint: Endpoint,
        allowed: &'static [Method],
        request: Request,
    ) -> OAuthResult<Response> {
        if !allowed.contains(request.method()) {
            return Err(OAuthError::MethodNotAllowed {
                method: request.method().clone(),
                allowed: allowed.to_vec(),
            });
        }

        let identity = self.limiter.identify(request.headers());
        let quota = self.limiter.check(endpoint, &identity).await?;

        let state = &self.state;
        let result = match endpoint {
            Endpoint::Authorize => authorize::handle_authorize(state, request).await,
            Endpoint::Token => token::handle_token(state, request).await,
            Endpoint::Register => register::handle_register(state, request).await,
            Endpoint::Revoke => revoke::handle_revoke(state, request).await,
            Endpoint::AuthorizationServerMetadata => Ok(metadata::handle_auth_server_metadata(state)),
            Endpoint::ProtectedResourceMetadata => Ok(metadata::handle_protected_resource(state)),
        };

        let mut response = result.unwrap_or_else(IntoResponse::into_response);
        if let Some(quota) = quota {
            append_rate_limit(response.headers_mut(), quota);
        }
        Ok(response)
    }

    /// Periodically drop expired rate-limit counters.
    pub fn start_cleanup_task(&self) {
        let limiter = self.limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                limiter.cleanup().await;
            }
        });
    }
}

/// Whether `path` is `prefix` or lies below it on a segment boundary.
fn under_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'),
        None => false,
    }
}

fn append_rate_limit(headers: &mut HeaderMap, quota: RateLimitInfo) {
    headers.insert(HeaderName::from_static("ratelimit-limit"), HeaderValue::from(quota.limit));
    headers.insert(HeaderName::from_static("ratelimit-remaining"), HeaderValue::from(quota.remaining));
    headers.insert(
        HeaderName::from_static("ratelimit-reset"),
        HeaderValue::from(retry_after_secs(quota.reset_after)),
    );
}

fn append_cors(headers: &mut HeaderMap) {
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Authorization, Content-Type"),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static(
            "WWW-Authenticate, Retry-After, RateLimit-Limit, RateLimit-Remaining, RateLimit-Reset",
        ),
    );
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use crate::clock::{SystemClock, UuidRandom};
    use crate::config::{BearerProtection, RateLimitRule, ServerConfig};
    use crate::server::oauth::InMemoryOAuthProvider;

    fn request(method: Method, uri: &str) -> Request {
        Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
    }

    fn router(config: ServerConfig) -> OAuthRouter {
        OAuthRouter::new(OAuthState {
            config: Arc::new(config),
            provider: Arc::new(InMemoryOAuthProvider::new()),
            clock: Arc::new(SystemClock),
            random: Arc::new(UuidRandom),
        })
    }

    #[tokio::test]
    async fn test_unknown_path_is_unhandled() {
        let router = router(ServerConfig::for_testing("http://localhost:8080"));
        match router.handle(request(Method::GET, "/mcp")).await {
            RouteOutcome::Unhandled(req) => assert_eq!(req.uri().path(), "/mcp"),
            RouteOutcome::Handled(resp) => panic!("unexpected response: {}", resp.status()),
        }
    }

    #[tokio::test]
    async fn test_wrong_method_is_405() {
        let router = router(ServerConfig::for_testing("http://localhost:8080"));
        let response = router.handle(request(Method::GET, "/token")).await.handled().unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "POST");
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_preflight_on_any_path() {
        let router = router(ServerConfig::for_testing("http://localhost:8080"));
        let response =
            router.handle(request(Method::OPTIONS, "/anything")).await.handled().unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
    }

    #[tokio::test]
    async fn test_cors_disabled() {
        let mut config = ServerConfig::for_testing("http://localhost:8080");
        config.cors = false;
        let router = router(config);

        assert!(matches!(
            router.handle(request(Method::OPTIONS, "/token")).await,
            RouteOutcome::Handled(ref r) if r.status() == StatusCode::METHOD_NOT_ALLOWED
        ));
        let response = router
            .handle(request(Method::GET, paths::AUTHORIZATION_SERVER_METADATA))
            .await
            .handled()
            .unwrap();
        assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[test]
    fn test_prefix_matches_on_segment_boundary() {
        assert!(under_prefix("/mcp", "/mcp"));
        assert!(under_prefix("/mcp/tools", "/mcp"));
        assert!(under_prefix("/api/v1", "/api/"));
        assert!(!under_prefix("/mcpfoo", "/mcp"));
        assert!(!under_prefix("/other", "/mcp"));
    }

    #[tokio::test]
    async fn test_bearer_protection_respects_segments() {
        let config = ServerConfig::for_testing("http://localhost:8080").with_bearer_protection(
            BearerProtection { path_prefixes: vec!["/mcp".into()], required_scopes: vec![] },
        );
        let router = router(config);

        let outcome = router.handle(request(Method::GET, "/mcp/tools")).await;
        let response = outcome.handled().unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        assert!(matches!(
            router.handle(request(Method::GET, "/mcpfoo")).await,
            RouteOutcome::Unhandled(_)
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_headers() {
        let config = ServerConfig::for_testing("http://localhost:8080").with_rate_limit(
            Endpoint::AuthorizationServerMetadata,
            Some(RateLimitRule::new(2, Duration::from_secs(60))),
        );
        let router = router(config);

        let response = router
            .handle(request(Method::GET, paths::AUTHORIZATION_SERVER_METADATA))
            .await
            .handled()
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["ratelimit-limit"], "2");
        assert_eq!(response.headers()["ratelimit-remaining"], "1");
        assert_eq!(response.headers()["ratelimit-reset"], "60");

        // Unlimited endpoints carry no quota headers.
        let response = router
            .handle(request(Method::GET, paths::PROTECTED_RESOURCE_METADATA))
            .await
            .handled()
            .unwrap();
        assert!(response.headers().get("ratelimit-limit").is_none());
    }
}
