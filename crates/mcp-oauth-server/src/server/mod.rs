//! OAuth server façade.
//!
//! [`OAuthServer`] owns the router and exposes it three ways: as a plain
//! `handle` call, as a standalone axum [`Router`], or as a layer in front of
//! an existing application router.

pub mod oauth;
pub mod router;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use tower_http::trace::TraceLayer;

use crate::clock::{Clock, RandomSource, SystemClock, UuidRandom};
use crate::config::ServerConfig;
use oauth::{BearerAuthenticator, OAuthServerProvider, OAuthState, TokenVerifier};
use router::{OAuthRouter, RouteOutcome};

/// OAuth 2.1 authorization server.
#[derive(Debug, Clone)]
pub struct OAuthServer {
    router: Arc<OAuthRouter>,
}

impl OAuthServer {
    /// Create a server using the system clock and UUID randomness.
    #[must_use]
    pub fn new(config: ServerConfig, provider: Arc<dyn OAuthServerProvider>) -> Self {
        Self::with_sources(config, provider, Arc::new(SystemClock), Arc::new(UuidRandom))
    }

    /// Create a server with an injected clock and random source.
    #[must_use]
    pub fn with_sources(
        config: ServerConfig,
        provider: Arc<dyn OAuthServerProvider>,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        let state = OAuthState { config: Arc::new(config), provider, clock, random };
        Self { router: Arc::new(OAuthRouter::new(state)) }
    }

    /// Server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.router.state().config
    }

    /// Route one request.
    pub async fn handle(&self, request: Request) -> RouteOutcome {
        self.router.handle(request).await
    }

    /// Periodically drop ended rate-limit windows. `check` also sweeps them,
    /// so this only bounds memory between requests.
    pub fn start_cleanup_task(&self) {
        self.router.start_cleanup_task();
    }

    /// Bearer authenticator backed by this server's provider, for use with
    /// [`oauth::require_bearer_auth`].
    #[must_use]
    pub fn bearer_authenticator(&self, required_scopes: Vec<String>) -> BearerAuthenticator {
        let state = self.router.state();
        let verifier: Arc<dyn TokenVerifier> = Arc::new(Arc::clone(&state.provider));
        BearerAuthenticator::new(verifier, Arc::clone(&state.clock))
            .with_required_scopes(required_scopes)
            .with_resource_metadata_url(state.config.resource_metadata_url())
    }

    /// Put the OAuth endpoints in front of `app`. Requests the OAuth router
    /// does not handle fall through to `app`.
    #[must_use]
    pub fn layer(&self, app: Router) -> Router {
        app.layer(middleware::from_fn_with_state(Arc::clone(&self.router), oauth_middleware))
            .layer(TraceLayer::new_for_http())
    }

    /// The OAuth endpoints alone; everything else is a 404.
    #[must_use]
    pub fn into_router(self) -> Router {
        self.layer(Router::new().fallback(not_found))
    }

    /// Run the server over HTTP until CTRL+C.
    ///
    /// # Errors
    ///
    /// Returns error on bind or server failure.
    pub async fn run_http(self, port: u16) -> anyhow::Result<()> {
        tracing::info!(issuer = %self.config().issuer_url, "Starting OAuth server on port {}", port);

        self.start_cleanup_task();

        let app = self.into_router();
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        tracing::info!("HTTP server listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

        tracing::info!("HTTP server shut down");
        Ok(())
    }
}

async fn oauth_middleware(
    State(router): State<Arc<OAuthRouter>>,
    request: Request,
    next: Next,
) -> Response {
    match router.handle(request).await {
        RouteOutcome::Handled(response) => response,
        RouteOutcome::Unhandled(request) => next.run(request).await,
    }
}

async fn not_found() -> impl IntoResponse {
    StatusCode::NOT_FOUND
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}
