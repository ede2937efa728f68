//! MCP OAuth Server
//!
//! An OAuth 2.1 authorization server core for Model Context Protocol servers:
//! authorization code flow with mandatory PKCE, refresh token rotation,
//! dynamic client registration, token revocation, discovery metadata and
//! bearer token verification.
//!
//! # Features
//!
//! - **Composable**: unknown paths fall through to your own axum routes
//! - **Pluggable**: swap the client store and provider for real backends
//! - **Rate-limited**: per-endpoint fixed windows with `Retry-After`
//! - **Deterministic**: clock and randomness are injected
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use axum::{Router, routing::get};
//! use mcp_oauth_server::{
//!     ServerConfig,
//!     server::{OAuthServer, oauth::InMemoryOAuthProvider},
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::new("https://auth.example.com")?.with_scopes(["mcp"]);
//!     let server = OAuthServer::new(config, Arc::new(InMemoryOAuthProvider::new()));
//!     server.start_cleanup_task();
//!
//!     let app = server.layer(Router::new().route("/health", get(|| async { "ok" })));
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod server;

pub use config::ServerConfig;
pub use error::{OAuthError, OAuthResult};
pub use server::OAuthServer;
