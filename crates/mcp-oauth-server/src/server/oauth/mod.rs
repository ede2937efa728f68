//! OAuth 2.1 authorization server.
//!
//! ## Supported Standards
//! - RFC 6749: Authorization Code and Refresh Token grants
//! - RFC 6750: Bearer token usage
//! - RFC 7009: Token Revocation
//! - RFC 7591: Dynamic Client Registration
//! - RFC 7636: PKCE (S256 only)
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 8707: Resource Indicators
//! - RFC 9728: OAuth Protected Resource Metadata

pub mod bearer;
pub mod client_auth;
pub mod handlers;
pub mod pkce;
pub mod provider;
pub mod rate_limit;
pub mod store;

pub use bearer::{BearerAuthenticator, BearerError, require_bearer_auth};
pub use handlers::OAuthState;
pub use provider::{InMemoryOAuthProvider, OAuthServerProvider, TokenVerifier};
pub use rate_limit::RateLimiter;
pub use store::{ClientStore, InMemoryClientStore};
