//! Data models for OAuth clients, tokens and endpoint inputs.
//!
//! Wire names follow RFC 6749 / RFC 7591 snake_case, so no serde renames are needed.

mod client;
mod inputs;
mod token;

pub use client::{
    AUTH_METHOD_CLIENT_SECRET_BASIC, AUTH_METHOD_CLIENT_SECRET_POST, AUTH_METHOD_NONE,
    ClientRegistration, GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN, OAuthClientInformation,
    OAuthClientMetadata,
};
pub use inputs::*;
pub use token::{AuthInfo, OAuthTokens, TokenRevocationRequest, TokenTypeHint};
