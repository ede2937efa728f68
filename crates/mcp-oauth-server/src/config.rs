//! Configuration for the OAuth authorization server.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, bail};
use axum::http::HeaderName;
use url::Url;

/// Endpoint paths served by the router.
pub mod paths {
    pub const AUTHORIZE: &str = "/authorize";
    pub const TOKEN: &str = "/token";
    pub const REGISTER: &str = "/register";
    pub const REVOKE: &str = "/revoke";
    pub const AUTHORIZATION_SERVER_METADATA: &str = "/.well-known/oauth-authorization-server";
    pub const PROTECTED_RESOURCE_METADATA: &str = "/.well-known/oauth-protected-resource";
}

/// Defaults and lifetimes.
pub mod defaults {
    use std::time::Duration;

    /// Client secret lifetime (30 days).
    pub const CLIENT_SECRET_TTL_SECS: i64 = 30 * 24 * 3600;

    /// `/authorize`: 100 requests per 15 minutes.
    pub const AUTHORIZE_LIMIT: (u32, Duration) = (100, Duration::from_secs(15 * 60));

    /// `/token`: 50 requests per 15 minutes.
    pub const TOKEN_LIMIT: (u32, Duration) = (50, Duration::from_secs(15 * 60));

    /// `/register`: 20 requests per hour.
    pub const REGISTER_LIMIT: (u32, Duration) = (20, Duration::from_secs(3600));

    /// `/revoke`: 50 requests per 15 minutes.
    pub const REVOKE_LIMIT: (u32, Duration) = (50, Duration::from_secs(15 * 60));
}

/// The endpoints the router dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Authorize,
    Token,
    Register,
    Revoke,
    AuthorizationServerMetadata,
    ProtectedResourceMetadata,
}

impl Endpoint {
    /// Request path of this endpoint.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Authorize => paths::AUTHORIZE,
            Self::Token => paths::TOKEN,
            Self::Register => paths::REGISTER,
            Self::Revoke => paths::REVOKE,
            Self::AuthorizationServerMetadata => paths::AUTHORIZATION_SERVER_METADATA,
            Self::ProtectedResourceMetadata => paths::PROTECTED_RESOURCE_METADATA,
        }
    }
}

/// At most `max` requests per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub max: u32,
    pub window: Duration,
}

impl RateLimitRule {
    #[must_use]
    pub const fn new(max: u32, window: Duration) -> Self {
        Self { max, window }
    }
}

impl From<(u32, Duration)> for RateLimitRule {
    fn from((max, window): (u32, Duration)) -> Self {
        Self { max, window }
    }
}

/// How the rate limiter tells callers apart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ClientIdentity {
    /// Every caller shares one bucket per endpoint.
    #[default]
    Static,
    /// First comma-separated value of a request header (e.g. `x-forwarded-for`),
    /// falling back to the shared bucket when absent.
    Header(HeaderName),
}

/// Bearer protection for paths outside the OAuth endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BearerProtection {
    /// Path prefixes that require a valid bearer token.
    pub path_prefixes: Vec<String>,
    /// Scopes every token must carry.
    pub required_scopes: Vec<String>,
}

/// Server configuration, immutable once the server is built.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Authorization server issuer identifier.
    pub issuer_url: String,

    /// Base URL the endpoints are served under (defaults to the issuer).
    pub base_url: String,

    /// Resource identifier advertised in protected-resource metadata.
    pub resource_server_url: String,

    /// Human-readable documentation for developers.
    pub service_documentation_url: Option<String>,

    /// Scopes advertised in both metadata documents.
    pub scopes_supported: Vec<String>,

    /// Human-readable name of the protected resource.
    pub resource_name: Option<String>,

    /// Append CORS headers and answer `OPTIONS` preflights.
    pub cors: bool,

    /// Per-endpoint rate limits. Endpoints without a rule are not limited.
    pub rate_limits: HashMap<Endpoint, RateLimitRule>,

    /// Rate limiter identity extraction.
    pub client_identity: ClientIdentity,

    /// Client secret lifetime in seconds; `<= 0` means secrets never expire.
    pub client_secret_ttl_secs: i64,

    /// Generate client IDs in the registration handler rather than the store.
    pub client_id_generation: bool,

    /// Bearer-protected paths intercepted by the router.
    pub bearer_protection: BearerProtection,
}

fn is_loopback(url: &Url) -> bool {
    matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"))
}

impl ServerConfig {
    /// Create a configuration for `issuer_url` with default limits.
    ///
    /// # Errors
    ///
    /// Returns error if the issuer is not an `https` URL (loopback hosts may
    /// use `http`) or carries a query or fragment.
    pub fn new(issuer_url: &str) -> anyhow::Result<Self> {
        let issuer = Url::parse(issuer_url).context("issuer URL is not a valid URL")?;

        if issuer.scheme() != "https" && !is_loopback(&issuer) {
            bail!("issuer URL must be HTTPS");
        }
        if issuer.fragment().is_some() {
            bail!("issuer URL must not have a fragment");
        }
        if issuer.query().is_some() {
            bail!("issuer URL must not have a query string");
        }

        let issuer_url = issuer_url.trim_end_matches('/').to_string();

        Ok(Self {
            base_url: issuer_url.clone(),
            resource_server_url: issuer_url.clone(),
            issuer_url,
            service_documentation_url: None,
            scopes_supported: Vec::new(),
            resource_name: None,
            cors: true,
            rate_limits: HashMap::from([
                (Endpoint::Authorize, defaults::AUTHORIZE_LIMIT.into()),
                (Endpoint::Token, defaults::TOKEN_LIMIT.into()),
                (Endpoint::Register, defaults::REGISTER_LIMIT.into()),
                (Endpoint::Revoke, defaults::REVOKE_LIMIT.into()),
            ]),
            client_identity: ClientIdentity::Static,
            client_secret_ttl_secs: defaults::CLIENT_SECRET_TTL_SECS,
            client_id_generation: true,
            bearer_protection: BearerProtection::default(),
        })
    }

    /// Localhost configuration without rate limits.
    #[must_use]
    pub fn for_testing(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            issuer_url: base_url.clone(),
            resource_server_url: base_url.clone(),
            base_url,
            service_documentation_url: None,
            scopes_supported: vec!["read".to_string(), "write".to_string()],
            resource_name: None,
            cors: true,
            rate_limits: HashMap::new(),
            client_identity: ClientIdentity::Static,
            client_secret_ttl_secs: defaults::CLIENT_SECRET_TTL_SECS,
            client_id_generation: true,
            bearer_protection: BearerProtection::default(),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns error if `OAUTH_ISSUER_URL` is missing or any variable is invalid.
    pub fn from_env() -> anyhow::Result<Self> {
        let issuer = std::env::var("OAUTH_ISSUER_URL").context("OAUTH_ISSUER_URL is not set")?;
        let mut config = Self::new(&issuer)?;

        if let Ok(base_url) = std::env::var("OAUTH_BASE_URL") {
            Url::parse(&base_url).context("OAUTH_BASE_URL is not a valid URL")?;
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Ok(scopes) = std::env::var("OAUTH_SCOPES") {
            config.scopes_supported = scopes.split_whitespace().map(str::to_string).collect();
        }
        if let Ok(ttl) = std::env::var("OAUTH_CLIENT_SECRET_TTL_SECS") {
            config.client_secret_ttl_secs =
                ttl.parse().context("OAUTH_CLIENT_SECRET_TTL_SECS must be an integer")?;
        }
        if let Ok(cors) = std::env::var("OAUTH_CORS") {
            config.cors = matches!(cors.as_str(), "1" | "true" | "yes");
        }

        Ok(config)
    }

    /// Set the advertised scopes.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes_supported = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the rate limit for one endpoint, or remove it with `None`.
    #[must_use]
    pub fn with_rate_limit(mut self, endpoint: Endpoint, rule: Option<RateLimitRule>) -> Self {
        match rule {
            Some(rule) => self.rate_limits.insert(endpoint, rule),
            None => self.rate_limits.remove(&endpoint),
        };
        self
    }

    /// Require bearer tokens on the given path prefixes.
    #[must_use]
    pub fn with_bearer_protection(mut self, protection: BearerProtection) -> Self {
        self.bearer_protection = protection;
        self
    }

    /// Absolute URL of an endpoint.
    #[must_use]
    pub fn endpoint_url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    /// URL of the protected-resource metadata document, used in `WWW-Authenticate`.
    #[must_use]
    pub fn resource_metadata_url(&self) -> String {
        self.endpoint_url(Endpoint::ProtectedResourceMetadata)
    }

    /// Client secret expiry for a secret issued at `issued_at`; `0` means never.
    #[must_use]
    pub fn client_secret_expires_at(&self, issued_at: u64) -> u64 {
        u64::try_from(self.client_secret_ttl_secs)
            .ok()
            .filter(|ttl| *ttl > 0)
            .map_or(0, |ttl| issued_at.saturating_add(ttl))
    }
}
