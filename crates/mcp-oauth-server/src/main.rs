//! MCP OAuth Server - Entry Point
//!
//! Runs the authorization server over HTTP with the in-memory provider.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use mcp_oauth_server::{
    ServerConfig,
    server::{
        OAuthServer,
        oauth::{InMemoryOAuthProvider, OAuthServerProvider},
    },
};

#[derive(Parser, Debug)]
#[command(name = "mcp-oauth-server")]
#[command(about = "OAuth 2.1 authorization server for MCP")]
#[command(version)]
struct Cli {
    /// Issuer URL (e.g., https://auth.example.com). Falls back to OAUTH_ISSUER_URL
    /// and the other OAUTH_* variables when omitted.
    #[arg(long)]
    issuer_url: Option<String>,

    /// HTTP server port
    #[arg(long, default_value = "8000", env = "PORT")]
    port: u16,

    /// Space-separated scopes to advertise, overriding OAUTH_SCOPES
    #[arg(long)]
    scopes: Option<String>,

    /// Disable rate limiting
    #[arg(long)]
    no_rate_limit: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting MCP OAuth server");

    let mut config = match &cli.issuer_url {
        Some(issuer) => ServerConfig::new(issuer)?,
        None => ServerConfig::from_env()?,
    };
    if let Some(scopes) = &cli.scopes {
        config = config.with_scopes(scopes.split_whitespace());
    }
    if cli.no_rate_limit {
        tracing::warn!("Rate limiting disabled");
        config.rate_limits.clear();
    }

    let provider = Arc::new(InMemoryOAuthProvider::new());
    Arc::clone(&provider).start_cleanup_task();

    let provider: Arc<dyn OAuthServerProvider> = provider;
    let server = OAuthServer::new(config, provider);
    server.run_http(cli.port).await
}
