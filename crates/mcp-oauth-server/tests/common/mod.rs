//! Shared fixtures for the HTTP-level tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, header};
use axum::response::Response;
use tower::ServiceExt;

use mcp_oauth_server::ServerConfig;
use mcp_oauth_server::clock::{ManualClock, UuidRandom};
use mcp_oauth_server::models::OAuthClientInformation;
use mcp_oauth_server::server::OAuthServer;
use mcp_oauth_server::server::oauth::{ClientStore, InMemoryClientStore, InMemoryOAuthProvider};

pub const BASE_URL: &str = "http://localhost:8080";
pub const REDIRECT_URI: &str = "https://app/cb";
pub const CONFIDENTIAL_SECRET: &str = "s3cret";

/// RFC 7636 Appendix B.
pub const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
pub const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

pub const NOW: u64 = 1_700_000_000;

pub struct TestServer {
    pub app: axum::Router,
    pub server: OAuthServer,
    pub store: InMemoryClientStore,
    pub provider: Arc<InMemoryOAuthProvider>,
    pub clock: ManualClock,
}

/// Server with pre-provisioned clients:
/// - `c1`: public, one redirect URI, scopes `read write`
/// - `multi`: public, two redirect URIs
/// - `conf`: confidential, secret expiring in one hour
pub async fn test_server(config: ServerConfig) -> TestServer {
    let clock = ManualClock::at_secs(NOW);
    let store = InMemoryClientStore::with_sources(Arc::new(clock.clone()), Arc::new(UuidRandom));

    store
        .insert(OAuthClientInformation::public("c1", vec![REDIRECT_URI.into()], Some("read write")))
        .await;
    store
        .insert(OAuthClientInformation::public(
            "multi",
            vec![REDIRECT_URI.into(), "https://app/other".into()],
            Some("read"),
        ))
        .await;
    store
        .insert(
            OAuthClientInformation::public("conf", vec![REDIRECT_URI.into()], Some("read write"))
                .with_secret(CONFIDENTIAL_SECRET, Some(NOW + 3600)),
        )
        .await;

    let clients: Arc<dyn ClientStore> = Arc::new(store.clone());
    let provider = Arc::new(InMemoryOAuthProvider::with_sources(
        clients,
        Arc::new(clock.clone()),
        Arc::new(UuidRandom),
    ));

    let server = OAuthServer::with_sources(
        config,
        provider.clone(),
        Arc::new(clock.clone()),
        Arc::new(UuidRandom),
    );
    let app = server.clone().into_router();

    TestServer { app, server, store, provider, clock }
}

pub async fn default_server() -> TestServer {
    test_server(ServerConfig::for_testing(BASE_URL)).await
}

pub async fn send(app: &axum::Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

pub fn post_form(uri: &str, params: &[(&str, &str)]) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(serde_urlencoded::to_string(params).unwrap()))
        .unwrap()
}

pub fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Query parameters of the `Location` header.
pub fn location_params(response: &Response) -> HashMap<String, String> {
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    url::Url::parse(location).unwrap().query_pairs().into_owned().collect()
}

pub fn authorize_uri(client_id: &str, scope: Option<&str>) -> String {
    let mut params = vec![
        ("client_id", client_id),
        ("response_type", "code"),
        ("code_challenge", CHALLENGE),
        ("code_challenge_method", "S256"),
        ("state", "xyz"),
    ];
    if let Some(scope) = scope {
        params.push(("scope", scope));
    }
    format!("/authorize?{}", serde_urlencoded::to_string(params).unwrap())
}

/// Run `/authorize` for `client_id` and return the issued code.
pub async fn issue_code(app: &axum::Router, client_id: &str, scope: &str) -> String {
    let response = send(app, get(&authorize_uri(client_id, Some(scope)))).await;
    assert_eq!(response.status(), axum::http::StatusCode::FOUND);
    location_params(&response).remove("code").expect("code in redirect")
}

pub async fn exchange_code(app: &axum::Router, client_id: &str, code: &str, verifier: &str) -> Response {
    send(
        app,
        post_form(
            "/token",
            &[
                ("grant_type", "authorization_code"),
                ("client_id", client_id),
                ("code", code),
                ("code_verifier", verifier),
            ],
        ),
    )
    .await
}

pub async fn refresh(app: &axum::Router, client_id: &str, refresh_token: &str, scope: Option<&str>) -> Response {
    let mut params = vec![
        ("grant_type", "refresh_token"),
        ("client_id", client_id),
        ("refresh_token", refresh_token),
    ];
    if let Some(scope) = scope {
        params.push(("scope", scope));
    }
    send(app, post_form("/token", &params)).await
}
