//! Endpoint-level tests for the OAuth router.
//!
//! Each section exercises one endpoint's error handling through HTTP.

mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;

use common::*;
use mcp_oauth_server::ServerConfig;
use mcp_oauth_server::config::{Endpoint, RateLimitRule};

// ─── Discovery ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_protected_resource_metadata() {
    let t = default_server().await;
    let response = send(&t.app, get("/.well-known/oauth-protected-resource")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["resource"], BASE_URL);
    assert_eq!(json["authorization_servers"], json!([BASE_URL]));
    assert_eq!(json["scopes_supported"], json!(["read", "write"]));
    assert_eq!(json["bearer_methods_supported"], json!(["header"]));
}

#[tokio::test]
async fn test_auth_server_metadata() {
    let t = default_server().await;
    let response = send(&t.app, get("/.well-known/oauth-authorization-server")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["issuer"], BASE_URL);
    assert_eq!(json["authorization_endpoint"], format!("{BASE_URL}/authorize"));
    assert_eq!(json["token_endpoint"], format!("{BASE_URL}/token"));
    assert_eq!(json["revocation_endpoint"], format!("{BASE_URL}/revoke"));
    assert_eq!(json["response_types_supported"], json!(["code"]));
    assert_eq!(json["grant_types_supported"], json!(["authorization_code", "refresh_token"]));
    assert_eq!(json["code_challenge_methods_supported"], json!(["S256"]));
    assert!(json.get("service_documentation").is_none());
}

#[tokio::test]
async fn test_metadata_is_get_only() {
    let t = default_server().await;
    let response = send(&t.app, post_form("/.well-known/oauth-authorization-server", &[])).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[header::ALLOW], "GET");
}

// ─── Authorization Endpoint ──────────────────────────────────────────────────

#[tokio::test]
async fn test_authorize_unknown_client_is_direct_error() {
    let t = default_server().await;
    let response = send(&t.app, get(&authorize_uri("ghost", Some("read")))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get(header::LOCATION).is_none());
    assert_eq!(body_json(response).await["error"], "invalid_client");
}

#[tokio::test]
async fn test_authorize_missing_client_id() {
    let t = default_server().await;
    let response = send(&t.app, get("/authorize?response_type=code")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_authorize_unregistered_redirect_is_never_followed() {
    let t = default_server().await;
    let uri = format!(
        "{}&redirect_uri={}",
        authorize_uri("c1", Some("read")),
        "https%3A%2F%2Fevil.example%2Fcb"
    );
    let response = send(&t.app, get(&uri)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get(header::LOCATION).is_none());
}

#[tokio::test]
async fn test_authorize_ambiguous_redirect() {
    let t = default_server().await;
    let response = send(&t.app, get(&authorize_uri("multi", Some("read")))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_request");

    let uri = format!("{}&redirect_uri=https%3A%2F%2Fapp%2Fother", authorize_uri("multi", Some("read")));
    let response = send(&t.app, get(&uri)).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("https://app/other?code="));
}

#[tokio::test]
async fn test_authorize_unknown_scope_redirects_with_error() {
    let t = default_server().await;
    let response = send(&t.app, get(&authorize_uri("c1", Some("admin")))).await;
    assert_eq!(response.status(), StatusCode::FOUND);

    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("https://app/cb?error=invalid_scope"));
    let params = location_params(&response);
    assert_eq!(params["state"], "xyz");
    assert!(params.contains_key("error_description"));
    assert!(!params.contains_key("code"));
}

#[tokio::test]
async fn test_authorize_phase_two_errors_redirect() {
    let t = default_server().await;
    let cases = [
        ("response_type=token", "invalid_request"),
        ("code_challenge_method=plain", "invalid_request"),
    ];

    for (override_param, expected) in cases {
        let (key, value) = override_param.split_once('=').unwrap();
        let mut params = vec![
            ("client_id", "c1"),
            ("response_type", "code"),
            ("code_challenge", CHALLENGE),
            ("code_challenge_method", "S256"),
        ];
        params.retain(|(k, _)| *k != key);
        params.push((key, value));
        let uri = format!("/authorize?{}", serde_urlencoded::to_string(&params).unwrap());

        let response = send(&t.app, get(&uri)).await;
        assert_eq!(response.status(), StatusCode::FOUND, "{override_param}");
        assert_eq!(location_params(&response)["error"], expected);
    }
}

#[tokio::test]
async fn test_authorize_post_form() {
    let t = default_server().await;
    let response = send(
        &t.app,
        post_form(
            "/authorize",
            &[
                ("client_id", "c1"),
                ("response_type", "code"),
                ("code_challenge", CHALLENGE),
                ("code_challenge_method", "S256"),
                ("scope", "read write"),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    assert!(location_params(&response).contains_key("code"));
}

#[tokio::test]
async fn test_authorize_rejects_other_methods() {
    let t = default_server().await;
    let request = Request::delete("/authorize").body(Body::empty()).unwrap();
    let response = send(&t.app, request).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[header::ALLOW], "GET, POST");
}

// ─── Token Endpoint ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_code_is_single_use() {
    let t = default_server().await;
    let code = issue_code(&t.app, "c1", "read").await;

    let first = exchange_code(&t.app, "c1", &code, VERIFIER).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = exchange_code(&t.app, "c1", &code, VERIFIER).await;
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(second).await["error"], "invalid_grant");
}

#[tokio::test]
async fn test_concurrent_redemption_succeeds_once() {
    let t = default_server().await;
    let code = issue_code(&t.app, "c1", "read").await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let app = t.app.clone();
        let code = code.clone();
        handles.push(tokio::spawn(async move {
            exchange_code(&app, "c1", &code, VERIFIER).await.status()
        }));
    }

    let mut ok = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::OK => ok += 1,
            status => assert_eq!(status, StatusCode::BAD_REQUEST),
        }
    }
    assert_eq!(ok, 1);
}

#[tokio::test]
async fn test_pkce_mismatch_does_not_consume_code() {
    let t = default_server().await;
    let code = issue_code(&t.app, "c1", "read").await;

    let response = exchange_code(&t.app, "c1", &code, "wrong-verifier").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_grant");

    let response = exchange_code(&t.app, "c1", &code, VERIFIER).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_code_verifier() {
    let t = default_server().await;
    let code = issue_code(&t.app, "c1", "read").await;
    let response = send(
        &t.app,
        post_form("/token", &[("grant_type", "authorization_code"), ("client_id", "c1"), ("code", &code)]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_code_bound_to_client() {
    let t = default_server().await;
    let code = issue_code(&t.app, "c1", "read").await;
    let response = send(
        &t.app,
        post_form(
            "/token",
            &[
                ("grant_type", "authorization_code"),
                ("client_id", "conf"),
                ("client_secret", CONFIDENTIAL_SECRET),
                ("code", &code),
                ("code_verifier", VERIFIER),
            ],
        ),
    )
    .await;
    assert_eq!(body_json(response).await["error"], "invalid_grant");
}

#[tokio::test]
async fn test_expired_code() {
    let t = default_server().await;
    let code = issue_code(&t.app, "c1", "read").await;
    t.clock.advance(Duration::from_secs(601));

    let response = exchange_code(&t.app, "c1", &code, VERIFIER).await;
    assert_eq!(body_json(response).await["error"], "invalid_grant");
}

#[tokio::test]
async fn test_unsupported_grant_type() {
    let t = default_server().await;
    let response = send(
        &t.app,
        post_form("/token", &[("grant_type", "password"), ("client_id", "c1")]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "unsupported_grant_type");
}

#[tokio::test]
async fn test_confidential_client_authentication() {
    let t = default_server().await;
    let code = issue_code(&t.app, "conf", "read").await;

    // Wrong secret
    let response = send(
        &t.app,
        post_form(
            "/token",
            &[
                ("grant_type", "authorization_code"),
                ("client_id", "conf"),
                ("client_secret", "nope"),
                ("code", &code),
                ("code_verifier", VERIFIER),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "invalid_client");

    // HTTP Basic
    let basic = STANDARD.encode(format!("conf:{CONFIDENTIAL_SECRET}"));
    let request = Request::post("/token")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::AUTHORIZATION, format!("Basic {basic}"))
        .body(Body::from(
            serde_urlencoded::to_string([
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("code_verifier", VERIFIER),
            ])
            .unwrap(),
        ))
        .unwrap();
    let response = send(&t.app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_expired_client_secret() {
    let t = default_server().await;
    t.clock.advance(Duration::from_secs(3601));
    let response = send(
        &t.app,
        post_form(
            "/token",
            &[
                ("grant_type", "refresh_token"),
                ("client_id", "conf"),
                ("client_secret", CONFIDENTIAL_SECRET),
                ("refresh_token", "whatever"),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_client_at_token() {
    let t = default_server().await;
    let response = send(
        &t.app,
        post_form("/token", &[("grant_type", "refresh_token"), ("client_id", "ghost"), ("refresh_token", "x")]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "invalid_client");
}

// ─── Refresh Rotation ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_refresh_rotation_rejects_reuse() {
    let t = default_server().await;
    let code = issue_code(&t.app, "c1", "read write").await;
    let tokens = body_json(exchange_code(&t.app, "c1", &code, VERIFIER).await).await;
    let old_refresh = tokens["refresh_token"].as_str().unwrap();

    let response = refresh(&t.app, "c1", old_refresh, Some("read")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = body_json(response).await;
    assert_eq!(rotated["scope"], "read");
    assert_ne!(rotated["refresh_token"], tokens["refresh_token"]);

    let response = refresh(&t.app, "c1", old_refresh, None).await;
    assert_eq!(body_json(response).await["error"], "invalid_grant");
}

#[tokio::test]
async fn test_refresh_cannot_widen_scope() {
    let t = default_server().await;
    let code = issue_code(&t.app, "c1", "read").await;
    let tokens = body_json(exchange_code(&t.app, "c1", &code, VERIFIER).await).await;
    let refresh_token = tokens["refresh_token"].as_str().unwrap();

    for scope in ["read write", "admin"] {
        let response = refresh(&t.app, "c1", refresh_token, Some(scope)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "invalid_scope");
    }
}

#[tokio::test]
async fn test_concurrent_refresh_rotates_once() {
    let t = default_server().await;
    let code = issue_code(&t.app, "c1", "read").await;
    let tokens = body_json(exchange_code(&t.app, "c1", &code, VERIFIER).await).await;
    let refresh_token = tokens["refresh_token"].as_str().unwrap().to_string();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let app = t.app.clone();
        let token = refresh_token.clone();
        handles.push(tokio::spawn(async move { refresh(&app, "c1", &token, None).await.status() }));
    }

    let mut ok = 0;
    for handle in handles {
        if handle.await.unwrap() == StatusCode::OK {
            ok += 1;
        }
    }
    assert_eq!(ok, 1);
}

#[tokio::test]
async fn test_empty_refresh_scope_keeps_grant() {
    let t = default_server().await;
    let code = issue_code(&t.app, "c1", "read write").await;
    let tokens = body_json(exchange_code(&t.app, "c1", &code, VERIFIER).await).await;

    let response = refresh(&t.app, "c1", tokens["refresh_token"].as_str().unwrap(), Some("")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["scope"], "read write");
}

#[tokio::test]
async fn test_grant_must_be_registered() {
    let t = default_server().await;
    let response = send(
        &t.app,
        post_json(
            "/register",
            &json!({
                "redirect_uris": ["https://client.example.com/cb"],
                "token_endpoint_auth_method": "none",
                "grant_types": ["authorization_code"],
                "scope": "read"
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let client_id = body_json(response).await["client_id"].as_str().unwrap().to_string();

    // Code exchange works but yields no refresh token.
    let code = issue_code(&t.app, &client_id, "read").await;
    let response = exchange_code(&t.app, &client_id, &code, VERIFIER).await;
    assert_eq!(response.status(), StatusCode::OK);
    let tokens = body_json(response).await;
    assert!(tokens["access_token"].is_string());
    assert!(tokens.get("refresh_token").is_none());

    // Borrow c1's refresh token: the grant check fires before the token lookup.
    let code = issue_code(&t.app, "c1", "read").await;
    let c1_tokens = body_json(exchange_code(&t.app, "c1", &code, VERIFIER).await).await;
    let response =
        refresh(&t.app, &client_id, c1_tokens["refresh_token"].as_str().unwrap(), None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "unauthorized_client");
}

#[tokio::test]
async fn test_refresh_only_client_cannot_redeem_codes() {
    let t = default_server().await;
    let mut client = mcp_oauth_server::models::OAuthClientInformation::public(
        "refresh-only",
        vec![REDIRECT_URI.into()],
        Some("read"),
    );
    client.metadata.grant_types = Some(vec!["refresh_token".into()]);
    t.store.insert(client).await;

    let code = issue_code(&t.app, "refresh-only", "read").await;
    let response = exchange_code(&t.app, "refresh-only", &code, VERIFIER).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "unauthorized_client");
}

// ─── Registration ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_register_confidential_client() {
    let t = default_server().await;
    let response = send(
        &t.app,
        post_json(
            "/register",
            &json!({
                "redirect_uris": ["https://client.example.com/cb"],
                "client_name": "Confidential",
                "contacts": ["ops@example.com"]
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");

    let client = body_json(response).await;
    assert!(!client["client_secret"].as_str().unwrap().is_empty());
    assert_eq!(client["client_id_issued_at"], NOW);
    assert_eq!(client["client_secret_expires_at"], NOW + 30 * 24 * 3600);
    assert_eq!(client["token_endpoint_auth_method"], "client_secret_post");
    assert_eq!(client["grant_types"], json!(["authorization_code", "refresh_token"]));
    assert_eq!(client["response_types"], json!(["code"]));

    let id = client["client_id"].as_str().unwrap();
    assert_eq!(t.store.len().await, 4);
    assert!(
        mcp_oauth_server::server::oauth::ClientStore::get_client(&t.store, id)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_register_never_expiring_secret() {
    let mut config = ServerConfig::for_testing(BASE_URL);
    config.client_secret_ttl_secs = 0;
    let t = test_server(config).await;

    let response =
        send(&t.app, post_json("/register", &json!({"redirect_uris": ["https://a/cb"]}))).await;
    assert_eq!(body_json(response).await["client_secret_expires_at"], 0);
}

#[tokio::test]
async fn test_register_invalid_metadata() {
    let t = default_server().await;
    let cases = [
        json!({"redirect_uris": []}),
        json!({"redirect_uris": ["not a url"]}),
        json!({"redirect_uris": ["https://a/cb#section"]}),
        json!({"redirect_uris": ["https://a/cb"], "contacts": ["nope"]}),
        json!({"redirect_uris": ["https://a/cb"], "logo_uri": "::"}),
        json!({"client_name": "no uris"}),
    ];

    for body in cases {
        let response = send(&t.app, post_json("/register", &body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(body_json(response).await["error"], "invalid_client_metadata");
    }
}

// ─── Revocation ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_revoke_is_enumeration_safe() {
    let t = default_server().await;
    let code = issue_code(&t.app, "c1", "read").await;
    let tokens = body_json(exchange_code(&t.app, "c1", &code, VERIFIER).await).await;
    let access = tokens["access_token"].as_str().unwrap();

    let unknown =
        send(&t.app, post_form("/revoke", &[("client_id", "c1"), ("token", "does-not-exist")])).await;
    let foreign = send(
        &t.app,
        post_form(
            "/revoke",
            &[("client_id", "conf"), ("client_secret", CONFIDENTIAL_SECRET), ("token", access)],
        ),
    )
    .await;
    let real = send(
        &t.app,
        post_form("/revoke", &[("client_id", "c1"), ("token", access), ("token_type_hint", "access_token")]),
    )
    .await;

    for response in [unknown, foreign, real] {
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({}));
    }
}

#[tokio::test]
async fn test_revoke_requires_client_auth() {
    let t = default_server().await;
    let response = send(
        &t.app,
        post_form("/revoke", &[("client_id", "conf"), ("client_secret", "bad"), ("token", "t")]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "invalid_client");
}

#[tokio::test]
async fn test_revoked_refresh_token_cannot_be_used() {
    let t = default_server().await;
    let code = issue_code(&t.app, "c1", "read").await;
    let tokens = body_json(exchange_code(&t.app, "c1", &code, VERIFIER).await).await;
    let refresh_token = tokens["refresh_token"].as_str().unwrap();

    let response = send(
        &t.app,
        post_form("/revoke", &[("client_id", "c1"), ("token", refresh_token), ("token_type_hint", "refresh_token")]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = refresh(&t.app, "c1", refresh_token, None).await;
    assert_eq!(body_json(response).await["error"], "invalid_grant");
}

// ─── Router ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_rate_limit_returns_429_with_retry_after() {
    let config = ServerConfig::for_testing(BASE_URL)
        .with_rate_limit(Endpoint::Token, Some(RateLimitRule::new(2, Duration::from_secs(60))));
    let t = test_server(config).await;
    let form = [("grant_type", "refresh_token"), ("client_id", "c1"), ("refresh_token", "x")];

    for remaining in ["1", "0"] {
        let response = send(&t.app, post_form("/token", &form)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["ratelimit-remaining"], remaining);
    }

    t.clock.advance(Duration::from_millis(15_500));
    let response = send(&t.app, post_form("/token", &form)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[header::RETRY_AFTER], "45");
    assert_eq!(body_json(response).await["error"], "too_many_requests");

    // Other endpoints are unaffected; the window resets.
    let response = send(&t.app, get("/.well-known/oauth-authorization-server")).await;
    assert_eq!(response.status(), StatusCode::OK);

    t.clock.advance(Duration::from_secs(45));
    let response = send(&t.app, post_form("/token", &form)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cors_preflight_and_headers() {
    let t = default_server().await;
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/token")
        .header(header::ORIGIN, "https://app")
        .body(Body::empty())
        .unwrap();
    let response = send(&t.app, request).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, POST, OPTIONS");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "Authorization, Content-Type");
    assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "86400");
    let exposed = headers[header::ACCESS_CONTROL_EXPOSE_HEADERS].to_str().unwrap();
    for name in ["WWW-Authenticate", "Retry-After", "RateLimit-Remaining", "RateLimit-Reset"] {
        assert!(exposed.contains(name), "{name} not exposed");
    }

    let response = send(&t.app, get("/.well-known/oauth-protected-resource")).await;
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

    // Routes composed behind the OAuth router are left alone.
    let app = t.server.layer(axum::Router::new().route("/app", axum::routing::get(|| async { "ok" })));
    let response = send(&app, get("/app")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}
