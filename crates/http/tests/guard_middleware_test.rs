//! Route guard middleware mounted in an axum router

#![cfg(feature = "server")]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    middleware::from_fn_with_state,
    routing::get,
};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use portcullis_core::guard::RouteGuard;
use portcullis_http::middleware::route_guard_middleware;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

fn token_expiring_in(seconds: i64) -> String {
    let claims = json!({
        "sub": "1",
        "email": "ada@example.com",
        "roles": ["USER"],
        "exp": Utc::now().timestamp() + seconds,
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"test-secret"),
    )
    .unwrap()
}

fn app() -> Router {
    let guard = Arc::new(RouteGuard::default());
    Router::new()
        .route("/dashboard", get(|| async { "dashboard" }))
        .route("/login", get(|| async { "login" }))
        .route("/api/users", get(|| async { "users" }))
        .layer(from_fn_with_state(guard, route_guard_middleware))
}

async fn navigate(request: Request<Body>) -> (StatusCode, Option<String>) {
    let response = app().oneshot(request).await.unwrap();
    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    (response.status(), location)
}

fn get_request(uri: &str) -> axum::http::request::Builder {
    Request::builder().method("GET").uri(uri)
}

#[tokio::test]
async fn test_protected_page_without_token_redirects_to_login() {
    let (status, location) = navigate(get_request("/dashboard").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location.as_deref(), Some("/login"));
}

#[tokio::test]
async fn test_protected_page_with_valid_cookie_is_served() {
    let cookie = format!("accessToken={}", token_expiring_in(3600));
    let request = get_request("/dashboard")
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap();

    let (status, location) = navigate(request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(location.is_none());
}

#[tokio::test]
async fn test_expired_token_redirects_to_login() {
    let request = get_request("/dashboard")
        .header(
            header::AUTHORIZATION,
            format!("Bearer {}", token_expiring_in(-1)),
        )
        .body(Body::empty())
        .unwrap();

    let (status, location) = navigate(request).await;
    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location.as_deref(), Some("/login"));
}

#[tokio::test]
async fn test_malformed_token_redirects_to_login() {
    let request = get_request("/dashboard")
        .header(header::COOKIE, "accessToken=not-a-jwt")
        .body(Body::empty())
        .unwrap();

    let (status, location) = navigate(request).await;
    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location.as_deref(), Some("/login"));
}

#[tokio::test]
async fn test_signed_in_user_is_sent_away_from_login() {
    let uri = format!("/login?token={}", token_expiring_in(3600));
    let (status, location) = navigate(get_request(&uri).body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location.as_deref(), Some("/dashboard"));
}

#[tokio::test]
async fn test_login_page_served_without_token() {
    let (status, _) = navigate(get_request("/login").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_api_routes_are_not_guarded() {
    let (status, _) = navigate(get_request("/api/users").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
}
