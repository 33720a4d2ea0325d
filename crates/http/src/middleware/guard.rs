//! Route guard middleware for the server that hands out the front-end pages
//!
//! Runs before any page renders and decides from the access token alone. The
//! token is looked up in the `accessToken` cookie, then an `Authorization:
//! Bearer` header, then a `token` query parameter.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use portcullis_core::guard::{GuardDecision, RouteGuard};
use portcullis_core::store::TokenKind;
use std::sync::Arc;
use tracing::debug;

/// Query parameter carrying a token handed over by a redirect
pub const TOKEN_QUERY_PARAM: &str = "token";

/// API calls and static assets are never guarded
pub fn should_skip_guard(path: &str) -> bool {
    path == "/api"
        || path.starts_with("/api/")
        || path.starts_with("/_next/static")
        || path.starts_with("/_next/image")
        || path.starts_with("/static/")
        || path.starts_with("/assets/")
        || path == "/favicon.ico"
}

/// Find the access token a navigation carries
pub fn extract_token(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    cookie_value(headers, TokenKind::Access.storage_key())
        .or_else(|| bearer_token(headers))
        .or_else(|| {
            query.and_then(|query| {
                url::form_urlencoded::parse(query.as_bytes())
                    .find(|(key, _)| key == TOKEN_QUERY_PARAM)
                    .map(|(_, value)| value.into_owned())
            })
        })
        .filter(|token| !token.is_empty())
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
}

/// Middleware applying the [`RouteGuard`] to every navigation
pub async fn route_guard_middleware(
    State(guard): State<Arc<RouteGuard>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if should_skip_guard(&path) {
        return next.run(request).await;
    }

    let token = extract_token(request.headers(), request.uri().query());
    debug!(path = %path, token_present = token.is_some(), "Guarding navigation");

    match guard.evaluate(&path, token.as_deref()) {
        GuardDecision::Allow => next.run(request).await,
        GuardDecision::Redirect(target) => Redirect::temporary(&target).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_cookie_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("locale=tr; accessToken=from-cookie; theme=dark"),
        );
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );

        assert_eq!(
            extract_token(&headers, Some("token=from-query")).as_deref(),
            Some("from-cookie")
        );
    }

    #[test]
    fn test_header_then_query_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );
        assert_eq!(
            extract_token(&headers, Some("token=q")).as_deref(),
            Some("from-header")
        );

        let headers = HeaderMap::new();
        assert_eq!(
            extract_token(&headers, Some("a=1&token=from%2Dquery")).as_deref(),
            Some("from-query")
        );
        assert!(extract_token(&headers, Some("token=")).is_none());
        assert!(extract_token(&headers, None).is_none());
    }

    #[test]
    fn test_basic_auth_is_not_a_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwYXNz"),
        );
        assert!(extract_token(&headers, None).is_none());
    }

    #[test]
    fn test_skip_list() {
        assert!(should_skip_guard("/api/users"));
        assert!(should_skip_guard("/favicon.ico"));
        assert!(should_skip_guard("/_next/static/chunk.js"));
        assert!(!should_skip_guard("/dashboard"));
        assert!(!should_skip_guard("/apiary"));
    }
}
