//! Integration tests for the identity API client

#![cfg(feature = "client")]

use portcullis_core::config::ApiConfig;
use portcullis_core::store::{TokenKind, TokenStore};
use portcullis_http::client::{ApiClient, IdentityClient, SignupOutcome, error::ClientError};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn identity_for(server: &MockServer, store: TokenStore) -> IdentityClient {
    let config = ApiConfig {
        base_url: server.uri(),
        ..ApiConfig::default()
    };
    IdentityClient::from_config(&config, store).unwrap()
}

#[tokio::test]
async fn test_client_builder() {
    let client = ApiClient::builder()
        .base_url("http://localhost:8080/")
        .build()
        .unwrap();
    assert_eq!(client.base_url(), "http://localhost:8080");
}

#[tokio::test]
async fn test_client_builder_requires_base_url() {
    let result = ApiClient::builder().build();
    assert!(matches!(result, Err(ClientError::Configuration(_))));

    let result = ApiClient::new("localhost:8080");
    assert!(matches!(result, Err(ClientError::Configuration(_))));
}

#[tokio::test]
async fn test_login_posts_credentials() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({ "email": "a@b.com", "password": "pw" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "X",
            "refreshToken": "Y"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let identity = identity_for(&mock_server, TokenStore::in_memory());
    let response = identity.login("a@b.com", "pw").await.unwrap();

    assert_eq!(response.access_token, "X");
    assert_eq!(response.refresh_token, "Y");
    assert!(response.user.is_none());
    // Persisting the pair is the session manager's job
    assert!(identity.store().get(TokenKind::Access).is_none());
}

#[tokio::test]
async fn test_login_rejection_carries_message() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "message": "Bad credentials" })),
        )
        .mount(&mock_server)
        .await;

    let identity = identity_for(&mock_server, TokenStore::in_memory());
    let error = identity.login("a@b.com", "wrong").await.unwrap_err();

    assert!(matches!(error, ClientError::AuthenticationFailed(ref m) if m == "Bad credentials"));
}

#[tokio::test]
async fn test_signup_with_and_without_session() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/signup"))
        .and(body_json(json!({ "name": "Ada", "email": "ada@example.com", "password": "pw" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "A",
            "refreshToken": "R",
            "user": { "id": 3, "name": "Ada", "email": "ada@example.com", "roles": ["USER"] }
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/signup"))
        .and(body_json(json!({ "name": "Bob", "email": "bob@example.com", "password": "pw" })))
        .respond_with(ResponseTemplate::new(201))
        .mount(&mock_server)
        .await;

    let identity = identity_for(&mock_server, TokenStore::in_memory());

    match identity.signup("Ada", "ada@example.com", "pw").await.unwrap() {
        SignupOutcome::Session(session) => {
            assert_eq!(session.access_token, "A");
            assert_eq!(session.user.unwrap().id, "3");
        }
        SignupOutcome::LoginRequired => panic!("expected a session"),
    }

    assert!(matches!(
        identity.signup("Bob", "bob@example.com", "pw").await.unwrap(),
        SignupOutcome::LoginRequired
    ));
}

#[tokio::test]
async fn test_signup_validation_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/signup"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({ "message": "Email already in use" })),
        )
        .mount(&mock_server)
        .await;

    let identity = identity_for(&mock_server, TokenStore::in_memory());
    let error = identity.signup("Ada", "ada@example.com", "pw").await.unwrap_err();

    assert_eq!(error.status(), Some(409));
    assert_eq!(error.server_message(), Some("Email already in use"));
}

#[tokio::test]
async fn test_google_auth_url_shapes() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/oauth2/google/url"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "url": "https://accounts.google.com/o/oauth2/auth?x=1" })),
        )
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/oauth2/google/url"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("https://accounts.google.com/plain\n"),
        )
        .mount(&mock_server)
        .await;

    let identity = identity_for(&mock_server, TokenStore::in_memory());

    assert_eq!(
        identity.google_auth_url().await.unwrap(),
        "https://accounts.google.com/o/oauth2/auth?x=1"
    );
    assert_eq!(
        identity.google_auth_url().await.unwrap(),
        "https://accounts.google.com/plain"
    );
}

#[tokio::test]
async fn test_google_auth_url_without_url_is_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/oauth2/google/url"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "error": "provider disabled" })),
        )
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/oauth2/google/url"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .mount(&mock_server)
        .await;

    let identity = identity_for(&mock_server, TokenStore::in_memory());

    let error = identity.google_auth_url().await.unwrap_err();
    assert!(matches!(error, ClientError::ServerError { ref message, .. } if message == "provider disabled"));

    let error = identity.google_auth_url().await.unwrap_err();
    assert!(matches!(error, ClientError::ServerError { status: 200, .. }));
}

#[tokio::test]
async fn test_google_login_posts_id_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/google/login"))
        .and(body_json(json!({ "idToken": "google-id-token" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "G",
            "refreshToken": "H"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let identity = identity_for(&mock_server, TokenStore::in_memory());
    let response = identity.google_login("google-id-token").await.unwrap();

    assert_eq!(response.access_token, "G");
    assert_eq!(response.refresh_token, "H");
}

#[tokio::test]
async fn test_configurable_endpoint_prefix() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth-service/api/v1/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "X",
            "refreshToken": "Y"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = ApiConfig {
        base_url: mock_server.uri(),
        auth_path: "/auth-service/api/v1/auth".to_string(),
        ..ApiConfig::default()
    };
    let identity = IdentityClient::from_config(&config, TokenStore::in_memory()).unwrap();

    assert!(identity.login("a@b.com", "pw").await.is_ok());
}

#[tokio::test]
async fn test_unreachable_service_is_a_network_error() {
    // Nothing listens on the discard port
    let client = ApiClient::new("http://127.0.0.1:9").unwrap();
    let identity = IdentityClient::new(client, TokenStore::in_memory(), &ApiConfig::default());

    let error = identity.login("a@b.com", "pw").await.unwrap_err();
    assert!(error.is_network(), "unexpected error: {error}");
    assert!(!error.is_auth_failure());
}
