//! Identity service endpoints

use super::error::ClientError;
use super::gateway::{ApiRequest, AuthGateway};
use super::ApiClient;
use portcullis_core::config::ApiConfig;
use portcullis_core::store::TokenStore;
use portcullis_core::types::{
    AuthResponse, ErrorBody, GoogleLoginRequest, LoginRequest, OAuthUrlResponse, Profile,
    SignupRequest,
};
use reqwest::Method;
use tracing::{debug, info};

/// Result of a signup call
#[derive(Debug, Clone)]
pub enum SignupOutcome {
    /// The service logged the new account in right away
    Session(AuthResponse),
    /// Account created without a session; the user has to log in
    LoginRequired,
}

/// Typed access to the identity service
#[derive(Clone)]
pub struct IdentityClient {
    public: ApiClient,
    gateway: AuthGateway,
    login_path: String,
    signup_path: String,
    me_path: String,
    google_login_path: String,
    google_url_path: String,
}

impl IdentityClient {
    /// Build the public client and the refreshing gateway from configuration
    pub fn from_config(config: &ApiConfig, store: TokenStore) -> Result<Self, ClientError> {
        let mut builder = ApiClient::builder().base_url(&config.base_url);
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        Ok(Self::new(builder.build()?, store, config))
    }

    pub fn new(client: ApiClient, store: TokenStore, config: &ApiConfig) -> Self {
        let gateway = AuthGateway::new(
            client.clone(),
            store,
            config.auth_endpoint("refresh-token"),
        );

        Self {
            public: client,
            gateway,
            login_path: config.auth_endpoint("login"),
            signup_path: config.auth_endpoint("signup"),
            me_path: config.auth_endpoint("me"),
            google_login_path: config.auth_endpoint("google/login"),
            google_url_path: config.oauth_endpoint("google/url"),
        }
    }

    pub const fn gateway(&self) -> &AuthGateway {
        &self.gateway
    }

    pub fn store(&self) -> &TokenStore {
        self.gateway.store()
    }

    /// Exchange credentials for a token pair (public endpoint)
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ClientError> {
        info!(path = %self.login_path, "Logging in");
        let request = self
            .public
            .request(Method::POST, &self.login_path)
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            });
        self.public.execute(request).await
    }

    /// Exchange a Google ID token for a token pair (public endpoint)
    pub async fn google_login(&self, id_token: &str) -> Result<AuthResponse, ClientError> {
        info!(path = %self.google_login_path, "Logging in with Google");
        let request = self
            .public
            .request(Method::POST, &self.google_login_path)
            .json(&GoogleLoginRequest {
                id_token: id_token.to_string(),
            });
        self.public.execute(request).await
    }

    /// Register an account (public endpoint)
    ///
    /// Some deployments answer with a session, others with an empty or
    /// informational 2xx body; the latter means "go log in".
    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<SignupOutcome, ClientError> {
        info!(path = %self.signup_path, "Signing up");
        let request = self
            .public
            .request(Method::POST, &self.signup_path)
            .json(&SignupRequest {
                name: name.to_string(),
                email: email.to_string(),
                password: password.to_string(),
            });
        let body = self.public.execute_text(request).await?;

        Ok(match serde_json::from_str::<AuthResponse>(&body) {
            Ok(session) => SignupOutcome::Session(session),
            Err(_) => {
                debug!("Signup response carried no session");
                SignupOutcome::LoginRequired
            }
        })
    }

    /// Fetch the profile of the session owner (requires authentication)
    pub async fn current_user(&self) -> Result<Profile, ClientError> {
        self.gateway.execute(&ApiRequest::get(&self.me_path)).await
    }

    /// Ask the OAuth integration for the Google consent URL (public endpoint)
    pub async fn google_auth_url(&self) -> Result<String, ClientError> {
        let request = self.public.request(Method::GET, &self.google_url_path);
        let body = self.public.execute_text(request).await?;

        let url = match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(value) => match serde_json::from_value::<OAuthUrlResponse>(value.clone()) {
                Ok(parsed) => parsed.into_url(),
                Err(_) => {
                    let message = serde_json::from_value::<ErrorBody>(value)
                        .ok()
                        .and_then(ErrorBody::into_message)
                        .unwrap_or_else(|| "OAuth URL response carried no url".to_string());
                    return Err(ClientError::ServerError {
                        status: 200,
                        message,
                    });
                }
            },
            // Some deployments send the URL as plain text
            Err(_) => body.trim().to_string(),
        };

        if url.is_empty() {
            return Err(ClientError::ServerError {
                status: 200,
                message: "OAuth URL response was empty".to_string(),
            });
        }
        Ok(url)
    }
}
