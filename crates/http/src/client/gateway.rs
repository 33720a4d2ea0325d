//! Authenticated request gateway
//!
//! Every request picks up the current access token from the [`TokenStore`].
//! When the service answers 401 or 403, the gateway exchanges the refresh
//! token for a new access token and re-issues the request exactly once.
//! Concurrent failures share one in-flight refresh instead of each starting
//! their own.

use super::error::ClientError;
use super::{ApiClient, decode_json};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use portcullis_core::store::{TokenKind, TokenStore};
use portcullis_core::types::{RefreshRequest, RefreshResponse};
use reqwest::{Method, header};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, error, info, warn};

/// Callback fired whenever the gateway gives up on the session
pub type SessionExpiredHook = Arc<dyn Fn() + Send + Sync>;

/// A replayable request description
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Attach a JSON body
    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self, ClientError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub const fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[derive(Debug, Clone)]
enum RefreshError {
    /// The refresh endpoint rejected us or was unreachable
    Failed(Arc<ClientError>),
    /// A logout cleared the store before the new tokens arrived
    Cleared,
}

impl From<RefreshError> for ClientError {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::Failed(source) => Self::RefreshFailed(source),
            RefreshError::Cleared => Self::SessionCleared,
        }
    }
}

type RefreshFuture = Shared<BoxFuture<'static, Result<String, RefreshError>>>;

/// Client for endpoints that require a session
#[derive(Clone)]
pub struct AuthGateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    client: ApiClient,
    store: TokenStore,
    refresh_path: String,
    in_flight: Mutex<Option<RefreshFuture>>,
    on_session_expired: RwLock<Option<SessionExpiredHook>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AuthGateway {
    /// Create a gateway refreshing through `refresh_path` on `client`
    pub fn new(client: ApiClient, store: TokenStore, refresh_path: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                client,
                store,
                refresh_path: refresh_path.into(),
                in_flight: Mutex::new(None),
                on_session_expired: RwLock::new(None),
            }),
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.inner.client
    }

    pub fn store(&self) -> &TokenStore {
        &self.inner.store
    }

    /// Register the callback fired when the session is given up
    pub fn set_session_expired_hook(&self, hook: SessionExpiredHook) {
        *self
            .inner
            .on_session_expired
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(hook);
    }

    pub fn clear_session_expired_hook(&self) {
        *self
            .inner
            .on_session_expired
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Send a request with the current access token, refreshing once on 401/403
    pub async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response, ClientError> {
        let generation = self.inner.store.generation();
        let sent_token = self.inner.store.get(TokenKind::Access);

        let original = match self.dispatch(request, sent_token.as_deref()).await {
            Ok(response) => return Ok(response),
            Err(error) if error.is_refreshable() => error,
            Err(error) => return Err(error),
        };

        debug!(
            method = %request.method,
            path = %request.path,
            status = ?original.status(),
            "Request unauthorized, renewing access token"
        );
        let token = self
            .renewed_token(generation, sent_token.as_deref(), original)
            .await?;

        // The retried request is final: a second rejection is surfaced as-is
        self.dispatch(request, Some(&token)).await
    }

    /// Send a request and decode its JSON body
    pub async fn execute<T: serde::de::DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<T, ClientError> {
        let response = self.send(request).await?;
        decode_json(response).await
    }

    /// Refresh the access token now, joining a refresh already in flight
    pub async fn refresh(&self) -> Result<String, ClientError> {
        let generation = self.inner.store.generation();
        let refresh_token = self
            .inner
            .store
            .get(TokenKind::Refresh)
            .ok_or_else(|| ClientError::AuthenticationFailed("No refresh token".to_string()))?;
        Ok(self.inner.join_refresh(generation, refresh_token).await?)
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ClientError> {
        let mut builder = self
            .inner
            .client
            .request(request.method.clone(), &request.path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        self.inner.client.send(builder).await
    }

    /// Produce an access token to retry with, given the one that was rejected
    ///
    /// `generation` is the store generation the rejected request was sent under.
    async fn renewed_token(
        &self,
        generation: u64,
        rejected: Option<&str>,
        original: ClientError,
    ) -> Result<String, ClientError> {
        // Another request may have rotated the pair since this one was sent
        if let Some(current) = self.inner.store.get(TokenKind::Access) {
            if rejected != Some(current.as_str()) {
                debug!("Access token already rotated, retrying with the current one");
                return Ok(current);
            }
        }

        let Some(refresh_token) = self.inner.store.get(TokenKind::Refresh) else {
            if !self.inner.expire_session(generation) {
                return Err(ClientError::SessionCleared);
            }
            warn!("No refresh token available, session ended");
            return Err(original);
        };

        Ok(self.inner.join_refresh(generation, refresh_token).await?)
    }
}

impl GatewayInner {
    /// Join the in-flight refresh, starting one if none is running
    fn join_refresh(self: &Arc<Self>, generation: u64, refresh_token: String) -> RefreshFuture {
        let mut slot = lock(&self.in_flight);
        if let Some(existing) = slot.as_ref() {
            debug!("Joining in-flight token refresh");
            return existing.clone();
        }

        let inner = Arc::clone(self);
        let refresh = async move {
            let outcome = inner.run_refresh(generation, refresh_token).await;
            lock(&inner.in_flight).take();
            outcome
        }
        .boxed()
        .shared();

        *slot = Some(refresh.clone());
        refresh
    }

    async fn run_refresh(
        &self,
        generation: u64,
        refresh_token: String,
    ) -> Result<String, RefreshError> {
        info!(path = %self.refresh_path, "Refreshing access token");

        let request = self
            .client
            .request(Method::POST, &self.refresh_path)
            .json(&RefreshRequest { refresh_token });

        match self.client.execute::<RefreshResponse>(request).await {
            Ok(refreshed) => {
                let stored = self.store.store_refreshed(
                    generation,
                    &refreshed.access_token,
                    refreshed.refresh_token.as_deref(),
                );
                if stored {
                    debug!(
                        rotated_refresh_token = refreshed.refresh_token.is_some(),
                        "Access token refreshed"
                    );
                    Ok(refreshed.access_token)
                } else {
                    Err(RefreshError::Cleared)
                }
            }
            Err(e) => {
                error!("Token refresh failed: {e}");
                if self.expire_session(generation) {
                    Err(RefreshError::Failed(Arc::new(e)))
                } else {
                    Err(RefreshError::Cleared)
                }
            }
        }
    }

    /// Drop every stored credential and notify the session owner, unless the
    /// session seen at `generation` was already replaced or cleared
    fn expire_session(&self, generation: u64) -> bool {
        if !self.store.clear_all_if(generation) {
            return false;
        }
        let hook = self
            .on_session_expired
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(hook) = hook {
            hook();
        }
        true
    }
}
