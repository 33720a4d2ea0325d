//! Session state and the manager that drives it

use super::error_messages::user_friendly_message;
use chrono::Utc;
use portcullis_core::claims::Claims;
use portcullis_core::guard::TokenStatus;
use portcullis_core::store::{TokenKind, TokenStore};
use portcullis_core::types::{AuthResponse, Profile};
use portcullis_http::client::{IdentityClient, SignupOutcome, error::ClientError};
use serde::Serialize;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Observable session state
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    pub user: Option<Profile>,
    pub is_authenticated: bool,
    pub loading: bool,
    /// Message for the last failed login or signup
    pub error: Option<String>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            user: None,
            is_authenticated: false,
            loading: true, // Nothing has been read from the store yet
            error: None,
        }
    }
}

/// Session state transitions
#[derive(Debug, Clone)]
pub enum AuthAction {
    SetLoading(bool),
    /// Tokens are in place; the profile (if already known) replaces any
    /// previous one and may follow later
    Authenticated(Option<Profile>),
    UserLoaded(Profile),
    Logout,
    Failed(String),
}

impl AuthState {
    pub fn reduce(self, action: AuthAction) -> Self {
        match action {
            AuthAction::SetLoading(loading) => Self { loading, ..self },
            AuthAction::Authenticated(user) => Self {
                user,
                is_authenticated: true,
                error: None,
                ..self
            },
            AuthAction::UserLoaded(user) => Self {
                user: Some(user),
                is_authenticated: true,
                ..self
            },
            AuthAction::Logout => Self {
                user: None,
                is_authenticated: false,
                loading: false,
                error: None,
            },
            // A failed attempt leaves any existing session as it was
            AuthAction::Failed(message) => Self {
                loading: false,
                error: Some(message),
                ..self
            },
        }
    }
}

/// What a signup left the session in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignupStatus {
    /// The service issued a session and the manager is authenticated
    Authenticated,
    /// The account exists but the user has to log in
    LoginRequired,
}

/// Owner of the client-side session
///
/// Cloning is cheap; clones share state. Each instance registers itself as
/// the session-expired hook of its own gateway, so a refresh failure anywhere
/// ends up as a logout here.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    identity: IdentityClient,
    state: watch::Sender<AuthState>,
}

impl SessionInner {
    fn dispatch(&self, action: AuthAction) {
        self.state.send_modify(|state| {
            let current = std::mem::take(state);
            *state = current.reduce(action);
        });
    }
}

impl SessionManager {
    pub fn new(identity: IdentityClient) -> Self {
        let (state, _) = watch::channel(AuthState::default());
        let inner = Arc::new(SessionInner { identity, state });

        let weak: Weak<SessionInner> = Arc::downgrade(&inner);
        inner
            .identity
            .gateway()
            .set_session_expired_hook(Arc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    info!("Session expired, logging out");
                    inner.dispatch(AuthAction::Logout);
                }
            }));

        Self { inner }
    }

    pub fn identity(&self) -> &IdentityClient {
        &self.inner.identity
    }

    pub fn store(&self) -> &TokenStore {
        self.inner.identity.store()
    }

    pub fn state(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    /// Watch state changes
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    pub fn user(&self) -> Option<Profile> {
        self.inner.state.borrow().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().loading
    }

    pub(crate) fn dispatch(&self, action: AuthAction) {
        self.inner.dispatch(action);
    }

    /// Restore the session from the store and confirm it with the service
    pub async fn initialize(&self) {
        let store = self.store();
        if store.get(TokenKind::Access).is_none() {
            debug!("No stored access token");
            self.dispatch(AuthAction::Logout);
            return;
        }

        // Paint with the cached profile until the real one arrives
        let generation = store.generation();
        self.dispatch(AuthAction::Authenticated(store.profile_snapshot()));

        if let Err(e) = self.fetch_user_data().await {
            if store.clear_all_if(generation) {
                warn!("Stored session could not be confirmed: {e}");
                self.dispatch(AuthAction::Logout);
            } else {
                debug!("Session changed while it was being restored: {e}");
            }
        }
        self.dispatch(AuthAction::SetLoading(false));
    }

    /// Log in with email and password, then load the profile
    ///
    /// A failure is recorded in the state but leaves an existing session alone.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), ClientError> {
        match self.inner.identity.login(email, password).await {
            Ok(response) => self.start_session(response).await,
            Err(e) => {
                warn!("Login failed: {e}");
                self.dispatch(AuthAction::Failed(user_friendly_message(&e)));
                Err(e)
            }
        }
    }

    /// Register an account, logging in when the service hands out a session
    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<SignupStatus, ClientError> {
        match self.inner.identity.signup(name, email, password).await {
            Ok(SignupOutcome::Session(response)) => {
                self.start_session(response).await?;
                Ok(SignupStatus::Authenticated)
            }
            Ok(SignupOutcome::LoginRequired) => {
                self.dispatch(AuthAction::SetLoading(false));
                Ok(SignupStatus::LoginRequired)
            }
            Err(e) => {
                warn!("Signup failed: {e}");
                self.dispatch(AuthAction::Failed(user_friendly_message(&e)));
                Err(e)
            }
        }
    }

    /// Log in with an ID token from Google's own sign-in, then load the profile
    pub async fn google_login(&self, id_token: &str) -> Result<(), ClientError> {
        match self.inner.identity.google_login(id_token).await {
            Ok(response) => self.start_session(response).await,
            Err(e) => {
                warn!("Google login failed: {e}");
                self.dispatch(AuthAction::Failed(user_friendly_message(&e)));
                Err(e)
            }
        }
    }

    async fn start_session(&self, response: AuthResponse) -> Result<(), ClientError> {
        let store = self.store();
        store.store_pair(&response.token_pair());
        if let Some(user) = &response.user {
            store.set_profile_snapshot(user);
        }
        self.dispatch(AuthAction::Authenticated(response.user));
        info!("Session started");

        let outcome = match self.fetch_user_data().await {
            Ok(_) => Ok(()),
            Err(e) if e.is_auth_failure() => Err(e),
            // The tokens are good; the profile can be fetched again later
            Err(e) => {
                warn!("Profile could not be loaded after login: {e}");
                Ok(())
            }
        };
        self.dispatch(AuthAction::SetLoading(false));
        outcome
    }

    /// End the session locally; navigation is up to the caller
    pub fn logout(&self) {
        self.store().clear_all();
        self.dispatch(AuthAction::Logout);
        info!("Logged out");
    }

    /// Load the profile from the service
    ///
    /// Authorization failures log the session out before the error is
    /// returned, unless a newer session has replaced the one the request was
    /// made for. A profile that arrives after a logout or a new login is
    /// discarded.
    pub async fn fetch_user_data(&self) -> Result<Profile, ClientError> {
        let store = self.store();
        let generation = store.generation();

        match self.inner.identity.current_user().await {
            Ok(profile) => {
                if !store.set_profile_snapshot_if(generation, &profile) {
                    debug!("Discarding profile fetched before a logout");
                    return Err(ClientError::SessionCleared);
                }
                self.dispatch(AuthAction::UserLoaded(profile.clone()));

                // A logout or a new login may have slipped in between the
                // write and the dispatch
                if store.generation() != generation {
                    self.dispatch(self.action_from_store());
                    return Err(ClientError::SessionCleared);
                }
                Ok(profile)
            }
            Err(e) if e.is_auth_failure() => {
                if store.clear_all_if(generation) {
                    warn!("Profile request unauthorized: {e}");
                    self.dispatch(AuthAction::Logout);
                } else {
                    debug!("Ignoring profile failure of a replaced session: {e}");
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// State matching whatever session the store holds now
    fn action_from_store(&self) -> AuthAction {
        let store = self.store();
        if store.get(TokenKind::Access).is_some() {
            AuthAction::Authenticated(store.profile_snapshot())
        } else {
            AuthAction::Logout
        }
    }

    /// URL of the Google consent screen; the caller navigates to it
    pub async fn get_google_auth_url(&self) -> Result<String, ClientError> {
        self.inner.identity.google_auth_url().await
    }

    /// Role check against the loaded profile, or the token's claims before
    /// the profile is known
    pub fn has_role(&self, role: &str) -> bool {
        if let Some(user) = &self.inner.state.borrow().user {
            return user.has_role(role);
        }
        self.store()
            .get(TokenKind::Access)
            .and_then(|token| Claims::decode(&token).ok())
            .is_some_and(|claims| claims.has_role(role))
    }

    /// Whether the stored access token decodes and has not expired
    pub fn has_valid_token(&self) -> bool {
        TokenStatus::assess(self.store().get(TokenKind::Access).as_deref(), Utc::now()).is_valid()
    }
}
