//! Completion of the Google sign-in redirect
//!
//! The provider callback deposits the access token into the store out of band
//! (a cookie set by the identity service, or a token handed over in the
//! redirect). The session only becomes usable once that token exists, so the
//! callback waits for it, bounded, before loading the profile.

use super::context::{AuthAction, SessionManager};
use portcullis_core::store::TokenKind;
use portcullis_core::types::{Profile, TokenPair};
use portcullis_http::client::error::ClientError;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("Authentication failed: No token received")]
    TokenNotReceived { waited: Duration },

    #[error("Authentication failed: User data not found")]
    Profile(#[source] ClientError),
}

/// Store tokens handed over by the redirect itself
pub fn deposit_tokens(session: &SessionManager, access_token: &str, refresh_token: Option<&str>) {
    let store = session.store();
    match refresh_token {
        Some(refresh_token) => store.store_pair(&TokenPair {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
        }),
        None => store.set(TokenKind::Access, access_token, None),
    }
    debug!(with_refresh = refresh_token.is_some(), "OAuth tokens deposited");
}

/// Wait for the access token to appear, then hydrate the profile
pub async fn complete_oauth_login(
    session: &SessionManager,
    wait: Duration,
    poll_interval: Duration,
) -> Result<Profile, CallbackError> {
    let store = session.store().clone();
    let poll_interval = poll_interval.max(Duration::from_millis(1));

    let arrived = tokio::time::timeout(wait, async {
        while store.get(TokenKind::Access).is_none() {
            tokio::time::sleep(poll_interval).await;
        }
    })
    .await;

    if arrived.is_err() {
        warn!(waited_ms = wait.as_millis(), "No token arrived from the OAuth callback");
        session.logout();
        return Err(CallbackError::TokenNotReceived { waited: wait });
    }

    session.dispatch(AuthAction::Authenticated(store.profile_snapshot()));
    let profile = session
        .fetch_user_data()
        .await
        .map_err(CallbackError::Profile)?;

    info!("OAuth sign-in completed");
    Ok(profile)
}
