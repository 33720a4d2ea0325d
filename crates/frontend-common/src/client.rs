//! Client configuration and initialization

use crate::auth::SessionManager;
use portcullis_core::config::PortcullisConfig;
use portcullis_core::error::CoreResult;
use portcullis_core::store::{MemoryStorage, StorageBackend, TokenStore};
pub use portcullis_http::client::error::ClientError;
use portcullis_http::client::IdentityClient;
use std::sync::Arc;
use tracing::debug;

/// Token store over the given locations, with lifetimes from configuration
///
/// # Errors
///
/// Returns an error if a configured lifetime is not positive or out of range
pub fn create_token_store(
    config: &PortcullisConfig,
    cookies: Arc<dyn StorageBackend>,
    local: Arc<dyn StorageBackend>,
) -> CoreResult<TokenStore> {
    Ok(TokenStore::new(cookies, local, config.session.lifetimes()?))
}

/// Session manager talking to the configured identity service
pub fn create_session_manager(
    config: &PortcullisConfig,
    store: TokenStore,
) -> Result<SessionManager, ClientError> {
    debug!(base_url = %config.api.base_url, "Creating session manager");
    let identity = IdentityClient::from_config(&config.api, store)?;
    Ok(SessionManager::new(identity))
}

/// Session manager whose state lives only as long as the process
pub fn create_ephemeral_session(config: &PortcullisConfig) -> Result<SessionManager, ClientError> {
    let store = create_token_store(
        config,
        Arc::new(MemoryStorage::new()),
        Arc::new(MemoryStorage::new()),
    )
    .map_err(|e| ClientError::Configuration(e.to_string()))?;
    create_session_manager(config, store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_lifetime_is_a_configuration_error() {
        let mut config = PortcullisConfig::default();
        config.session.access_ttl_secs = i64::MAX;

        let result = create_ephemeral_session(&config);
        assert!(matches!(result, Err(ClientError::Configuration(_))));

        config.session.access_ttl_secs = 3600;
        assert!(create_ephemeral_session(&config).is_ok());
    }
}
