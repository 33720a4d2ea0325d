//! Configuration for the portcullis client stack
//!
//! Layered the usual way: built-in defaults, then an optional file (format
//! picked from its extension), then `PORTCULLIS_*` environment variables with
//! `__` between sections, e.g. `PORTCULLIS_API__BASE_URL`.

use crate::error::{CoreError, CoreResult};
use crate::store::TokenLifetimes;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "PORTCULLIS";

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortcullisConfig {
    /// Identity API location
    #[serde(default)]
    pub api: ApiConfig,

    /// Credential lifetimes and OAuth completion timing
    #[serde(default)]
    pub session: SessionConfig,

    /// Public/protected route policy
    #[serde(default)]
    pub routes: RouteConfig,
}

/// Identity API configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the identity service
    pub base_url: String,

    /// Path prefix of the login/signup/me/refresh endpoints
    pub auth_path: String,

    /// Path prefix of the OAuth integration endpoints
    pub oauth_path: String,

    /// Request timeout in seconds (0 disables it)
    pub timeout_secs: u64,
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub profile_ttl_secs: i64,

    /// How long to wait for the OAuth callback to deposit a token
    pub oauth_wait_secs: u64,

    /// Polling interval while waiting for the OAuth token
    pub oauth_poll_ms: u64,
}

/// Route guard configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Paths reachable without a session
    pub public_paths: Vec<String>,

    /// Where unauthenticated navigations are sent
    pub login_path: String,

    /// Where authenticated users landing on a public path are sent
    pub landing_path: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            auth_path: "/auth".to_string(),
            oauth_path: "/oauth2".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            access_ttl_secs: 24 * 60 * 60,
            refresh_ttl_secs: 7 * 24 * 60 * 60,
            profile_ttl_secs: 24 * 60 * 60,
            oauth_wait_secs: 10,
            oauth_poll_ms: 250,
        }
    }
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            public_paths: vec![
                "/login".to_string(),
                "/signup".to_string(),
                "/auth/callback/google".to_string(),
            ],
            login_path: "/login".to_string(),
            landing_path: "/dashboard".to_string(),
        }
    }
}

impl ApiConfig {
    /// Full path of an endpoint under the auth prefix
    pub fn auth_endpoint(&self, endpoint: &str) -> String {
        join_path(&self.auth_path, endpoint)
    }

    /// Full path of an endpoint under the OAuth prefix
    pub fn oauth_endpoint(&self, endpoint: &str) -> String {
        join_path(&self.oauth_path, endpoint)
    }

    pub const fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_secs))
        }
    }
}

impl SessionConfig {
    /// Credential lifetimes as durations
    ///
    /// # Errors
    ///
    /// Returns an error if a lifetime is not positive or out of range
    pub fn lifetimes(&self) -> CoreResult<TokenLifetimes> {
        Ok(TokenLifetimes {
            access: ttl("session.access_ttl_secs", self.access_ttl_secs)?,
            refresh: ttl("session.refresh_ttl_secs", self.refresh_ttl_secs)?,
            profile: ttl("session.profile_ttl_secs", self.profile_ttl_secs)?,
        })
    }

    pub const fn oauth_wait(&self) -> Duration {
        Duration::from_secs(self.oauth_wait_secs)
    }

    pub const fn oauth_poll_interval(&self) -> Duration {
        Duration::from_millis(self.oauth_poll_ms)
    }
}

impl PortcullisConfig {
    /// Load configuration from file, with environment overrides
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        Self::load(Some(path.as_ref()))
    }

    /// Load configuration with defaults and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables cannot be parsed
    pub fn from_env() -> CoreResult<Self> {
        Self::load(None)
    }

    /// Load defaults, then the optional file, then the environment
    ///
    /// # Errors
    ///
    /// Returns an error if any layer cannot be read or deserialized
    pub fn load(path: Option<&Path>) -> CoreResult<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("routes.public_paths")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.session.lifetimes()?;
        Ok(config)
    }

    /// Save configuration as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn save<P: AsRef<Path>>(&self, path: P) -> CoreResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

fn ttl(name: &str, secs: i64) -> CoreResult<chrono::Duration> {
    if secs <= 0 {
        return Err(CoreError::invalid_config(format!("{name} must be positive, got {secs}")));
    }
    chrono::Duration::try_seconds(secs)
        .ok_or_else(|| CoreError::invalid_config(format!("{name} is out of range: {secs}")))
}

fn join_path(prefix: &str, endpoint: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let endpoint = endpoint.trim_start_matches('/');
    if prefix.is_empty() {
        format!("/{endpoint}")
    } else if prefix.starts_with('/') {
        format!("{prefix}/{endpoint}")
    } else {
        format!("/{prefix}/{endpoint}")
    }
}
