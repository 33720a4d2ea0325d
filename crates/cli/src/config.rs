//! CLI configuration utilities

use anyhow::{Context, Result};
use portcullis_core::config::PortcullisConfig;
use portcullis_core::store::{FileStorage, TokenStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Environment variable naming the data directory
pub const STATE_DIR_ENV: &str = "PORTCULLIS_STATE_DIR";
const CONFIG_FILE_NAME: &str = "config.json";

/// Data directory: explicit flag, then `PORTCULLIS_STATE_DIR`, then the
/// platform data directory
pub fn resolve_data_dir(data_dir: Option<PathBuf>) -> PathBuf {
    data_dir.unwrap_or_else(|| {
        if let Ok(state_dir) = std::env::var(STATE_DIR_ENV) {
            PathBuf::from(state_dir)
        } else {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("portcullis")
        }
    })
}

/// Default location of the configuration file inside the data directory
pub fn default_config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE_NAME)
}

/// Load configuration from the given file, the data directory's file, or
/// defaults, with environment overrides in every case
pub fn load_config(config_file: Option<&Path>, data_dir: &Path) -> Result<PortcullisConfig> {
    let config = if let Some(path) = config_file {
        info!("Loading configuration from: {}", path.display());
        PortcullisConfig::from_file(path)?
    } else {
        let default_config = default_config_path(data_dir);
        if default_config.exists() {
            info!("Loading configuration from: {}", default_config.display());
            PortcullisConfig::from_file(&default_config)?
        } else {
            info!("Using default configuration with environment overrides");
            PortcullisConfig::from_env()?
        }
    };
    Ok(config)
}

/// Generate a default configuration file
pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
    PortcullisConfig::default().save(path)?;
    Ok(())
}

/// Token store persisted under `<data_dir>/session`
///
/// `cookies.json` stands in for the browser cookie jar and `local.json` for
/// client-only storage.
pub fn open_token_store(config: &PortcullisConfig, data_dir: &Path) -> Result<TokenStore> {
    let session_dir = data_dir.join("session");
    let cookies = FileStorage::open(session_dir.join("cookies.json"))
        .context("Failed to open the cookie jar")?;
    let local = FileStorage::open(session_dir.join("local.json"))
        .context("Failed to open local storage")?;

    let store =
        portcullis_frontend_common::create_token_store(config, Arc::new(cookies), Arc::new(local))?;
    Ok(store)
}
