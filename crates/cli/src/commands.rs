//! CLI commands

use anyhow::{Result, anyhow};
use clap::Subcommand;
use portcullis_core::claims::Claims;
use portcullis_core::config::PortcullisConfig;
use portcullis_core::guard::{GuardDecision, RouteGuard};
use portcullis_core::store::TokenKind;
use portcullis_frontend_common::auth::{
    SessionManager, SignupStatus, complete_oauth_login, deposit_tokens, user_friendly_message,
};
use portcullis_http::client::error::ClientError;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::config;

#[derive(Subcommand)]
pub enum Commands {
    /// Log in with email and password
    Login {
        email: String,

        #[arg(long, env = "PORTCULLIS_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Log in with an ID token from Google's own sign-in
    GoogleLogin {
        #[arg(long, env = "PORTCULLIS_GOOGLE_ID_TOKEN", hide_env_values = true)]
        id_token: String,
    },

    /// Create an account
    Signup {
        #[arg(long)]
        name: String,

        email: String,

        #[arg(long, env = "PORTCULLIS_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Forget the stored session
    Logout,

    /// Show the profile of the logged-in user
    Whoami,

    /// Show the stored session without contacting the service
    Status,

    /// Print the Google sign-in URL
    GoogleUrl,

    /// Finish a Google sign-in
    OauthComplete {
        /// Access token handed over by the redirect
        #[arg(long)]
        token: Option<String>,

        /// Refresh token handed over by the redirect
        #[arg(long, requires = "token")]
        refresh_token: Option<String>,

        /// Seconds to wait for the token (defaults to the configured wait)
        #[arg(long)]
        wait: Option<u64>,
    },

    /// Evaluate the route guard for a path
    Guard {
        path: String,

        /// Token to check instead of the stored one
        #[arg(long)]
        token: Option<String>,
    },

    /// Configuration file operations
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Generate a configuration file with defaults
    Generate {
        /// Output file path (defaults to <data dir>/config.json)
        output: Option<PathBuf>,
    },
}

impl Commands {
    pub async fn execute(self, data_dir: PathBuf, config_file: Option<PathBuf>) -> Result<()> {
        let config_file = config_file.as_deref();

        match self {
            Self::Login { email, password } => {
                let (_, session) = open_session(&data_dir, config_file)?;
                login(&session, &email, &password).await
            }
            Self::GoogleLogin { id_token } => {
                let (_, session) = open_session(&data_dir, config_file)?;
                session.google_login(&id_token).await.map_err(friendly)?;
                let name = session.user().map_or_else(
                    || "Google account".to_string(),
                    |user| display_name(&user.name, &user.email).to_string(),
                );
                println!("Logged in as {name}");
                Ok(())
            }
            Self::Signup {
                name,
                email,
                password,
            } => {
                let (_, session) = open_session(&data_dir, config_file)?;
                signup(&session, &name, &email, &password).await
            }
            Self::Logout => {
                let (_, session) = open_session(&data_dir, config_file)?;
                session.logout();
                println!("Logged out");
                Ok(())
            }
            Self::Whoami => {
                let (_, session) = open_session(&data_dir, config_file)?;
                whoami(&session).await
            }
            Self::Status => {
                let (_, session) = open_session(&data_dir, config_file)?;
                status(&session)
            }
            Self::GoogleUrl => {
                let (_, session) = open_session(&data_dir, config_file)?;
                let url = session.get_google_auth_url().await.map_err(friendly)?;
                println!("{url}");
                Ok(())
            }
            Self::OauthComplete {
                token,
                refresh_token,
                wait,
            } => {
                let (config, session) = open_session(&data_dir, config_file)?;
                if let Some(token) = token {
                    deposit_tokens(&session, &token, refresh_token.as_deref());
                }
                let wait = wait.map_or_else(|| config.session.oauth_wait(), Duration::from_secs);
                let profile =
                    complete_oauth_login(&session, wait, config.session.oauth_poll_interval())
                        .await?;
                println!("Signed in as {}", display_name(&profile.name, &profile.email));
                Ok(())
            }
            Self::Guard { path, token } => {
                let config = config::load_config(config_file, &data_dir)?;
                evaluate_guard(&config, &data_dir, &path, token)
            }
            Self::Config { command } => command.execute(&data_dir),
        }
    }
}

/// Configuration plus a session over the persisted token store
fn open_session(
    data_dir: &Path,
    config_file: Option<&Path>,
) -> Result<(PortcullisConfig, SessionManager)> {
    let config = config::load_config(config_file, data_dir)?;
    let store = config::open_token_store(&config, data_dir)?;
    let session = portcullis_frontend_common::create_session_manager(&config, store)?;
    Ok((config, session))
}

impl ConfigCommands {
    pub fn execute(self, data_dir: &Path) -> Result<()> {
        match self {
            Self::Generate { output } => {
                let config_path = output.unwrap_or_else(|| config::default_config_path(data_dir));
                config::generate_default_config(&config_path)?;
                println!("Generated configuration at: {}", config_path.display());
                Ok(())
            }
        }
    }
}

fn friendly(error: ClientError) -> anyhow::Error {
    anyhow!(user_friendly_message(&error))
}

fn display_name<'a>(name: &'a str, email: &'a str) -> &'a str {
    if name.is_empty() { email } else { name }
}

async fn login(session: &SessionManager, email: &str, password: &str) -> Result<()> {
    session.login(email, password).await.map_err(friendly)?;
    let name = session
        .user()
        .map_or_else(|| email.to_string(), |user| display_name(&user.name, email).to_string());
    println!("Logged in as {name}");
    Ok(())
}

async fn signup(session: &SessionManager, name: &str, email: &str, password: &str) -> Result<()> {
    match session.signup(name, email, password).await.map_err(friendly)? {
        SignupStatus::Authenticated => println!("Account created, logged in as {email}"),
        SignupStatus::LoginRequired => {
            println!("Account created. Log in with `portcullis login {email}`");
        }
    }
    Ok(())
}

async fn whoami(session: &SessionManager) -> Result<()> {
    session.initialize().await;
    let user = session
        .user()
        .filter(|_| session.is_authenticated())
        .ok_or_else(|| anyhow!("Not logged in"))?;
    println!("{}", serde_json::to_string_pretty(&user)?);
    Ok(())
}

fn status(session: &SessionManager) -> Result<()> {
    let store = session.store();
    let access = store.get(TokenKind::Access);
    let claims = access.as_deref().and_then(|token| Claims::decode(token).ok());

    let report = json!({
        "hasAccessToken": access.is_some(),
        "hasRefreshToken": store.get(TokenKind::Refresh).is_some(),
        "validToken": session.has_valid_token(),
        "expiresAt": claims.as_ref().and_then(Claims::expires_at).map(|at| at.to_rfc3339()),
        "roles": claims.map(|claims| claims.roles).unwrap_or_default(),
        "user": store.profile_snapshot(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn evaluate_guard(
    config: &PortcullisConfig,
    data_dir: &Path,
    path: &str,
    token: Option<String>,
) -> Result<()> {
    let token = match token {
        Some(token) => Some(token),
        None => config::open_token_store(config, data_dir)?.get(TokenKind::Access),
    };

    let guard = RouteGuard::new(&config.routes);
    match guard.evaluate(path, token.as_deref()) {
        GuardDecision::Allow => println!("allow {path}"),
        GuardDecision::Redirect(target) => {
            info!(path, target = %target, "Navigation redirected");
            println!("redirect {path} -> {target}");
        }
    }
    Ok(())
}
