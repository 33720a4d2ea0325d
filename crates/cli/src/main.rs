//! Portcullis CLI - session client for a token-based identity service

mod commands;
mod config;
mod logging;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use commands::Commands;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{Level, error, info};

#[derive(Parser)]
#[command(name = "portcullis")]
#[command(about = "Log in to an identity service and inspect the stored session")]
#[command(version)]
struct Cli {
    /// Set logging level
    #[arg(short = 'l', long, global = true, default_value = "warn")]
    log_level: LogLevel,

    /// Data directory for the session files, configuration and logs
    #[arg(short = 'd', long, global = true)]
    data_dir: Option<PathBuf>,

    /// Configuration file (defaults to <data dir>/config.json when present)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Timeout for operations in seconds (0 = no timeout)
    #[arg(short = 't', long, global = true, default_value = "30")]
    timeout: u64,

    /// Disable file logging (only log to stderr)
    #[arg(long, global = true)]
    no_file_log: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = config::resolve_data_dir(cli.data_dir);

    logging::init_logging(cli.log_level.into(), &data_dir, cli.no_file_log)?;

    info!("Starting portcullis CLI");

    let command = cli.command.execute(data_dir, cli.config);

    // Execute command with optional timeout
    let outcome = if cli.timeout == 0 {
        command.await
    } else {
        let timeout_duration = Duration::from_secs(cli.timeout);
        match tokio::time::timeout(timeout_duration, command).await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!("Command timed out after {} seconds", cli.timeout);
                std::process::exit(1);
            }
        }
    };

    match outcome {
        Ok(()) => {
            info!("Command completed successfully");
        }
        Err(e) => {
            error!("Command failed: {e:#}");
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }

    Ok(())
}

#[derive(Clone, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Error => Self::ERROR,
            LogLevel::Warn => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Trace => Self::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_login_with_global_flags() {
        let cli = Cli::try_parse_from([
            "portcullis",
            "login",
            "a@b.com",
            "--password",
            "pw",
            "--data-dir",
            "/tmp/portcullis",
            "--timeout",
            "0",
        ])
        .unwrap();

        assert_eq!(cli.timeout, 0);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/portcullis")));
        assert!(matches!(
            cli.command,
            Commands::Login { ref email, ref password } if email == "a@b.com" && password == "pw"
        ));
    }

    #[test]
    fn test_refresh_token_requires_token() {
        let result = Cli::try_parse_from(["portcullis", "oauth-complete", "--refresh-token", "R"]);
        assert!(result.is_err());

        let cli = Cli::try_parse_from([
            "portcullis",
            "oauth-complete",
            "--token",
            "A",
            "--refresh-token",
            "R",
            "--wait",
            "3",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::OauthComplete { wait: Some(3), .. }
        ));
    }

    #[test]
    fn test_parse_google_login() {
        let cli =
            Cli::try_parse_from(["portcullis", "google-login", "--id-token", "eyJ.id.token"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Commands::GoogleLogin { ref id_token } if id_token == "eyJ.id.token"
        ));
    }

    #[test]
    fn test_parse_guard_and_config() {
        let cli = Cli::try_parse_from(["portcullis", "guard", "/dashboard"]).unwrap();
        assert!(matches!(cli.command, Commands::Guard { ref path, token: None } if path == "/dashboard"));

        let cli = Cli::try_parse_from(["portcullis", "config", "generate"]).unwrap();
        assert!(matches!(cli.command, Commands::Config { .. }));
    }
}
