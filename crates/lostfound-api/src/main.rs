//! lostfound-api binary

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lostfound_api::{ApiServer, AppState};
use lostfound_core::{config::LogConfig, Identity, JwtIdentityProvider, LostFoundConfig};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "lostfound-api", version, about = "Lost & Found similarity search server")]
struct Cli {
    /// Configuration file (defaults to ./lostfound.toml when present)
    #[arg(short, long, env = "LOSTFOUND_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Override the configured bind address
        #[arg(long)]
        bind: Option<String>,
    },
    /// Mint a bearer token signed with the configured secret
    IssueToken {
        /// Subject (user id)
        subject: String,
        /// Contact e-mail shown on submitted items
        email: String,
        /// Grant the moderator role
        #[arg(long)]
        moderator: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = LostFoundConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            init_logging(&config.log);
            info!("Starting lostfound-api {}", env!("CARGO_PKG_VERSION"));

            let state = AppState::from_config(config)
                .await
                .context("initializing services")?;
            ApiServer::new(state).run().await.context("serving HTTP")?;
        }
        Command::IssueToken {
            subject,
            email,
            moderator,
        } => {
            let identity = if moderator {
                Identity::moderator(subject, email)
            } else {
                Identity::member(subject, email)
            };
            let token = JwtIdentityProvider::new(&config.auth).issue(&identity)?;
            println!("{token}");
        }
    }

    Ok(())
}

fn init_logging(config: &LogConfig) {
    use tracing_subscriber::fmt;

    let level = match config.level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    fmt()
        .with_max_level(level)
        .with_target(config.verbose)
        .with_thread_ids(config.verbose)
        .with_file(config.verbose)
        .with_line_number(config.verbose)
        .with_writer(std::io::stderr)
        .init();
}
