//! CLI module — command parsing and dispatch
//!
//! All CLI logic lives here; `main.rs` calls [`run`]. With no subcommand
//! the gateway starts. Config resolves from `--config`, then the
//! `NANOGRIP_CONFIG` env var, then `~/.nanogrip/config.yaml`.

mod agent;
mod cron;
mod gateway;
mod init;
mod runtime;
mod status;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "nanogrip")]
#[command(about = "Personal AI assistant multiplexing chat channels into one agent", long_about = None)]
struct Cli {
    /// Config file path (default: ~/.nanogrip/config.yaml, or $NANOGRIP_CONFIG)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive conversational loop on stdin/stdout
    Agent {
        /// Process a single message, print the reply, and exit
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Start the multi-channel gateway (the default)
    Gateway,
    /// Show workspace, model, port, and enabled channels
    Status,
    /// Create the workspace tree and a default config
    Init,
    /// Show cron management hints
    Cron,
}

/// Entry point for the CLI — called from main().
pub async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config_path = Config::resolve_path(cli.config.as_deref());
    let config = Config::load_from_path(&config_path)?;

    match cli.command {
        Some(Commands::Agent { message }) => agent::cmd_agent(config, message).await?,
        Some(Commands::Gateway) | None => gateway::cmd_gateway(config).await?,
        Some(Commands::Status) => status::cmd_status(config).await?,
        Some(Commands::Init) => init::cmd_init(config, &config_path).await?,
        Some(Commands::Cron) => cron::cmd_cron().await?,
    }

    Ok(())
}

/// Initialize tracing from `RUST_LOG` (default `info`); JSON lines when
/// `RUST_LOG_FORMAT=json`.
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let use_json = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if use_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .compact()
            .init();
    }
}
