// crates/chronicle-server/src/main.rs
// Chronicle - memory persistence and consolidation engine

mod cli;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::FmtSubscriber;

use chronicle::config::EnvConfig;
use cli::{Cli, Commands, DecayAction};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env from ~/.chronicle/.env only (never from CWD)
    if let Some(home) = dirs::home_dir()
        && let Err(e) = dotenvy::from_path(home.join(".chronicle/.env"))
    {
        tracing::debug!("Failed to load global .env file: {}", e);
    }

    let cli = Cli::parse();
    let config = EnvConfig::load();

    // All diagnostics go to stderr; stdout belongs to the MCP transport
    if let Some(level) = config.tracing_level() {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    match cli.command {
        None | Some(Commands::Serve) => {
            cli::run_mcp_server(config).await?;
        }
        Some(Commands::Migrate) => {
            cli::run_migrate(config).await?;
        }
        Some(Commands::Decay { action }) => match action {
            DecayAction::Run => cli::run_decay_cycle(config).await?,
            DecayAction::Metrics => cli::run_decay_metrics(config).await?,
        },
    }

    Ok(())
}
