// cli/mod.rs
// Command-line interface definitions

mod serve;

pub use serve::{run_decay_cycle, run_decay_metrics, run_mcp_server, run_migrate};

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "chronicle",
    version,
    about = "Chronicle - memory persistence and consolidation engine"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the MCP server with the decay scheduler (default)
    Serve,
    /// Run schema migrations and exit
    Migrate,
    /// Decay service operations
    Decay {
        #[command(subcommand)]
        action: DecayAction,
    },
}

#[derive(Subcommand)]
pub enum DecayAction {
    /// Run a single decay cycle and print the result as JSON
    Run,
    /// Print service metrics and recent runs as JSON
    Metrics,
}
