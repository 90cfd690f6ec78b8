// cli/serve.rs
// Server initialization and command entry points

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use chronicle::config::EnvConfig;
use chronicle::db::pool::DatabasePool;
use chronicle::decay::{DecayConfig, DecayScheduler};
use chronicle::host::Chronicle;
use chronicle::mcp::ChronicleServer;

/// Shared server components produced by `init_context`.
struct ServerContext {
    host: Chronicle,
    pool: Arc<DatabasePool>,
    scheduler: Arc<DecayScheduler>,
}

/// Open the database (with the startup retry policy), build the decay
/// scheduler, and assemble the host handle. Shared by every command.
async fn init_context(config: &EnvConfig) -> Result<ServerContext> {
    let validation = config.validate();
    for warning in &validation.warnings {
        warn!("{}", warning);
    }

    let pool = Arc::new(
        DatabasePool::open_with_retry(&config.database_path, config.embedding_dim).await?,
    );

    let scheduler = DecayScheduler::new(
        pool.clone(),
        DecayConfig {
            interval_ms: config.decay_interval_ms,
            ..Default::default()
        },
    );

    Ok(ServerContext {
        host: Chronicle::new(pool.clone(), scheduler.clone()),
        pool,
        scheduler,
    })
}

/// Run the MCP server with stdio transport. Diagnostics stay on stderr;
/// stdout carries only protocol frames.
pub async fn run_mcp_server(config: EnvConfig) -> Result<()> {
    let ctx = init_context(&config).await?;

    ctx.scheduler.start().await;
    info!("Decay scheduler started");

    let server = ChronicleServer::new(ctx.pool.clone(), ctx.scheduler.clone());
    let transport = rmcp::transport::io::stdio();
    let service = rmcp::serve_server(server, transport).await?;
    // Serves until stdin closes
    service.waiting().await?;

    ctx.scheduler.stop().await;
    Ok(())
}

/// Run migrations and exit. Opening the pool migrates; this just reports.
pub async fn run_migrate(config: EnvConfig) -> Result<()> {
    let ctx = init_context(&config).await?;
    println!(
        "Migrations complete: {}",
        ctx.pool
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "in-memory".into())
    );
    Ok(())
}

/// Run one decay cycle and print the outcome as JSON.
pub async fn run_decay_cycle(config: EnvConfig) -> Result<()> {
    let ctx = init_context(&config).await?;
    let outcome = ctx.host.trigger_decay_cycle().await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

/// Print decay service metrics and recent runs as JSON.
pub async fn run_decay_metrics(config: EnvConfig) -> Result<()> {
    let ctx = init_context(&config).await?;
    let report = ctx.host.get_decay_metrics().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
