// crates/chronicle-server/src/mcp/mod.rs
// MCP Server implementation

mod handler;
mod requests;
mod resources;
mod router;
mod tools;

pub use requests::*;

use std::sync::Arc;

use crate::db::pool::DatabasePool;
use crate::decay::DecayScheduler;
use rmcp::handler::server::router::tool::ToolRouter;

/// MCP Server state
#[derive(Clone)]
pub struct ChronicleServer {
    pub pool: Arc<DatabasePool>,
    /// Decay service handle; read-path tools report accesses through it.
    pub scheduler: Arc<DecayScheduler>,
    tool_router: ToolRouter<Self>,
}

impl ChronicleServer {
    pub fn new(pool: Arc<DatabasePool>, scheduler: Arc<DecayScheduler>) -> Self {
        Self {
            pool,
            scheduler,
            tool_router: Self::tool_router(),
        }
    }

    /// Embedding dimension of the underlying deployment.
    pub fn embedding_dim(&self) -> usize {
        self.pool.embedding_dim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::TEST_DIM;
    use crate::decay::{DecayConfig, EnvironmentalContext};

    /// Server over a fresh in-memory database, for tool/resource tests.
    pub(super) async fn test_server() -> ChronicleServer {
        let pool = Arc::new(
            DatabasePool::open_in_memory(TEST_DIM)
                .await
                .expect("in-memory pool"),
        );
        let scheduler = DecayScheduler::new(
            pool.clone(),
            DecayConfig {
                context_override: Some(EnvironmentalContext::LowActivity),
                ..Default::default()
            },
        );
        ChronicleServer::new(pool, scheduler)
    }
}
