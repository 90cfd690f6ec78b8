// crates/chronicle-server/src/host.rs
// Host bindings: the narrow surface presentation layers call through
//
// Boolean-returning operations follow the binding contract the UI was built
// against: failures are logged and reported as `false`, never raised.

use std::sync::Arc;

use chronicle_types::{CycleResult, DecayRunMetric, ExtractedFact, Fact, Item, Link, MemoryType, ServiceMetrics};
use serde::Serialize;

use crate::db::{self, DatabasePool};
use crate::decay::DecayScheduler;
use crate::error::Result;
use crate::now_ms;

/// How many recent runs a metrics report includes.
const METRICS_REPORT_RUNS: usize = 50;

/// Decay telemetry bundle returned by [`Chronicle::get_decay_metrics`].
#[derive(Debug, Clone, Serialize)]
pub struct DecayMetricsReport {
    pub service_metrics: ServiceMetrics,
    pub recent_runs: Vec<DecayRunMetric>,
}

/// Outcome of a manually triggered decay cycle.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerDecayOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<CycleResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The host handle: a store plus its decay service, constructed once at
/// process start and shared with every collaborator.
#[derive(Clone)]
pub struct Chronicle {
    pool: Arc<DatabasePool>,
    scheduler: Arc<DecayScheduler>,
}

impl Chronicle {
    pub fn new(pool: Arc<DatabasePool>, scheduler: Arc<DecayScheduler>) -> Self {
        Self { pool, scheduler }
    }

    pub fn pool(&self) -> &Arc<DatabasePool> {
        &self.pool
    }

    pub fn scheduler(&self) -> &Arc<DecayScheduler> {
        &self.scheduler
    }

    /// All items, newest first.
    pub async fn load_database(&self) -> Result<Vec<Item>> {
        self.pool.run(db::load_items_sync).await
    }

    /// Bulk upsert of items.
    pub async fn save_database(&self, items: Vec<Item>) -> bool {
        let dim = self.pool.embedding_dim();
        let now = now_ms();
        match self
            .pool
            .run(move |conn| db::upsert_items_sync(conn, &items, dim, now))
            .await
        {
            Ok(written) => {
                tracing::debug!("Saved {} items", written);
                true
            }
            Err(e) => {
                tracing::warn!("save_database failed: {}", e);
                false
            }
        }
    }

    /// Persist extracted facts for a chat, superseding stale ones.
    pub async fn save_facts(&self, chat_id: String, facts: Vec<ExtractedFact>) -> bool {
        let now = now_ms();
        match self
            .pool
            .run(move |conn| db::save_facts_sync(conn, &chat_id, &facts, now))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("save_facts failed: {}", e);
                false
            }
        }
    }

    /// Live facts for a chat, strongest first.
    pub async fn load_facts(&self, chat_id: String) -> Result<Vec<Fact>> {
        self.pool
            .run(move |conn| db::load_facts_sync(conn, &chat_id))
            .await
    }

    /// Read-path rehearsal: salience bump + access refresh.
    pub async fn boost_salience(&self, chat_id: String) -> bool {
        let now = now_ms();
        match self
            .pool
            .run_with_retry(move |conn| db::boost_salience_sync(conn, &chat_id, now))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("boost_salience failed: {}", e);
                false
            }
        }
    }

    /// View tracking without the salience bump.
    pub async fn track_chat_view(&self, chat_id: String) -> bool {
        let now = now_ms();
        match self
            .pool
            .run_with_retry(move |conn| db::track_view_sync(conn, &chat_id, now))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("track_chat_view failed: {}", e);
                false
            }
        }
    }

    /// Reclassify an item's memory type.
    pub async fn update_memory_type(&self, chat_id: String, memory_type: MemoryType) -> bool {
        match self
            .pool
            .run(move |conn| db::update_memory_type_sync(conn, &chat_id, memory_type))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("update_memory_type failed: {}", e);
                false
            }
        }
    }

    /// Add a manual link between two items.
    pub async fn add_link(&self, from: String, to: String, link_type: Option<String>) -> bool {
        let now = now_ms();
        match self
            .pool
            .run(move |conn| db::add_link_sync(conn, &from, &to, link_type.as_deref(), now))
            .await
        {
            Ok(added) => added,
            Err(e) => {
                tracing::warn!("add_link failed: {}", e);
                false
            }
        }
    }

    /// Remove a link in either direction.
    pub async fn remove_link(&self, from: String, to: String) -> bool {
        match self
            .pool
            .run(move |conn| db::remove_link_sync(conn, &from, &to))
            .await
        {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!("remove_link failed: {}", e);
                false
            }
        }
    }

    /// All link edges, newest first.
    pub async fn load_links(&self) -> Result<Vec<Link>> {
        self.pool.run(db::load_links_sync).await
    }

    /// Service counters plus the recent persisted run metrics.
    pub async fn get_decay_metrics(&self) -> Result<DecayMetricsReport> {
        let recent_runs = self
            .pool
            .run(|conn| db::recent_runs_sync(conn, METRICS_REPORT_RUNS))
            .await?;
        Ok(DecayMetricsReport {
            service_metrics: self.scheduler.service_metrics(),
            recent_runs,
        })
    }

    /// Run one decay cycle now. Refused while a cycle is in flight.
    pub async fn trigger_decay_cycle(&self) -> TriggerDecayOutcome {
        match self.scheduler.run_cycle().await {
            Ok(result) => TriggerDecayOutcome {
                success: true,
                result: Some(result),
                error: None,
            },
            Err(e) => TriggerDecayOutcome {
                success: false,
                result: None,
                error: Some(e.to_string()),
            },
        }
    }
}
