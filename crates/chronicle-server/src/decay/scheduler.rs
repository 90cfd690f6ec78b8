// decay/scheduler.rs
// Periodic decay worker: cursor-paginated batch scans over chats and facts

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chronicle_types::{CycleResult, DecayHistoryEntry, DecayMetadata, DecayRunMetric, MemoryType, ServiceMetrics};
use rusqlite::{Connection, params};
use tokio::sync::watch;

use super::context::EnvironmentalContext;
use super::engine::{DecayInput, compute_decay};
use crate::db::{DatabasePool, prune_metrics_sync, record_access_sync};
use crate::error::{ChronicleError, Result};
use crate::now_ms;

/// Decay-history entries kept per row.
const HISTORY_LIMIT: usize = 10;
/// Entropy samples kept in the in-memory ring buffer.
const ENTROPY_SAMPLES_LIMIT: usize = 100;

/// Scheduler tuning knobs.
#[derive(Debug, Clone)]
pub struct DecayConfig {
    /// Cycle period, and also the minimum age before a row is reprocessed.
    pub interval_ms: i64,
    /// Rows fetched per batch.
    pub batch_size: usize,
    /// Pause between full batches so the read path gets a turn.
    pub batch_pause: Duration,
    /// Fixed context instead of the wall clock (manual cycles and tests).
    pub context_override: Option<EnvironmentalContext>,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            interval_ms: 900_000,
            batch_size: 100,
            batch_pause: Duration::from_millis(100),
            context_override: None,
        }
    }
}

/// Internal mutable service state.
#[derive(Default)]
struct SchedulerStats {
    cycles_run: u64,
    total_processed: u64,
    total_decayed: u64,
    last_run_timestamp: Option<i64>,
    last_run_duration_ms: Option<u64>,
    entropy_samples: VecDeque<f64>,
}

/// Long-lived periodic decay worker.
///
/// One cycle runs at a time: the `is_running` latch refuses overlapping
/// invocations. Within a cycle, chats are scanned before facts, batches run
/// sequentially, and each batch yields briefly before the next.
pub struct DecayScheduler {
    pool: Arc<DatabasePool>,
    config: DecayConfig,
    is_running: AtomicBool,
    stats: std::sync::Mutex<SchedulerStats>,
    shutdown_tx: tokio::sync::Mutex<Option<watch::Sender<bool>>>,
    task: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// Clears the cycle latch when the cycle ends, on every exit path.
struct LatchGuard<'a>(&'a AtomicBool);

impl Drop for LatchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl DecayScheduler {
    pub fn new(pool: Arc<DatabasePool>, config: DecayConfig) -> Arc<Self> {
        Arc::new(Self {
            pool,
            config,
            is_running: AtomicBool::new(false),
            stats: std::sync::Mutex::new(SchedulerStats::default()),
            shutdown_tx: tokio::sync::Mutex::new(None),
            task: tokio::sync::Mutex::new(None),
        })
    }

    /// Launch the cycle runner: fires immediately, then every `interval_ms`.
    /// A second start while the runner is alive is logged and ignored.
    pub async fn start(self: &Arc<Self>) {
        let mut task_guard = self.task.lock().await;
        if task_guard.as_ref().is_some_and(|t| !t.is_finished()) {
            tracing::warn!("Decay scheduler already started, ignoring");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        *self.shutdown_tx.lock().await = Some(shutdown_tx);

        let scheduler = self.clone();
        let interval = Duration::from_millis(self.config.interval_ms.max(0) as u64);
        *task_guard = Some(tokio::spawn(async move {
            tracing::info!("Decay scheduler started (interval {:?})", interval);
            loop {
                match scheduler.run_cycle().await {
                    Ok(result) => {
                        tracing::info!(
                            "Decay cycle: {} processed, {} decayed, entropy {:.3}, {} ms",
                            result.processed,
                            result.decayed,
                            result.entropy,
                            result.duration_ms
                        );
                    }
                    Err(ChronicleError::Conflict(_)) => {
                        // Latched by a manual cycle; skip this tick
                    }
                    Err(e) => {
                        tracing::warn!("Decay cycle failed: {}", e);
                    }
                }

                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("Decay scheduler shutting down");
                            break;
                        }
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        }));
    }

    /// Cancel the ticker and wait for any in-flight cycle to settle.
    pub async fn stop(&self) {
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                tracing::warn!("Decay scheduler task ended abnormally: {}", e);
            }
        }
    }

    /// Read-path access hook: refresh `last_accessed_at`, count the recall.
    pub async fn on_access(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        let now = now_ms();
        self.pool
            .run(move |conn| record_access_sync(conn, &id, now))
            .await?;
        Ok(())
    }

    /// Snapshot of the in-memory service counters.
    pub fn service_metrics(&self) -> ServiceMetrics {
        let stats = match self.stats.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        ServiceMetrics {
            cycles_run: stats.cycles_run,
            total_processed: stats.total_processed,
            total_decayed: stats.total_decayed,
            last_run_timestamp: stats.last_run_timestamp,
            last_run_duration_ms: stats.last_run_duration_ms,
            entropy_samples: stats.entropy_samples.iter().copied().collect(),
        }
    }

    /// Run one decay cycle. Refused with `Conflict` while another cycle is
    /// in flight.
    pub async fn run_cycle(&self) -> Result<CycleResult> {
        if self
            .is_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("Decay cycle already running, refusing overlap");
            return Err(ChronicleError::Conflict(
                "decay cycle already in progress".into(),
            ));
        }
        let _latch = LatchGuard(&self.is_running);

        let start = std::time::Instant::now();
        let now = now_ms();
        let context = self
            .config
            .context_override
            .unwrap_or_else(EnvironmentalContext::current);

        let mut processed = 0u64;
        let mut decayed = 0u64;
        let mut decay_sum = 0.0f64;
        let mut batches = 0u64;
        let mut errors: Vec<String> = Vec::new();

        for table in [DecayTable::Chats, DecayTable::Facts] {
            let outcome = self.process_table(table, now, context, &mut errors).await;
            processed += outcome.processed;
            decayed += outcome.decayed;
            decay_sum += outcome.decay_sum;
            batches += outcome.batches;
        }

        let entropy = match self
            .pool
            .interact(|conn| live_salience_values(conn).map_err(Into::into))
            .await
        {
            Ok(values) => crate::similarity::entropy(&values),
            Err(e) => {
                errors.push(format!("entropy: {e}"));
                0.0
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let metric = DecayRunMetric {
            run_timestamp: now,
            items_processed: processed as i64,
            items_decayed: decayed as i64,
            error_count: errors.len() as i64,
            average_decay_amount: if decayed > 0 {
                decay_sum / decayed as f64
            } else {
                0.0
            },
            memory_entropy: entropy,
            environmental_context: context.as_str().to_string(),
            processing_duration_ms: duration_ms as i64,
        };

        if let Err(e) = self
            .pool
            .interact(move |conn| {
                crate::db::insert_decay_metric_sync(conn, &metric)?;
                prune_metrics_sync(conn, now)?;
                Ok(())
            })
            .await
        {
            errors.push(format!("metric: {e}"));
        }

        {
            let mut stats = match self.stats.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            stats.cycles_run += 1;
            stats.total_processed += processed;
            stats.total_decayed += decayed;
            stats.last_run_timestamp = Some(now);
            stats.last_run_duration_ms = Some(duration_ms);
            stats.entropy_samples.push_back(entropy);
            while stats.entropy_samples.len() > ENTROPY_SAMPLES_LIMIT {
                stats.entropy_samples.pop_front();
            }
        }

        Ok(CycleResult {
            processed,
            decayed,
            entropy,
            duration_ms,
            batches,
            errors,
        })
    }

    /// Scan one table to exhaustion via cursor pagination.
    async fn process_table(
        &self,
        table: DecayTable,
        now: i64,
        context: EnvironmentalContext,
        errors: &mut Vec<String>,
    ) -> TableOutcome {
        let mut outcome = TableOutcome::default();
        let mut cursor: Option<String> = None;

        loop {
            let batch_size = self.config.batch_size;
            let interval_ms = self.config.interval_ms;
            let batch_cursor = cursor.clone();

            let batch = self
                .pool
                .interact(move |conn| {
                    decay_batch_sync(
                        conn,
                        table,
                        batch_cursor.as_deref(),
                        batch_size,
                        interval_ms,
                        now,
                        context,
                    )
                    .map_err(Into::into)
                })
                .await;

            match batch {
                Ok(batch) => {
                    outcome.processed += batch.scanned as u64;
                    outcome.decayed += batch.decayed as u64;
                    outcome.decay_sum += batch.decay_sum;
                    outcome.batches += 1;

                    if batch.scanned < batch_size {
                        break;
                    }
                    cursor = batch.last_id;
                }
                Err(e) => {
                    let err =
                        ChronicleError::DecayBatch(format!("{}: {}", table.name(), e));
                    tracing::warn!("{}", err);
                    errors.push(err.to_string());
                    break;
                }
            }

            tokio::time::sleep(self.config.batch_pause).await;
        }

        outcome
    }
}

/// Which table a batch operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecayTable {
    Chats,
    Facts,
}

impl DecayTable {
    fn name(&self) -> &'static str {
        match self {
            DecayTable::Chats => "chats",
            DecayTable::Facts => "facts",
        }
    }
}

#[derive(Default)]
struct TableOutcome {
    processed: u64,
    decayed: u64,
    decay_sum: f64,
    batches: u64,
}

struct BatchOutcome {
    scanned: usize,
    decayed: usize,
    decay_sum: f64,
    last_id: Option<String>,
}

/// One eligible row pulled by the cycle query.
struct DecayRow {
    id: String,
    salience: f64,
    memory_type: Option<MemoryType>,
    recall_count: i64,
    last_accessed_at: i64,
    decay_metadata: Option<DecayMetadata>,
}

/// Process one batch: select eligible rows after the cursor, apply the decay
/// engine, and persist results in a single transaction.
fn decay_batch_sync(
    conn: &Connection,
    table: DecayTable,
    cursor: Option<&str>,
    batch_size: usize,
    interval_ms: i64,
    now: i64,
    context: EnvironmentalContext,
) -> rusqlite::Result<BatchOutcome> {
    // memory_type only exists on chats; facts decay with default parameters
    let sql = match table {
        DecayTable::Chats => {
            "SELECT id, salience, memory_type, recall_count, last_accessed_at, decay_metadata
             FROM chats
             WHERE salience > 0.1
               AND (decay_metadata IS NULL
                    OR json_extract(decay_metadata, '$.last_decay_run') IS NULL
                    OR ?1 - json_extract(decay_metadata, '$.last_decay_run') > ?2)
               AND (?3 IS NULL OR id > ?3)
             ORDER BY id ASC
             LIMIT ?4"
        }
        DecayTable::Facts => {
            "SELECT id, salience, NULL, recall_count, last_accessed_at, decay_metadata
             FROM facts
             WHERE salience > 0.1
               AND (decay_metadata IS NULL
                    OR json_extract(decay_metadata, '$.last_decay_run') IS NULL
                    OR ?1 - json_extract(decay_metadata, '$.last_decay_run') > ?2)
               AND (?3 IS NULL OR id > ?3)
             ORDER BY id ASC
             LIMIT ?4"
        }
    };

    let mut stmt = conn.prepare(sql)?;
    let rows: Vec<DecayRow> = stmt
        .query_map(
            params![now, interval_ms, cursor, batch_size as i64],
            |row| {
                let memory_type: Option<String> = row.get(2)?;
                let decay_metadata: Option<String> = row.get(5)?;
                Ok(DecayRow {
                    id: row.get(0)?,
                    salience: row.get(1)?,
                    memory_type: memory_type.as_deref().and_then(MemoryType::parse),
                    recall_count: row.get(3)?,
                    last_accessed_at: row.get(4)?,
                    decay_metadata: decay_metadata
                        .as_deref()
                        .and_then(|s| serde_json::from_str(s).ok()),
                })
            },
        )?
        .collect::<rusqlite::Result<_>>()?;

    let tx = conn.unchecked_transaction()?;
    let mut decayed = 0usize;
    let mut decay_sum = 0.0f64;
    let mut last_id = None;

    for row in &rows {
        let hours = (now - row.last_accessed_at).max(0) as f64 / 3_600_000.0;
        let outcome = compute_decay(
            &DecayInput {
                salience: row.salience,
                hours_since_access: hours,
                memory_type: row.memory_type,
                recall_count: row.recall_count,
            },
            context,
        );

        let mut metadata = row.decay_metadata.clone().unwrap_or_default();
        metadata.last_decay_run = Some(now);

        if outcome.new_salience < row.salience {
            metadata.history.push(DecayHistoryEntry {
                timestamp: now,
                previous_salience: row.salience,
                new_salience: outcome.new_salience,
                hours_since_access: hours,
                ltp_factor: outcome.modifiers.ltp_factor,
                recall_boost: outcome.modifiers.recall_boost,
                env_multiplier: outcome.modifiers.env_multiplier,
                ebbinghaus_modifier: outcome.modifiers.ebbinghaus_modifier,
            });
            if metadata.history.len() > HISTORY_LIMIT {
                let excess = metadata.history.len() - HISTORY_LIMIT;
                metadata.history.drain(0..excess);
            }

            let metadata_json = serde_json::to_string(&metadata)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            tx.execute(
                &format!(
                    "UPDATE {} SET salience = ?2, decay_metadata = ?3 WHERE id = ?1",
                    table.name()
                ),
                params![row.id, outcome.new_salience, metadata_json],
            )?;
            decayed += 1;
            decay_sum += outcome.decay_amount;
        } else {
            // Still stamp the run so the interval guard skips this row
            let metadata_json = serde_json::to_string(&metadata)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            tx.execute(
                &format!(
                    "UPDATE {} SET decay_metadata = ?2 WHERE id = ?1",
                    table.name()
                ),
                params![row.id, metadata_json],
            )?;
        }

        last_id = Some(row.id.clone());
    }

    tx.commit()?;

    Ok(BatchOutcome {
        scanned: rows.len(),
        decayed,
        decay_sum,
        last_id,
    })
}

/// Salience values of live memory: every chat plus every live fact.
fn live_salience_values(conn: &Connection) -> rusqlite::Result<Vec<f64>> {
    let mut values = Vec::new();
    let mut stmt = conn.prepare("SELECT salience FROM chats")?;
    for value in stmt.query_map([], |row| row.get::<_, f64>(0))? {
        values.push(value?);
    }
    let mut stmt = conn.prepare("SELECT salience FROM facts WHERE valid_to IS NULL")?;
    for value in stmt.query_map([], |row| row.get::<_, f64>(0))? {
        values.push(value?);
    }
    Ok(values)
}
