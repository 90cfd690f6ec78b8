// db/metrics.rs
// Decay run telemetry: append-only metric rows + age-based pruning

use chronicle_types::DecayRunMetric;
use rusqlite::{Connection, params};

/// Metric rows older than this are pruned. Consumers rely on at least a
/// week of history; 30 days keeps a comfortable margin.
pub const METRIC_RETENTION_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// Append one run metric.
pub fn insert_decay_metric_sync(
    conn: &Connection,
    metric: &DecayRunMetric,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO salience_decay_metrics (run_timestamp, items_processed,
         items_decayed, error_count, average_decay_amount, memory_entropy,
         environmental_context, processing_duration_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            metric.run_timestamp,
            metric.items_processed,
            metric.items_decayed,
            metric.error_count,
            metric.average_decay_amount,
            metric.memory_entropy,
            metric.environmental_context,
            metric.processing_duration_ms,
        ],
    )?;
    Ok(())
}

/// Most recent run metrics, newest first.
pub fn recent_runs_sync(conn: &Connection, limit: usize) -> rusqlite::Result<Vec<DecayRunMetric>> {
    let mut stmt = conn.prepare(
        "SELECT run_timestamp, items_processed, items_decayed, error_count,
         average_decay_amount, memory_entropy, environmental_context,
         processing_duration_ms
         FROM salience_decay_metrics
         ORDER BY run_timestamp DESC
         LIMIT ?1",
    )?;
    let rows = stmt.query_map([limit as i64], |row| {
        Ok(DecayRunMetric {
            run_timestamp: row.get(0)?,
            items_processed: row.get(1)?,
            items_decayed: row.get(2)?,
            error_count: row.get(3)?,
            average_decay_amount: row.get(4)?,
            memory_entropy: row.get(5)?,
            environmental_context: row.get(6)?,
            processing_duration_ms: row.get(7)?,
        })
    })?;
    rows.collect()
}

/// Drop metric rows past the retention window. Returns rows deleted.
pub fn prune_metrics_sync(conn: &Connection, now: i64) -> rusqlite::Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM salience_decay_metrics WHERE run_timestamp < ?1",
        [now - METRIC_RETENTION_MS],
    )?;
    if deleted > 0 {
        tracing::info!("[retention] Deleted {} old decay metric rows", deleted);
    }
    Ok(deleted)
}
