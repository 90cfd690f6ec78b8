// db/schema.rs
// Database schema and migrations

use anyhow::Result;
use rusqlite::Connection;

use super::migration_helpers::add_column_if_missing;

/// Run all schema setup and migrations.
///
/// Called during database initialization. This function is idempotent -
/// it checks for existing tables/columns before making changes.
pub fn run_all_migrations(conn: &Connection, embedding_dim: usize) -> Result<()> {
    // Create base tables
    conn.execute_batch(SCHEMA)?;

    // Run migrations in order
    migrate_decay_columns(conn)?;
    migrate_vec_chats(conn, embedding_dim)?;

    Ok(())
}

/// Database schema SQL
const SCHEMA: &str = r#"
-- =======================================
-- CORE: Items (chats and notes)
-- =======================================
CREATE TABLE IF NOT EXISTS chats (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL DEFAULT 'chat' CHECK (kind IN ('chat', 'note')),
    title TEXT NOT NULL DEFAULT '',
    summary TEXT NOT NULL DEFAULT '',
    content TEXT NOT NULL DEFAULT '',
    tags TEXT NOT NULL DEFAULT '[]',
    source TEXT NOT NULL DEFAULT 'Other',
    file_name TEXT,
    assets TEXT NOT NULL DEFAULT '[]',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    embedding BLOB,
    memory_type TEXT,
    salience REAL NOT NULL DEFAULT 0.4,
    recall_count INTEGER NOT NULL DEFAULT 0,
    last_accessed_at INTEGER NOT NULL,
    decay_metadata TEXT
);

CREATE INDEX IF NOT EXISTS idx_chats_created_at ON chats(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_chats_source ON chats(source);
CREATE INDEX IF NOT EXISTS idx_chats_kind ON chats(kind);
CREATE INDEX IF NOT EXISTS idx_chats_decay_scan
    ON chats(last_accessed_at) WHERE salience > 0.1;

-- =======================================
-- FACTS: bitemporal triples
-- =======================================
CREATE TABLE IF NOT EXISTS facts (
    id TEXT PRIMARY KEY,
    chat_id TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
    subject TEXT NOT NULL,
    predicate TEXT NOT NULL,
    object TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 1.0,
    salience REAL NOT NULL DEFAULT 0.5,
    valid_from INTEGER NOT NULL,
    valid_to INTEGER,
    created_at INTEGER NOT NULL,
    recall_count INTEGER NOT NULL DEFAULT 0,
    last_accessed_at INTEGER NOT NULL,
    decay_metadata TEXT
);

CREATE INDEX IF NOT EXISTS idx_facts_subject ON facts(subject);
CREATE INDEX IF NOT EXISTS idx_facts_predicate ON facts(predicate);
CREATE INDEX IF NOT EXISTS idx_facts_chat ON facts(chat_id);
CREATE INDEX IF NOT EXISTS idx_facts_decay_scan
    ON facts(last_accessed_at) WHERE salience > 0.1;

-- =======================================
-- LINKS: manual edges between items
-- =======================================
CREATE TABLE IF NOT EXISTS links (
    from_id TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
    to_id TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
    type TEXT,
    created_at INTEGER NOT NULL,
    UNIQUE (from_id, to_id)
);

-- =======================================
-- TELEMETRY: decay run metrics (append-only)
-- =======================================
CREATE TABLE IF NOT EXISTS salience_decay_metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_timestamp INTEGER NOT NULL,
    items_processed INTEGER NOT NULL DEFAULT 0,
    items_decayed INTEGER NOT NULL DEFAULT 0,
    error_count INTEGER NOT NULL DEFAULT 0,
    average_decay_amount REAL NOT NULL DEFAULT 0,
    memory_entropy REAL NOT NULL DEFAULT 0,
    environmental_context TEXT NOT NULL DEFAULT 'low_activity',
    processing_duration_ms INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_decay_metrics_run
    ON salience_decay_metrics(run_timestamp DESC);
"#;

/// Add decay bookkeeping columns to databases created before the decay
/// service existed.
fn migrate_decay_columns(conn: &Connection) -> Result<()> {
    for table in ["chats", "facts"] {
        add_column_if_missing(conn, table, "salience", "REAL NOT NULL DEFAULT 0.4")?;
        add_column_if_missing(conn, table, "recall_count", "INTEGER NOT NULL DEFAULT 0")?;
        add_column_if_missing(
            conn,
            table,
            "last_accessed_at",
            "INTEGER NOT NULL DEFAULT 0",
        )?;
        add_column_if_missing(conn, table, "decay_metadata", "TEXT")?;
    }
    Ok(())
}

/// Create the vector index over chat embeddings, migrating it when the
/// configured dimension changes.
///
/// vec0 virtual tables cannot be altered; a dimension change drops the table
/// and re-mirrors every stored embedding from `chats.embedding`.
pub fn migrate_vec_chats(conn: &Connection, embedding_dim: usize) -> Result<()> {
    // Check current dimension by parsing the table definition
    let current_dim: Option<i64> = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type='table' AND name='vec_chats'",
            [],
            |row| {
                let sql: String = row.get(0)?;
                // Parse dimension from SQL like "embedding float[768]"
                if let Some(start) = sql.find("float[") {
                    let rest = &sql[start + 6..];
                    if let Some(end) = rest.find(']') {
                        if let Ok(dim) = rest[..end].parse::<i64>() {
                            return Ok(Some(dim));
                        }
                    }
                }
                Ok(None)
            },
        )
        .unwrap_or(None);

    match current_dim {
        Some(dim) if dim == embedding_dim as i64 => return Ok(()),
        Some(dim) => {
            tracing::info!(
                "Migrating vec_chats from {} to {} dimensions",
                dim,
                embedding_dim
            );
            conn.execute("DROP TABLE IF EXISTS vec_chats", [])?;
        }
        None => {}
    }

    conn.execute(
        &format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS vec_chats USING vec0(
                embedding float[{embedding_dim}],
                +chat_id TEXT
            )"
        ),
        [],
    )?;

    // Re-mirror embeddings whose byte length matches the new dimension.
    // Stale-dimension blobs stay on chats until the next upsert rewrites them.
    let mirrored = conn.execute(
        "INSERT INTO vec_chats (embedding, chat_id)
         SELECT embedding, id FROM chats
         WHERE embedding IS NOT NULL AND length(embedding) = ?1 * 4",
        [embedding_dim as i64],
    )?;
    if mirrored > 0 {
        tracing::info!("Mirrored {} embeddings into vec_chats", mirrored);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migration_helpers::table_exists;
    use crate::db::test_support::setup_test_connection;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = setup_test_connection();
        // Second run must be a no-op, not an error
        run_all_migrations(&conn, 8).unwrap();

        for table in ["chats", "facts", "links", "salience_decay_metrics"] {
            assert!(table_exists(&conn, table), "{table} should exist");
        }
        assert!(table_exists(&conn, "vec_chats"));
    }

    #[test]
    fn test_vec_chats_dimension_migration() {
        let conn = setup_test_connection();

        // Store an 8-dim embedding and mirror it
        let bytes: Vec<u8> = [1.0f32, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
            .iter()
            .flat_map(|f| f.to_le_bytes())
            .collect();
        conn.execute(
            "INSERT INTO chats (id, kind, title, summary, content, source,
             created_at, updated_at, last_accessed_at, embedding)
             VALUES ('c1', 'chat', '', '', '', 'Manual', 1, 1, 1, ?1)",
            [&bytes],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO vec_chats (embedding, chat_id) VALUES (?1, 'c1')",
            [&bytes],
        )
        .unwrap();

        // Re-running with the same dimension keeps the row
        migrate_vec_chats(&conn, 8).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM vec_chats", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);

        // A dimension change drops the index; the stale 8-dim blob is not
        // re-mirrored into the 16-dim table
        migrate_vec_chats(&conn, 16).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM vec_chats", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
