// db/test_support.rs
// Shared helpers for database-level tests

#![allow(clippy::unwrap_used)]

use rusqlite::Connection;

/// Embedding dimension used throughout the db tests. Small on purpose —
/// the engine only requires a consistent dimension, not a realistic one.
pub const TEST_DIM: usize = 8;

/// Open a fully-migrated in-memory connection for sync-level tests.
pub fn setup_test_connection() -> Connection {
    super::pool::ensure_sqlite_vec_registered();
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
    super::schema::run_all_migrations(&conn, TEST_DIM).unwrap();
    conn
}

/// Insert a minimal chat row and return its id.
pub fn insert_chat(conn: &Connection, id: &str, created_at: i64) -> String {
    conn.execute(
        "INSERT INTO chats (id, kind, title, summary, content, source,
         created_at, updated_at, last_accessed_at)
         VALUES (?1, 'chat', ?1, '', '', 'Manual', ?2, ?2, ?2)",
        rusqlite::params![id, created_at],
    )
    .unwrap();
    id.to_string()
}

/// A unit embedding along the given axis, padded to [`TEST_DIM`].
pub fn axis_embedding(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; TEST_DIM];
    v[axis] = 1.0;
    v
}
