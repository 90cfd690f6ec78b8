// db/pool.rs
// Async connection pool using deadpool-sqlite
//
// Prefer `pool.run()` in tool handlers — it converts errors to
// `ChronicleError` automatically. Use `pool.interact()` when an
// `anyhow::Result` is more convenient (migrations, scheduler internals).
// Closures run on a blocking thread, so they never stall the async runtime.
//
// In-memory pools use a shared-cache URI so every pooled connection sees the
// same database. Tests depend on this.

use crate::error::ChronicleError;
use anyhow::{Context, Result};
use deadpool_sqlite::{Config, Hook, Pool, Runtime};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Registers sqlite-vec extension globally (once per process).
/// Must be called before any SQLite connections are opened.
static SQLITE_VEC_INIT: Once = Once::new();

#[allow(clippy::missing_transmute_annotations)]
pub(crate) fn ensure_sqlite_vec_registered() {
    SQLITE_VEC_INIT.call_once(|| {
        // SAFETY: sqlite3_vec_init has the signature expected by
        // sqlite3_auto_extension. The transmute converts the fn-pointer to
        // the Option<extern "C" fn()> that sqlite3_auto_extension accepts;
        // the pointer targets a statically-linked symbol and stays valid for
        // the process lifetime.
        unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite_vec::sqlite3_vec_init as *const (),
            )));
        }
        tracing::debug!("sqlite-vec extension registered globally");
    });
}

/// Check if a rusqlite error is SQLITE_BUSY, SQLITE_LOCKED, or
/// SQLITE_CANTOPEN — the connection-class failures worth retrying.
fn is_rusqlite_connection_failure(err: &rusqlite::Error) -> bool {
    use rusqlite::ffi;
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            ffi::Error {
                code: ffi::ErrorCode::DatabaseBusy
                    | ffi::ErrorCode::DatabaseLocked
                    | ffi::ErrorCode::CannotOpen,
                ..
            },
            _,
        )
    )
}

/// Check whether an anyhow::Error chain contains a retryable
/// connection-class failure (contention or pool exhaustion).
fn is_connection_failure(err: &anyhow::Error) -> bool {
    if let Some(rusqlite_err) = err.downcast_ref::<rusqlite::Error>() {
        return is_rusqlite_connection_failure(rusqlite_err);
    }
    if let Some(chron_err) = err.downcast_ref::<ChronicleError>() {
        return is_chronicle_contention(chron_err);
    }
    false
}

/// Check if a ChronicleError wraps a retryable SQLite failure.
fn is_chronicle_contention(err: &ChronicleError) -> bool {
    match err {
        ChronicleError::Db(e) => is_rusqlite_connection_failure(e),
        ChronicleError::Transport(_) => true,
        _ => false,
    }
}

/// Retry delays for SQLite contention backoff (100ms, 500ms, 2s).
const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_millis(100),
    Duration::from_millis(500),
    Duration::from_millis(2000),
];

/// Generic retry-with-backoff for async operations that may encounter SQLite
/// contention. Calls `op` up to `RETRY_DELAYS.len() + 1` times, sleeping
/// between retries when `is_retryable` returns true for the error.
async fn retry_with_backoff<F, Fut, R, E>(
    mut op: F,
    is_retryable: impl Fn(&E) -> bool,
) -> std::result::Result<R, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<R, E>>,
    E: std::fmt::Display,
{
    for (attempt, delay) in RETRY_DELAYS.iter().enumerate() {
        match op().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if is_retryable(&e) {
                    tracing::warn!(
                        "SQLite contention on attempt {}/{}, retrying in {:?}",
                        attempt + 1,
                        RETRY_DELAYS.len(),
                        delay
                    );
                    tokio::time::sleep(*delay).await;
                } else {
                    return Err(e);
                }
            }
        }
    }

    op().await
}

/// Database pool wrapper with sqlite-vec support and per-connection setup.
pub struct DatabasePool {
    pool: Pool,
    path: Option<PathBuf>,
    /// URI for in-memory databases (used to share state in tests)
    memory_uri: Option<String>,
    /// Embedding dimension the vector index was created with.
    embedding_dim: usize,
}

/// Whether to use a file path or shared in-memory URI.
enum DbStorage {
    File(PathBuf),
    InMemory,
}

impl DatabasePool {
    /// Open a pooled database at the given path and run migrations.
    pub async fn open(path: &Path, embedding_dim: usize) -> Result<Self> {
        Self::open_internal(DbStorage::File(path.to_path_buf()), embedding_dim).await
    }

    /// Open with startup retry: connection-class failures are retried up
    /// to 10 times with exponential backoff (1s → 30s, ×2). Schema and SQL
    /// errors surface immediately — a broken migration is fatal, waiting
    /// will not fix it.
    pub async fn open_with_retry(path: &Path, embedding_dim: usize) -> Result<Self> {
        let mut delay = Duration::from_secs(1);
        let max_delay = Duration::from_secs(30);

        for attempt in 1..=10u32 {
            match Self::open(path, embedding_dim).await {
                Ok(pool) => return Ok(pool),
                Err(e) if attempt < 10 && is_connection_failure(&e) => {
                    tracing::warn!(
                        "Database unavailable (attempt {}/10), retrying in {:?}: {}",
                        attempt,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(max_delay);
                }
                Err(e) => return Err(e),
            }
        }
        unreachable!("loop returns on the final attempt")
    }

    /// Open a pooled in-memory database.
    ///
    /// Uses a shared cache URI so all connections access the same in-memory
    /// database — without it each pooled connection would get its own empty
    /// database.
    pub async fn open_in_memory(embedding_dim: usize) -> Result<Self> {
        Self::open_internal(DbStorage::InMemory, embedding_dim).await
    }

    /// Internal constructor shared by all open variants.
    async fn open_internal(storage: DbStorage, embedding_dim: usize) -> Result<Self> {
        ensure_sqlite_vec_registered();

        let (conn_str, path, memory_uri, hook) = match storage {
            DbStorage::File(p) => {
                ensure_parent_directory(&p)?;
                let s = p.to_string_lossy().to_string();
                let hook = make_file_post_create_hook(p.clone());
                (s, Some(p), None, hook)
            }
            DbStorage::InMemory => {
                let uri = format!(
                    "file:memdb_{:?}?mode=memory&cache=shared",
                    uuid::Uuid::new_v4()
                );
                let hook = make_memory_post_create_hook();
                (uri.clone(), None, Some(uri), hook)
            }
        };

        let cfg = Config::new(&conn_str);
        let pool = cfg
            .builder(Runtime::Tokio1)
            .context("Failed to create pool builder")?
            .max_size(8)
            .post_create(hook)
            .build()
            .context("Failed to build connection pool")?;

        let db_pool = Self {
            pool,
            path,
            memory_uri,
            embedding_dim,
        };

        // Contention while migrating stays retryable; anything else is a
        // schema failure, fatal and must not look retryable to
        // open_with_retry
        if let Err(e) = db_pool.run_migrations().await {
            if is_connection_failure(&e) {
                return Err(e);
            }
            return Err(ChronicleError::Schema(format!("migration failed: {e:#}")).into());
        }

        Ok(db_pool)
    }

    /// Get the memory URI (for sharing state in tests)
    pub fn memory_uri(&self) -> Option<&str> {
        self.memory_uri.as_deref()
    }

    /// Get the database file path (None for in-memory).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Embedding dimension the pool was opened with.
    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    /// Run a closure with a connection from the pool.
    ///
    /// The closure runs on a blocking thread pool, so it won't block the
    /// async runtime.
    pub async fn interact<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get connection from pool")?;

        conn.interact(move |conn| f(conn))
            .await
            .map_err(|e| anyhow::anyhow!("interact failed: {e}"))?
    }

    /// Run a closure and return `Result<T, ChronicleError>`.
    ///
    /// Preferred for MCP tool handlers and the host bindings — it does all
    /// the error conversion in one place. Pool acquisition failures map to
    /// `Transport` per the error taxonomy.
    pub async fn run<F, R, E>(&self, f: F) -> std::result::Result<R, ChronicleError>
    where
        F: FnOnce(&Connection) -> std::result::Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: Into<ChronicleError> + Send + 'static,
    {
        self.pool
            .get()
            .await
            .map_err(|e| ChronicleError::Transport(format!("Failed to get connection: {}", e)))?
            .interact(move |conn| f(conn).map_err(Into::into))
            .await
            .map_err(|e| ChronicleError::Transport(format!("Database task failed: {}", e)))?
    }

    /// Like [`run`](Self::run) but with retry on SQLite contention errors.
    ///
    /// Use for critical short writes that race the decay scheduler
    /// (salience boosts, view tracking). The closure must be `Clone`.
    pub async fn run_with_retry<F, R, E>(&self, f: F) -> std::result::Result<R, ChronicleError>
    where
        F: FnOnce(&Connection) -> std::result::Result<R, E> + Send + Clone + 'static,
        R: Send + 'static,
        E: Into<ChronicleError> + Send + 'static,
    {
        retry_with_backoff(
            || {
                let f_clone = f.clone();
                self.run(f_clone)
            },
            is_chronicle_contention,
        )
        .await
    }

    /// Run migrations on a pooled connection. Safe to call repeatedly.
    pub async fn run_migrations(&self) -> Result<()> {
        let dim = self.embedding_dim;
        self.interact(move |conn| {
            super::schema::run_all_migrations(conn, dim)?;
            if let Err(e) = conn.execute_batch("PRAGMA optimize") {
                tracing::debug!("PRAGMA optimize skipped: {}", e);
            }
            Ok(())
        })
        .await
    }
}

/// Ensure parent directory exists with secure permissions (0o700 on Unix).
fn ensure_parent_directory(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
        #[cfg(unix)]
        {
            let mut perms = std::fs::metadata(parent)?.permissions();
            perms.set_mode(0o700);
            std::fs::set_permissions(parent, perms)?;
        }
        #[cfg(not(unix))]
        tracing::debug!(
            "Skipping directory permission restriction on non-Unix platform: {}",
            parent.display()
        );
    }
    Ok(())
}

/// Create a post_create hook for file-based databases.
///
/// Sets up PRAGMAs via `setup_connection` and restricts file permissions to
/// 0o600 — the archive holds personal conversations.
fn make_file_post_create_hook(path: PathBuf) -> Hook {
    Hook::async_fn(move |conn, _metrics| {
        let path_for_perms = path.clone();
        Box::pin(async move {
            conn.interact(move |conn| {
                setup_connection(conn)?;

                #[cfg(unix)]
                if let Ok(metadata) = std::fs::metadata(&path_for_perms) {
                    let mut perms = metadata.permissions();
                    perms.set_mode(0o600);
                    if let Err(e) = std::fs::set_permissions(&path_for_perms, perms) {
                        tracing::warn!("Failed to set database file permissions to 0600: {}", e);
                    }
                }
                #[cfg(not(unix))]
                tracing::debug!(
                    "Skipping DB file permission restriction on non-Unix platform: {}",
                    path_for_perms.display()
                );

                Ok::<_, rusqlite::Error>(())
            })
            .await
            .map_err(|e| {
                deadpool_sqlite::HookError::Message(format!("interact failed: {e}").into())
            })?
            .map_err(|e| {
                deadpool_sqlite::HookError::Message(format!("connection setup failed: {e}").into())
            })
        })
    })
}

/// Create a post_create hook for in-memory databases.
///
/// Enables foreign keys and busy_timeout (WAL mode is not applicable to
/// in-memory DBs).
fn make_memory_post_create_hook() -> Hook {
    Hook::async_fn(|conn, _metrics| {
        Box::pin(async move {
            conn.interact(|conn| {
                conn.execute_batch(
                    "PRAGMA foreign_keys=ON; \
                     PRAGMA busy_timeout=5000;",
                )?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .map_err(|e| {
                deadpool_sqlite::HookError::Message(format!("interact failed: {e}").into())
            })?
            .map_err(|e| {
                deadpool_sqlite::HookError::Message(format!("connection setup failed: {e}").into())
            })
        })
    })
}

/// Configure a connection after it's created.
/// WAL for concurrency, foreign keys for cascades, 5s busy timeout for write
/// contention, NORMAL synchronous (safe with WAL).
fn setup_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL; \
         PRAGMA foreign_keys=ON; \
         PRAGMA busy_timeout=5000; \
         PRAGMA synchronous=NORMAL; \
         PRAGMA journal_size_limit=32768;",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pool_in_memory() {
        let pool = DatabasePool::open_in_memory(8)
            .await
            .expect("Failed to open in-memory pool");

        pool.interact(|conn| {
            conn.execute(
                "INSERT INTO chats (id, kind, title, summary, content, source,
                 created_at, updated_at, last_accessed_at)
                 VALUES ('c1', 'chat', 't', 's', 'body', 'Manual', 1, 1, 1)",
                [],
            )?;
            Ok(())
        })
        .await
        .expect("Failed to insert");

        // Verify from another connection in the pool (tests shared cache)
        let title: String = pool
            .interact(|conn| {
                conn.query_row("SELECT title FROM chats WHERE id = 'c1'", [], |row| {
                    row.get(0)
                })
                .map_err(Into::into)
            })
            .await
            .expect("Failed to query");

        assert_eq!(title, "t");
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let pool = std::sync::Arc::new(
            DatabasePool::open_in_memory(8)
                .await
                .expect("Failed to open pool"),
        );

        let mut handles = Vec::new();
        for i in 0..10 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                pool.run_with_retry(move |conn| {
                    conn.execute(
                        "INSERT INTO chats (id, kind, title, summary, content, source,
                         created_at, updated_at, last_accessed_at)
                         VALUES (?1, 'chat', ?1, '', '', 'Manual', 1, 1, 1)",
                        rusqlite::params![format!("c{i}")],
                    )
                    .map_err(ChronicleError::from)?;
                    Ok::<_, ChronicleError>(())
                })
                .await
            }));
        }

        for handle in handles {
            handle.await.unwrap().expect("Insert failed");
        }

        let count: i64 = pool
            .interact(|conn| {
                conn.query_row("SELECT COUNT(*) FROM chats", [], |row| row.get(0))
                    .map_err(Into::into)
            })
            .await
            .expect("Count failed");

        assert_eq!(count, 10);
    }

    #[tokio::test]
    async fn test_run_with_retry_non_busy_error_fails_fast() {
        let pool = DatabasePool::open_in_memory(8)
            .await
            .expect("Failed to open pool");

        // A SQL error (not SQLITE_BUSY) should fail immediately
        let result = pool
            .run_with_retry(|conn| {
                conn.execute("INSERT INTO nonexistent_table VALUES (1)", [])
                    .map_err(ChronicleError::from)?;
                Ok::<_, ChronicleError>(())
            })
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_file_database_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("chronicle.db");

        {
            let pool = DatabasePool::open(&path, 8).await.expect("open");
            pool.interact(|conn| {
                conn.execute(
                    "INSERT INTO chats (id, kind, title, summary, content, source,
                     created_at, updated_at, last_accessed_at)
                     VALUES ('c1', 'note', 't', '', '', 'Manual', 1, 1, 1)",
                    [],
                )?;
                Ok(())
            })
            .await
            .expect("insert");
        }

        // Reopen runs migrations again; both must be no-ops on a live schema
        let pool = DatabasePool::open_with_retry(&path, 8)
            .await
            .expect("reopen");
        let count: i64 = pool
            .interact(|conn| {
                conn.query_row("SELECT COUNT(*) FROM chats", [], |row| row.get(0))
                    .map_err(Into::into)
            })
            .await
            .expect("count");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_is_connection_failure_busy() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ffi::ErrorCode::DatabaseBusy,
                extended_code: 5,
            },
            Some("database is locked".to_string()),
        );
        assert!(is_rusqlite_connection_failure(&err));
        let anyhow_err: anyhow::Error = err.into();
        assert!(is_connection_failure(&anyhow_err));
    }

    #[test]
    fn test_is_connection_failure_constraint_violation() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ffi::ErrorCode::ConstraintViolation,
                extended_code: 19,
            },
            Some("UNIQUE constraint failed".to_string()),
        );
        assert!(!is_rusqlite_connection_failure(&err));
    }

    #[test]
    fn test_string_errors_are_not_retryable() {
        let anyhow_err = anyhow::anyhow!("database is locked");
        assert!(!is_connection_failure(&anyhow_err));
    }
}
