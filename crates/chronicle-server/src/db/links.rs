// db/links.rs
// Manual link edges between items

use chronicle_types::Link;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{ChronicleError, Result};

/// Add a link edge. One direction is stored; adding the
/// reverse of an existing edge is a no-op. Returns whether the logical link
/// exists after the call.
pub fn add_link_sync(
    conn: &Connection,
    from: &str,
    to: &str,
    link_type: Option<&str>,
    now: i64,
) -> Result<bool> {
    for id in [from, to] {
        let exists: bool = conn
            .query_row("SELECT 1 FROM chats WHERE id = ?1", [id], |_| Ok(true))
            .optional()?
            .unwrap_or(false);
        if !exists {
            return Err(ChronicleError::NotFound(format!("chat {id}")));
        }
    }

    let reverse_exists: bool = conn
        .query_row(
            "SELECT 1 FROM links WHERE from_id = ?1 AND to_id = ?2",
            params![to, from],
            |_| Ok(true),
        )
        .optional()?
        .unwrap_or(false);
    if reverse_exists {
        return Ok(true);
    }

    conn.execute(
        "INSERT OR IGNORE INTO links (from_id, to_id, type, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![from, to, link_type, now],
    )?;
    Ok(true)
}

/// Remove a link edge in either direction. Returns
/// whether anything was removed.
pub fn remove_link_sync(conn: &Connection, a: &str, b: &str) -> rusqlite::Result<bool> {
    let removed = conn.execute(
        "DELETE FROM links
         WHERE (from_id = ?1 AND to_id = ?2) OR (from_id = ?2 AND to_id = ?1)",
        params![a, b],
    )?;
    Ok(removed > 0)
}

/// All link edges, newest first.
pub fn load_links_sync(conn: &Connection) -> rusqlite::Result<Vec<Link>> {
    let mut stmt = conn.prepare(
        "SELECT from_id, to_id, type, created_at FROM links ORDER BY created_at DESC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Link {
            from_id: row.get(0)?,
            to_id: row.get(1)?,
            link_type: row.get(2)?,
            created_at: row.get(3)?,
        })
    })?;
    rows.collect()
}
