// db/vector.rs
// Embedding storage and nearest-neighbour queries over vec_chats

use chronicle_types::Item;
use rusqlite::{Connection, OptionalExtension, params};

use super::types::{ITEM_COLUMNS, SearchFilters, parse_item_row};
use crate::error::{ChronicleError, Result};

/// Convert embedding vector to bytes for sqlite-vec queries
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert a stored blob back into an embedding vector
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Convert distance to similarity score (0.0 to 1.0)
pub fn distance_to_score(distance: f64) -> f64 {
    1.0 - distance.clamp(0.0, 1.0)
}

/// Rewrite the vec_chats mirror row for one chat.
///
/// The vec0 virtual table has no FK cascade, so every write path that
/// touches `chats.embedding` goes through here.
pub fn upsert_embedding_mirror_sync(
    conn: &Connection,
    chat_id: &str,
    embedding: Option<&[f32]>,
) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM vec_chats WHERE chat_id = ?1", [chat_id])?;
    if let Some(vec) = embedding {
        conn.execute(
            "INSERT INTO vec_chats (embedding, chat_id) VALUES (?1, ?2)",
            params![embedding_to_bytes(vec), chat_id],
        )?;
    }
    Ok(())
}

/// Load one chat's embedding, if any.
pub fn get_item_embedding_sync(
    conn: &Connection,
    chat_id: &str,
) -> rusqlite::Result<Option<Vec<f32>>> {
    let blob: Option<Option<Vec<u8>>> = conn
        .query_row(
            "SELECT embedding FROM chats WHERE id = ?1",
            [chat_id],
            |row| row.get(0),
        )
        .optional()?;

    Ok(blob.flatten().map(|b| bytes_to_embedding(&b)))
}

/// Nearest-neighbour query: up to `k` items with embeddings, ordered by
/// ascending cosine distance, ties broken by id so results are stable.
///
/// Returns `(item, cosine_distance)` pairs.
pub fn vector_knn_sync(
    conn: &Connection,
    query: &[f32],
    k: usize,
    filters: &SearchFilters,
    embedding_dim: usize,
) -> Result<Vec<(Item, f64)>> {
    if query.len() != embedding_dim {
        return Err(ChronicleError::validation(
            "query_vec",
            format!(
                "expected {} dimensions, got {}",
                embedding_dim,
                query.len()
            ),
        ));
    }

    let sql = format!(
        "SELECT {ITEM_COLUMNS}, vec_distance_cosine(v.embedding, ?1) AS distance
         FROM vec_chats v
         JOIN chats c ON c.id = v.chat_id
         WHERE (?2 IS NULL OR c.memory_type = ?2)
           AND (?3 IS NULL OR c.salience >= ?3)
           AND (?4 IS NULL OR c.id != ?4)
         ORDER BY distance ASC, c.id ASC
         LIMIT ?5",
        ITEM_COLUMNS = qualified_item_columns(),
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![
            embedding_to_bytes(query),
            filters.memory_type.map(|t| t.as_str()),
            filters.min_salience,
            filters.exclude_id,
            k as i64
        ],
        |row| {
            let item = parse_item_row(row)?;
            let distance: f64 = row.get(17)?;
            Ok((item, distance))
        },
    )?;

    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(ChronicleError::from)
}

/// ITEM_COLUMNS with the `c.` qualifier for joined queries.
fn qualified_item_columns() -> String {
    ITEM_COLUMNS
        .split(", ")
        .map(|col| format!("c.{}", col.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}
