// db/items.rs
// Item storage operations: upsert, load, delete, rehearsal, search

use chronicle_types::{Item, MemoryType};
use rusqlite::{Connection, OptionalExtension, params};

use super::types::{ITEM_COLUMNS, SearchFilters, parse_item_row};
use super::vector::upsert_embedding_mirror_sync;
use crate::decay::params::clamp_salience;
use crate::error::{ChronicleError, Result};

/// Salience bump applied to an item on rehearsal.
const RECALL_BOOST: f64 = 0.05;
/// Smaller bump applied to the item's facts on rehearsal.
const FACT_RECALL_BOOST: f64 = 0.03;
/// Keyword search result cap.
const KEYWORD_SEARCH_LIMIT: usize = 10;

/// De-duplicate tags preserving first occurrence.
fn collapse_tags(tags: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.iter()
        .filter(|t| seen.insert(t.as_str()))
        .cloned()
        .collect()
}

/// Transactional bulk insert/update keyed by id.
///
/// Updates set `updated_at = now` and preserve `created_at`, `recall_count`,
/// `last_accessed_at`, and `decay_metadata` from the stored row. Embedding
/// dimension is validated against the deployment's configured dimension and
/// fails the whole batch.
pub fn upsert_items_sync(
    conn: &Connection,
    items: &[Item],
    embedding_dim: usize,
    now: i64,
) -> Result<usize> {
    for item in items {
        if let Some(ref vec) = item.embedding {
            if vec.len() != embedding_dim {
                return Err(ChronicleError::validation(
                    "embedding",
                    format!(
                        "item {}: expected {} dimensions, got {}",
                        item.id,
                        embedding_dim,
                        vec.len()
                    ),
                ));
            }
        }
    }

    let tx = conn.unchecked_transaction()?;
    let mut written = 0;

    for item in items {
        let tags = serde_json::to_string(&collapse_tags(&item.tags))?;
        let assets = serde_json::to_string(&item.assets)?;
        let salience = clamp_salience(item.salience, item.memory_type);
        let embedding_bytes = item.embedding.as_ref().map(|v| super::vector::embedding_to_bytes(v));

        let exists: bool = tx
            .query_row("SELECT 1 FROM chats WHERE id = ?1", [&item.id], |_| Ok(true))
            .optional()?
            .unwrap_or(false);

        if exists {
            tx.execute(
                "UPDATE chats SET kind = ?2, title = ?3, summary = ?4, content = ?5,
                 tags = ?6, source = ?7, file_name = ?8, assets = ?9,
                 embedding = ?10, memory_type = ?11, salience = ?12, updated_at = ?13
                 WHERE id = ?1",
                params![
                    item.id,
                    item.kind.as_str(),
                    item.title,
                    item.summary,
                    item.content,
                    tags,
                    item.source,
                    item.file_name,
                    assets,
                    embedding_bytes,
                    item.memory_type.map(|t| t.as_str()),
                    salience,
                    now,
                ],
            )?;
        } else {
            let last_accessed = if item.last_accessed_at > 0 {
                item.last_accessed_at
            } else {
                item.created_at
            };
            let decay_metadata = item
                .decay_metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            tx.execute(
                "INSERT INTO chats (id, kind, title, summary, content, tags, source,
                 file_name, assets, created_at, updated_at, embedding, memory_type,
                 salience, recall_count, last_accessed_at, decay_metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                         ?14, ?15, ?16, ?17)",
                params![
                    item.id,
                    item.kind.as_str(),
                    item.title,
                    item.summary,
                    item.content,
                    tags,
                    item.source,
                    item.file_name,
                    assets,
                    item.created_at,
                    now,
                    embedding_bytes,
                    item.memory_type.map(|t| t.as_str()),
                    salience,
                    item.recall_count,
                    last_accessed,
                    decay_metadata,
                ],
            )?;
        }

        upsert_embedding_mirror_sync(&tx, &item.id, item.embedding.as_deref())?;
        written += 1;
    }

    tx.commit()?;
    Ok(written)
}

/// All items, newest first.
pub fn load_items_sync(conn: &Connection) -> rusqlite::Result<Vec<Item>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM chats ORDER BY created_at DESC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], parse_item_row)?;
    rows.collect()
}

/// Load a single item by id.
pub fn get_item_sync(conn: &Connection, id: &str) -> rusqlite::Result<Option<Item>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM chats WHERE id = ?1");
    conn.query_row(&sql, [id], parse_item_row).optional()
}

/// Delete an item, cascading to links and facts. No-op if absent.
pub fn delete_item_sync(conn: &Connection, id: &str) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;
    // Virtual tables have no FK cascade
    tx.execute("DELETE FROM vec_chats WHERE chat_id = ?1", [id])?;
    let deleted = tx.execute("DELETE FROM chats WHERE id = ?1", [id])?;
    tx.commit()?;
    Ok(deleted > 0)
}

/// Read-path rehearsal: bump the item's salience,
/// count the recall, refresh access time, and give the item's facts a
/// smaller nudge.
pub fn boost_salience_sync(conn: &Connection, id: &str, now: i64) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    let updated = tx.execute(
        "UPDATE chats SET salience = MIN(salience + ?2, 1.0),
         recall_count = recall_count + 1, last_accessed_at = ?3
         WHERE id = ?1",
        params![id, RECALL_BOOST, now],
    )?;
    if updated == 0 {
        return Err(ChronicleError::NotFound(format!("chat {id}")));
    }
    tx.execute(
        "UPDATE facts SET salience = MIN(salience + ?2, 1.0), last_accessed_at = ?3
         WHERE chat_id = ?1",
        params![id, FACT_RECALL_BOOST, now],
    )?;
    tx.commit()?;
    Ok(())
}

/// View tracking: the same timestamp/recall update as a boost, without the
/// salience bump.
pub fn track_view_sync(conn: &Connection, id: &str, now: i64) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    let updated = tx.execute(
        "UPDATE chats SET recall_count = recall_count + 1, last_accessed_at = ?2
         WHERE id = ?1",
        params![id, now],
    )?;
    if updated == 0 {
        return Err(ChronicleError::NotFound(format!("chat {id}")));
    }
    tx.execute(
        "UPDATE facts SET last_accessed_at = ?2 WHERE chat_id = ?1",
        params![id, now],
    )?;
    tx.commit()?;
    Ok(())
}

/// Scheduler access hook: refresh access time and count the recall.
pub fn record_access_sync(conn: &Connection, id: &str, now: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE chats SET recall_count = recall_count + 1, last_accessed_at = ?2
         WHERE id = ?1",
        params![id, now],
    )
}

/// Reclassify an item, re-clamping salience into the new type's range.
pub fn update_memory_type_sync(
    conn: &Connection,
    id: &str,
    memory_type: MemoryType,
) -> Result<()> {
    let floor = crate::decay::params::min_salience(Some(memory_type));
    let updated = conn.execute(
        "UPDATE chats SET memory_type = ?2, salience = MIN(MAX(salience, ?3), 1.0)
         WHERE id = ?1",
        params![id, memory_type.as_str(), floor],
    )?;
    if updated == 0 {
        return Err(ChronicleError::NotFound(format!("chat {id}")));
    }
    Ok(())
}

/// Escape LIKE wildcards in user input; patterns are matched with ESCAPE '\'.
fn like_pattern(pattern: &str) -> String {
    let escaped = pattern
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped.to_lowercase())
}

/// Case-insensitive substring search across title, summary, and tags.
/// Returns at most 10 items, newest first.
pub fn keyword_search_sync(
    conn: &Connection,
    pattern: &str,
    filters: &SearchFilters,
) -> rusqlite::Result<Vec<Item>> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM chats
         WHERE (LOWER(title) LIKE ?1 ESCAPE '\\'
                OR LOWER(summary) LIKE ?1 ESCAPE '\\'
                OR EXISTS (SELECT 1 FROM json_each(chats.tags)
                           WHERE LOWER(json_each.value) LIKE ?1 ESCAPE '\\'))
           AND (?2 IS NULL OR memory_type = ?2)
           AND (?3 IS NULL OR salience >= ?3)
           AND (?4 IS NULL OR id != ?4)
         ORDER BY created_at DESC
         LIMIT ?5"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![
            like_pattern(pattern),
            filters.memory_type.map(|t| t.as_str()),
            filters.min_salience,
            filters.exclude_id,
            KEYWORD_SEARCH_LIMIT as i64
        ],
        parse_item_row,
    )?;
    rows.collect()
}

/// Distinct tag strings, sorted ascending.
pub fn list_tags_sync(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT json_each.value FROM chats, json_each(chats.tags)
         ORDER BY json_each.value ASC",
    )?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.collect()
}

/// The `count` most recent items.
pub fn list_recent_sync(conn: &Connection, count: usize) -> rusqlite::Result<Vec<Item>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM chats ORDER BY created_at DESC LIMIT ?1");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([count as i64], parse_item_row)?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{TEST_DIM, axis_embedding, setup_test_connection};
    use chronicle_types::ItemKind;

    fn sample_item(id: &str, created_at: i64) -> Item {
        Item {
            id: id.into(),
            kind: ItemKind::Chat,
            title: format!("Title {id}"),
            summary: "A summary".into(),
            content: "Transcript body".into(),
            tags: vec!["rust".into(), "memory".into(), "rust".into()],
            source: "Claude".into(),
            file_name: None,
            assets: vec![],
            created_at,
            updated_at: created_at,
            embedding: None,
            memory_type: None,
            salience: 0.4,
            recall_count: 0,
            last_accessed_at: created_at,
            decay_metadata: None,
        }
    }

    #[test]
    fn test_upsert_collapses_tags_and_inserts() {
        let conn = setup_test_connection();
        upsert_items_sync(&conn, &[sample_item("a", 100)], TEST_DIM, 100).unwrap();

        let item = get_item_sync(&conn, "a").unwrap().unwrap();
        assert_eq!(item.tags, vec!["rust".to_string(), "memory".to_string()]);
        assert_eq!(item.salience, 0.4);
        assert_eq!(item.last_accessed_at, 100);
    }

    #[test]
    fn test_upsert_update_preserves_decay_state() {
        let conn = setup_test_connection();
        upsert_items_sync(&conn, &[sample_item("a", 100)], TEST_DIM, 100).unwrap();

        // Simulate rehearsal and decay bookkeeping between upserts
        boost_salience_sync(&conn, "a", 500).unwrap();
        conn.execute(
            "UPDATE chats SET decay_metadata = '{\"last_decay_run\": 400}' WHERE id = 'a'",
            [],
        )
        .unwrap();

        let mut edited = sample_item("a", 9_999);
        edited.title = "Edited".into();
        edited.recall_count = 0;
        upsert_items_sync(&conn, &[edited], TEST_DIM, 1_000).unwrap();

        let item = get_item_sync(&conn, "a").unwrap().unwrap();
        assert_eq!(item.title, "Edited");
        assert_eq!(item.created_at, 100, "created_at preserved on update");
        assert_eq!(item.updated_at, 1_000);
        assert_eq!(item.recall_count, 1, "recall_count preserved on update");
        assert_eq!(item.last_accessed_at, 500);
        assert_eq!(
            item.decay_metadata.unwrap_or_default().last_decay_run,
            Some(400)
        );
    }

    #[test]
    fn test_upsert_rejects_bad_embedding_dimension() {
        let conn = setup_test_connection();
        let mut item = sample_item("a", 1);
        item.embedding = Some(vec![1.0, 2.0]);
        let err = upsert_items_sync(&conn, &[item], TEST_DIM, 1).unwrap_err();
        assert!(matches!(err, ChronicleError::Validation { .. }));
        assert!(get_item_sync(&conn, "a").unwrap().is_none(), "batch rejected");
    }

    #[test]
    fn test_upsert_maintains_vector_mirror() {
        let conn = setup_test_connection();
        let mut item = sample_item("a", 1);
        item.embedding = Some(axis_embedding(0));
        upsert_items_sync(&conn, std::slice::from_ref(&item), TEST_DIM, 1).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM vec_chats", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);

        item.embedding = None;
        upsert_items_sync(&conn, &[item], TEST_DIM, 2).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM vec_chats", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0, "clearing the embedding clears the mirror");
    }

    #[test]
    fn test_boost_salience_rehearsal() {
        let conn = setup_test_connection();
        let mut item = sample_item("a", 1);
        item.salience = 0.20;
        upsert_items_sync(&conn, &[item], TEST_DIM, 1).unwrap();

        boost_salience_sync(&conn, "a", 777).unwrap();
        let item = get_item_sync(&conn, "a").unwrap().unwrap();
        assert!((item.salience - 0.25).abs() < 1e-9);
        assert_eq!(item.recall_count, 1);
        assert_eq!(item.last_accessed_at, 777);
    }

    #[test]
    fn test_boost_salience_caps_at_one() {
        let conn = setup_test_connection();
        let mut item = sample_item("a", 1);
        item.salience = 0.98;
        upsert_items_sync(&conn, &[item], TEST_DIM, 1).unwrap();

        boost_salience_sync(&conn, "a", 2).unwrap();
        let item = get_item_sync(&conn, "a").unwrap().unwrap();
        assert_eq!(item.salience, 1.0);
    }

    #[test]
    fn test_boost_salience_missing_item() {
        let conn = setup_test_connection();
        let err = boost_salience_sync(&conn, "ghost", 1).unwrap_err();
        assert!(matches!(err, ChronicleError::NotFound(_)));
    }

    #[test]
    fn test_track_view_skips_salience() {
        let conn = setup_test_connection();
        upsert_items_sync(&conn, &[sample_item("a", 1)], TEST_DIM, 1).unwrap();

        track_view_sync(&conn, "a", 55).unwrap();
        let item = get_item_sync(&conn, "a").unwrap().unwrap();
        assert_eq!(item.salience, 0.4, "no salience bump on plain views");
        assert_eq!(item.recall_count, 1);
        assert_eq!(item.last_accessed_at, 55);
    }

    #[test]
    fn test_delete_item_is_noop_when_absent() {
        let conn = setup_test_connection();
        assert!(!delete_item_sync(&conn, "ghost").unwrap());
    }

    #[test]
    fn test_update_memory_type_reclamps() {
        let conn = setup_test_connection();
        let mut item = sample_item("a", 1);
        item.salience = 0.12;
        item.memory_type = Some(MemoryType::Episodic);
        upsert_items_sync(&conn, &[item], TEST_DIM, 1).unwrap();

        // Procedural floor is 0.20; reclassifying lifts salience to it
        update_memory_type_sync(&conn, "a", MemoryType::Procedural).unwrap();
        let item = get_item_sync(&conn, "a").unwrap().unwrap();
        assert_eq!(item.memory_type, Some(MemoryType::Procedural));
        assert_eq!(item.salience, 0.20);
    }

    #[test]
    fn test_keyword_search_matches_title_summary_tags() {
        let conn = setup_test_connection();
        let mut by_title = sample_item("t", 3);
        by_title.title = "Weekend Plans".into();
        let mut by_summary = sample_item("s", 2);
        by_summary.summary = "planning the weekend".into();
        let mut by_tag = sample_item("g", 1);
        by_tag.tags = vec!["weekend".into()];
        let mut miss = sample_item("m", 4);
        miss.title = "Unrelated".into();
        miss.summary = String::new();
        miss.tags = vec![];
        upsert_items_sync(&conn, &[by_title, by_summary, by_tag, miss], TEST_DIM, 5).unwrap();

        let results = keyword_search_sync(&conn, "WEEK", &SearchFilters::default()).unwrap();
        let ids: Vec<&str> = results.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["t", "s", "g"], "newest first, all three fields");
    }

    #[test]
    fn test_keyword_search_escapes_wildcards() {
        let conn = setup_test_connection();
        let mut literal = sample_item("a", 1);
        literal.title = "100% done".into();
        upsert_items_sync(&conn, &[literal], TEST_DIM, 1).unwrap();

        let results = keyword_search_sync(&conn, "0% d", &SearchFilters::default()).unwrap();
        assert_eq!(results.len(), 1);
        let results = keyword_search_sync(&conn, "0%x", &SearchFilters::default()).unwrap();
        assert!(results.is_empty(), "% must not act as a wildcard");
    }

    #[test]
    fn test_list_tags_sorted_distinct() {
        let conn = setup_test_connection();
        let mut a = sample_item("a", 1);
        a.tags = vec!["zeta".into(), "alpha".into()];
        let mut b = sample_item("b", 2);
        b.tags = vec!["alpha".into(), "mid".into()];
        upsert_items_sync(&conn, &[a, b], TEST_DIM, 3).unwrap();

        let tags = list_tags_sync(&conn).unwrap();
        assert_eq!(tags, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_list_recent_limits() {
        let conn = setup_test_connection();
        for i in 0..5 {
            upsert_items_sync(
                &conn,
                &[sample_item(&format!("i{i}"), i as i64)],
                TEST_DIM,
                10,
            )
            .unwrap();
        }
        let recent = list_recent_sync(&conn, 2).unwrap();
        let ids: Vec<&str> = recent.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["i4", "i3"]);
    }
}
