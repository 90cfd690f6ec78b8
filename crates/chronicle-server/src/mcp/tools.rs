// mcp/tools.rs
// Tool bodies: search_archive, semantic_search, list_recent_chats, list_tags

use chronicle_types::{Item, MemoryType};
use serde_json::json;

use super::ChronicleServer;
use crate::db::{self, SearchFilters, distance_to_score};

/// Default result count for semantic search.
const SEMANTIC_SEARCH_LIMIT: usize = 5;
/// Default result count for recency listings.
const RECENT_CHATS_LIMIT: i64 = 5;

/// Parse an optional memory_type argument, naming the field on failure.
fn parse_memory_type(raw: Option<&str>) -> Result<Option<MemoryType>, String> {
    match raw {
        None => Ok(None),
        Some(s) => MemoryType::parse(s).map(Some).ok_or_else(|| {
            format!(
                "memory_type: unknown value '{s}' (expected episodic/semantic/procedural/emotional/default)"
            )
        }),
    }
}

/// Validate an optional min_salience argument.
fn parse_min_salience(raw: Option<f64>) -> Result<Option<f64>, String> {
    match raw {
        Some(v) if !(0.0..=1.0).contains(&v) => {
            Err(format!("min_salience: {v} is outside [0.0, 1.0]"))
        }
        other => Ok(other),
    }
}

/// Compact JSON projection of an item for search results.
fn item_summary_json(item: &Item) -> serde_json::Value {
    json!({
        "id": item.id,
        "title": item.title,
        "summary": item.summary,
        "memory_type": item.memory_type.map(|t| t.as_str()),
        "salience": item.salience,
    })
}

/// Keyword search over the archive, capped at 10 results.
pub async fn search_archive(
    server: &ChronicleServer,
    query: String,
    memory_type: Option<String>,
    min_salience: Option<f64>,
) -> Result<String, String> {
    let filters = SearchFilters {
        memory_type: parse_memory_type(memory_type.as_deref())?,
        min_salience: parse_min_salience(min_salience)?,
        exclude_id: None,
    };

    let items = server
        .pool
        .run(move |conn| db::keyword_search_sync(conn, &query, &filters))
        .await
        .map_err(|e| e.to_string())?;

    let results: Vec<serde_json::Value> = items.iter().map(item_summary_json).collect();
    serde_json::to_string(&results).map_err(|e| e.to_string())
}

/// Nearest neighbours of a target chat's embedding, scored as
/// `1 - cosine_distance`, target excluded.
pub async fn semantic_search(
    server: &ChronicleServer,
    target_id: String,
    limit: Option<usize>,
    memory_type: Option<String>,
    min_salience: Option<f64>,
) -> Result<String, String> {
    let limit = limit.unwrap_or(SEMANTIC_SEARCH_LIMIT).max(1);
    let filters = SearchFilters {
        memory_type: parse_memory_type(memory_type.as_deref())?,
        min_salience: parse_min_salience(min_salience)?,
        exclude_id: Some(target_id.clone()),
    };

    let lookup_id = target_id.clone();
    let embedding = server
        .pool
        .run(move |conn| db::get_item_embedding_sync(conn, &lookup_id))
        .await
        .map_err(|e| e.to_string())?;

    let Some(query) = embedding else {
        return Err("Target chat not found or has no vector data.".to_string());
    };

    // Reading the target's vector counts as rehearsal
    if let Err(e) = server.scheduler.on_access(&target_id).await {
        tracing::debug!("access tracking failed for {}: {}", target_id, e);
    }

    let dim = server.embedding_dim();
    let neighbours = server
        .pool
        .run(move |conn| db::vector_knn_sync(conn, &query, limit, &filters, dim))
        .await
        .map_err(|e| e.to_string())?;

    let results: Vec<serde_json::Value> = neighbours
        .iter()
        .map(|(item, distance)| {
            let mut value = item_summary_json(item);
            value["score"] = json!(distance_to_score(*distance));
            value
        })
        .collect();
    serde_json::to_string(&results).map_err(|e| e.to_string())
}

/// The most recent items, newest first.
pub async fn list_recent_chats(
    server: &ChronicleServer,
    count: Option<i64>,
) -> Result<String, String> {
    let count = count.unwrap_or(RECENT_CHATS_LIMIT).max(1) as usize;

    let items = server
        .pool
        .run(move |conn| db::list_recent_sync(conn, count))
        .await
        .map_err(|e| e.to_string())?;

    let results: Vec<serde_json::Value> = items
        .iter()
        .map(|item| {
            json!({
                "id": item.id,
                "title": item.title,
                "summary": item.summary,
                "source": item.source,
                "created_at": item.created_at,
            })
        })
        .collect();
    serde_json::to_string(&results).map_err(|e| e.to_string())
}

/// All distinct tags, sorted, comma-joined.
pub async fn list_tags(server: &ChronicleServer) -> Result<String, String> {
    let tags = server
        .pool
        .run(db::list_tags_sync)
        .await
        .map_err(|e| e.to_string())?;
    Ok(tags.join(", "))
}
