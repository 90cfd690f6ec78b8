// db/types.rs
// Row parsing helpers shared by the db modules

use chronicle_types::{DecayMetadata, Fact, Item, ItemKind, MemoryType};
use rusqlite::Row;

use super::vector::bytes_to_embedding;

/// Column list matching `parse_item_row`. Keep in sync.
pub const ITEM_COLUMNS: &str = "id, kind, title, summary, content, tags, source, file_name, \
     assets, created_at, updated_at, embedding, memory_type, salience, \
     recall_count, last_accessed_at, decay_metadata";

/// Column list matching `parse_fact_row`. Keep in sync.
pub const FACT_COLUMNS: &str = "id, chat_id, subject, predicate, object, confidence, salience, \
     valid_from, valid_to, created_at, recall_count, last_accessed_at, decay_metadata";

/// Decode a JSON string-array column, tolerating legacy malformed rows.
fn parse_string_array(raw: Option<String>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

/// Decode the decay_metadata JSON column.
pub fn parse_decay_metadata(raw: Option<String>) -> Option<DecayMetadata> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}

/// Parse an item from a row selected with [`ITEM_COLUMNS`].
pub fn parse_item_row(row: &Row) -> rusqlite::Result<Item> {
    let kind: String = row.get(1)?;
    let embedding: Option<Vec<u8>> = row.get(11)?;
    let memory_type: Option<String> = row.get(12)?;

    Ok(Item {
        id: row.get(0)?,
        kind: ItemKind::parse(&kind).unwrap_or(ItemKind::Chat),
        title: row.get(2)?,
        summary: row.get(3)?,
        content: row.get(4)?,
        tags: parse_string_array(row.get(5)?),
        source: row.get(6)?,
        file_name: row.get(7)?,
        assets: parse_string_array(row.get(8)?),
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        embedding: embedding.map(|b| bytes_to_embedding(&b)),
        memory_type: memory_type.as_deref().and_then(MemoryType::parse),
        salience: row.get(13)?,
        recall_count: row.get(14)?,
        last_accessed_at: row.get(15)?,
        decay_metadata: parse_decay_metadata(row.get(16)?),
    })
}

/// Parse a fact from a row selected with [`FACT_COLUMNS`].
pub fn parse_fact_row(row: &Row) -> rusqlite::Result<Fact> {
    Ok(Fact {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        subject: row.get(2)?,
        predicate: row.get(3)?,
        object: row.get(4)?,
        confidence: row.get(5)?,
        salience: row.get(6)?,
        valid_from: row.get(7)?,
        valid_to: row.get(8)?,
        created_at: row.get(9)?,
        recall_count: row.get(10)?,
        last_accessed_at: row.get(11)?,
        decay_metadata: parse_decay_metadata(row.get(12)?),
    })
}

/// Filters recognised by the search paths.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub memory_type: Option<MemoryType>,
    pub min_salience: Option<f64>,
    pub exclude_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_string_array_tolerates_garbage() {
        assert_eq!(parse_string_array(None), Vec::<String>::new());
        assert_eq!(
            parse_string_array(Some("not json".into())),
            Vec::<String>::new()
        );
        assert_eq!(
            parse_string_array(Some(r#"["a","b"]"#.into())),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn test_parse_decay_metadata() {
        let meta = parse_decay_metadata(Some(r#"{"last_decay_run": 42}"#.into())).unwrap();
        assert_eq!(meta.last_decay_run, Some(42));
        assert!(parse_decay_metadata(Some("{broken".into())).is_none());
    }
}
