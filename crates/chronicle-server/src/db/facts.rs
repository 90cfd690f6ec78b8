// db/facts.rs
// Bitemporal fact storage: supersession, live reads

use chronicle_types::{ExtractedFact, Fact};
use rusqlite::{Connection, OptionalExtension, params};

use super::types::{FACT_COLUMNS, parse_fact_row};
use crate::error::{ChronicleError, Result};

/// Initial salience for freshly extracted facts.
const NEW_FACT_SALIENCE: f64 = 0.5;

/// Persist extracted facts for a chat.
///
/// For each triple: any live fact with the same `(subject, predicate)` but a
/// different identity is closed by setting `valid_to = now`; the new fact is
/// inserted live. An identical live triple on the same chat is a duplicate
/// and is silently ignored. Returns the number of facts inserted.
pub fn save_facts_sync(
    conn: &Connection,
    chat_id: &str,
    extracted: &[ExtractedFact],
    now: i64,
) -> Result<usize> {
    let chat_exists: bool = conn
        .query_row("SELECT 1 FROM chats WHERE id = ?1", [chat_id], |_| Ok(true))
        .optional()?
        .unwrap_or(false);
    if !chat_exists {
        return Err(ChronicleError::NotFound(format!("chat {chat_id}")));
    }

    let tx = conn.unchecked_transaction()?;
    let mut inserted = 0;

    for fact in extracted {
        let duplicate: bool = tx
            .query_row(
                "SELECT 1 FROM facts
                 WHERE chat_id = ?1 AND subject = ?2 AND predicate = ?3
                   AND object = ?4 AND valid_to IS NULL",
                params![chat_id, fact.subject, fact.predicate, fact.object],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if duplicate {
            continue;
        }

        // Temporal supersession: at most one live fact per (subject, predicate)
        tx.execute(
            "UPDATE facts SET valid_to = ?3
             WHERE subject = ?1 AND predicate = ?2 AND valid_to IS NULL",
            params![fact.subject, fact.predicate, now],
        )?;

        tx.execute(
            "INSERT INTO facts (id, chat_id, subject, predicate, object, confidence,
             salience, valid_from, created_at, recall_count, last_accessed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, 0, ?8)",
            params![
                uuid::Uuid::new_v4().to_string(),
                chat_id,
                fact.subject,
                fact.predicate,
                fact.object,
                fact.confidence.clamp(0.0, 1.0),
                NEW_FACT_SALIENCE,
                now,
            ],
        )?;
        inserted += 1;
    }

    tx.commit()?;
    Ok(inserted)
}

/// Live facts for a chat, strongest first.
pub fn load_facts_sync(conn: &Connection, chat_id: &str) -> rusqlite::Result<Vec<Fact>> {
    let sql = format!(
        "SELECT {FACT_COLUMNS} FROM facts
         WHERE chat_id = ?1 AND valid_to IS NULL
         ORDER BY salience DESC, created_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([chat_id], parse_fact_row)?;
    rows.collect()
}

/// Every fact row for a chat, including superseded history.
pub fn load_fact_history_sync(conn: &Connection, chat_id: &str) -> rusqlite::Result<Vec<Fact>> {
    let sql = format!(
        "SELECT {FACT_COLUMNS} FROM facts WHERE chat_id = ?1 ORDER BY created_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([chat_id], parse_fact_row)?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{insert_chat, setup_test_connection};

    fn extracted(subject: &str, predicate: &str, object: &str, confidence: f64) -> ExtractedFact {
        ExtractedFact {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            confidence,
        }
    }

    #[test]
    fn test_save_facts_requires_chat() {
        let conn = setup_test_connection();
        let err = save_facts_sync(&conn, "ghost", &[extracted("a", "b", "c", 1.0)], 1)
            .unwrap_err();
        assert!(matches!(err, ChronicleError::NotFound(_)));
    }

    #[test]
    fn test_fact_supersession() {
        let conn = setup_test_connection();
        insert_chat(&conn, "c1", 1);

        save_facts_sync(
            &conn,
            "c1",
            &[extracted("Alice", "lives_in", "Paris", 0.9)],
            100,
        )
        .unwrap();
        save_facts_sync(
            &conn,
            "c1",
            &[extracted("Alice", "lives_in", "Berlin", 0.95)],
            200,
        )
        .unwrap();

        let live = load_facts_sync(&conn, "c1").unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].object, "Berlin");
        assert_eq!(live[0].salience, 0.5);

        // The Paris row persists, closed rather than deleted
        let all = load_fact_history_sync(&conn, "c1").unwrap();
        assert_eq!(all.len(), 2);
        let paris = all.iter().find(|f| f.object == "Paris").unwrap();
        assert_eq!(paris.valid_to, Some(200));
    }

    #[test]
    fn test_supersession_crosses_chats() {
        let conn = setup_test_connection();
        insert_chat(&conn, "c1", 1);
        insert_chat(&conn, "c2", 1);

        save_facts_sync(&conn, "c1", &[extracted("Alice", "works_at", "Acme", 0.8)], 100)
            .unwrap();
        save_facts_sync(&conn, "c2", &[extracted("Alice", "works_at", "Initech", 0.9)], 200)
            .unwrap();

        // At most one live fact per (subject, predicate), across all chats
        let live_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM facts
                 WHERE subject = 'Alice' AND predicate = 'works_at' AND valid_to IS NULL",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(live_count, 1);
        assert!(load_facts_sync(&conn, "c1").unwrap().is_empty());
        assert_eq!(load_facts_sync(&conn, "c2").unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_inserts_ignored() {
        let conn = setup_test_connection();
        insert_chat(&conn, "c1", 1);

        let facts = [extracted("Bob", "likes", "coffee", 0.7)];
        assert_eq!(save_facts_sync(&conn, "c1", &facts, 100).unwrap(), 1);
        assert_eq!(save_facts_sync(&conn, "c1", &facts, 200).unwrap(), 0);

        let all = load_fact_history_sync(&conn, "c1").unwrap();
        assert_eq!(all.len(), 1, "re-extraction must not duplicate");
        assert!(all[0].valid_to.is_none(), "original stays live");
    }

    #[test]
    fn test_load_facts_ordering() {
        let conn = setup_test_connection();
        insert_chat(&conn, "c1", 1);
        save_facts_sync(
            &conn,
            "c1",
            &[
                extracted("a", "p1", "x", 1.0),
                extracted("b", "p2", "y", 1.0),
            ],
            100,
        )
        .unwrap();
        conn.execute("UPDATE facts SET salience = 0.9 WHERE subject = 'b'", [])
            .unwrap();

        let live = load_facts_sync(&conn, "c1").unwrap();
        assert_eq!(live[0].subject, "b", "higher salience first");
    }

    #[test]
    fn test_facts_cascade_on_chat_delete() {
        let conn = setup_test_connection();
        insert_chat(&conn, "c1", 1);
        save_facts_sync(&conn, "c1", &[extracted("a", "p", "x", 1.0)], 100).unwrap();

        crate::db::items::delete_item_sync(&conn, "c1").unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM facts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
