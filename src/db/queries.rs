// Database queries: CRUD for the embeddings table.
//
// Every SQL statement lives here. The functions deal in raw blobs; decoding
// (and the miss-on-corruption policy) belongs to the VectorCache impl.

use std::collections::HashMap;

use anyhow::Result;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

/// SQLite's default bound-parameter ceiling is 999 on older builds; stay
/// well under it (one slot is taken by the model id).
const MAX_IDS_PER_QUERY: usize = 500;

/// Batch-fetch stored vector blobs for `ids` under `model_id`.
pub fn get_embeddings(
    conn: &Connection,
    ids: &[String],
    model_id: &str,
) -> Result<HashMap<String, Vec<u8>>> {
    let mut found = HashMap::new();

    for chunk in ids.chunks(MAX_IDS_PER_QUERY) {
        let placeholders = (0..chunk.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT item_id, vector FROM embeddings
             WHERE model_id = ?1 AND item_id IN ({placeholders})"
        );

        let mut stmt = conn.prepare(&sql)?;
        let bound = std::iter::once(model_id).chain(chunk.iter().map(String::as_str));
        let rows = stmt.query_map(params_from_iter(bound), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        for row in rows {
            let (id, blob) = row?;
            found.insert(id, blob);
        }
    }

    Ok(found)
}

/// Insert or overwrite vector blobs under `model_id` in one transaction.
/// The original `created_at` is kept on overwrite.
pub fn upsert_embeddings(
    conn: &Connection,
    blobs: &HashMap<String, Vec<u8>>,
    model_id: &str,
) -> Result<()> {
    if blobs.is_empty() {
        return Ok(());
    }

    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO embeddings (item_id, model_id, vector)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(item_id, model_id) DO UPDATE SET
                vector = ?3,
                updated_at = datetime('now')",
        )?;
        for (id, blob) in blobs {
            stmt.execute(params![id, model_id, blob])?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Fetch `created_at` for one entry (diagnostics and tests).
pub fn get_created_at(conn: &Connection, id: &str, model_id: &str) -> Result<Option<String>> {
    let result = conn
        .query_row(
            "SELECT created_at FROM embeddings WHERE item_id = ?1 AND model_id = ?2",
            params![id, model_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(result)
}

/// Count stored vectors per model, most populated first.
pub fn count_by_model(conn: &Connection) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT model_id, COUNT(*) FROM embeddings GROUP BY model_id ORDER BY COUNT(*) DESC, model_id",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

    let mut counts = Vec::new();
    for row in rows {
        counts.push(row?);
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::create_tables;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        conn
    }

    fn blobs(entries: &[(&str, &[u8])]) -> HashMap<String, Vec<u8>> {
        entries
            .iter()
            .map(|(id, b)| (id.to_string(), b.to_vec()))
            .collect()
    }

    #[test]
    fn test_upsert_and_get() {
        let conn = test_conn();
        upsert_embeddings(&conn, &blobs(&[("u1", b"[0.1]"), ("u2", b"[0.2]")]), "m").unwrap();

        let ids = vec!["u1".to_string(), "u2".to_string(), "missing".to_string()];
        let found = get_embeddings(&conn, &ids, "m").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["u1"], b"[0.1]".to_vec());
        assert!(!found.contains_key("missing"));
    }

    #[test]
    fn test_upsert_overwrites_vector() {
        let conn = test_conn();
        upsert_embeddings(&conn, &blobs(&[("u1", b"[0.1]")]), "m").unwrap();
        let created = get_created_at(&conn, "u1", "m").unwrap();
        upsert_embeddings(&conn, &blobs(&[("u1", b"[0.9]")]), "m").unwrap();

        let found = get_embeddings(&conn, &["u1".to_string()], "m").unwrap();
        assert_eq!(found["u1"], b"[0.9]".to_vec());
        assert_eq!(get_created_at(&conn, "u1", "m").unwrap(), created);
    }

    #[test]
    fn test_get_is_scoped_by_model() {
        let conn = test_conn();
        upsert_embeddings(&conn, &blobs(&[("u1", b"[0.1]")]), "model-a").unwrap();
        let found = get_embeddings(&conn, &["u1".to_string()], "model-b").unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_get_many_ids_spans_chunks() {
        let conn = test_conn();
        let many: HashMap<String, Vec<u8>> = (0..1200)
            .map(|i| (format!("u{i}"), b"[1.0]".to_vec()))
            .collect();
        upsert_embeddings(&conn, &many, "m").unwrap();

        let ids: Vec<String> = (0..1200).map(|i| format!("u{i}")).collect();
        let found = get_embeddings(&conn, &ids, "m").unwrap();
        assert_eq!(found.len(), 1200);
    }

    #[test]
    fn test_count_by_model() {
        let conn = test_conn();
        upsert_embeddings(&conn, &blobs(&[("u1", b"[1]"), ("u2", b"[1]")]), "a").unwrap();
        upsert_embeddings(&conn, &blobs(&[("u1", b"[1]")]), "b").unwrap();
        assert_eq!(
            count_by_model(&conn).unwrap(),
            vec![("a".to_string(), 2), ("b".to_string(), 1)]
        );
    }

    #[test]
    fn test_empty_ids() {
        let conn = test_conn();
        assert!(get_embeddings(&conn, &[], "m").unwrap().is_empty());
    }
}
