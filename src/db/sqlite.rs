// SqliteVectorCache: rusqlite backend implementing the VectorCache trait.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is !Sync.
// Trait methods lock the mutex, do synchronous rusqlite work, and return.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::blob::{decode_vector, encode_vector};
use super::traits::VectorCache;

pub struct SqliteVectorCache {
    conn: Mutex<Connection>,
}

impl SqliteVectorCache {
    /// Wrap an already-opened rusqlite Connection (tables must exist).
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Count the number of tables (for `topicsift init` confirmation).
    pub async fn table_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::schema::table_count(&conn)
    }

    /// Stored vector counts per model.
    pub async fn count_by_model(&self) -> Result<Vec<(String, i64)>> {
        let conn = self.conn.lock().await;
        super::queries::count_by_model(&conn)
    }
}

#[async_trait]
impl VectorCache for SqliteVectorCache {
    async fn get_many(&self, ids: &[String], model_id: &str) -> Result<HashMap<String, Vec<f64>>> {
        let blobs = {
            let conn = self.conn.lock().await;
            super::queries::get_embeddings(&conn, ids, model_id)?
        };

        let mut hits = HashMap::with_capacity(blobs.len());
        for (id, blob) in blobs {
            match decode_vector(&blob) {
                Ok(vector) => {
                    hits.insert(id, vector);
                }
                Err(e) => {
                    warn!(id = %id, model = model_id, error = %e, "Cached vector unreadable, will re-embed");
                }
            }
        }

        debug!(requested = ids.len(), hits = hits.len(), "Vector cache lookup");
        Ok(hits)
    }

    async fn put_many(&self, vectors: &HashMap<String, Vec<f64>>, model_id: &str) -> Result<()> {
        let blobs: HashMap<String, Vec<u8>> = vectors
            .iter()
            .map(|(id, v)| (id.clone(), encode_vector(v)))
            .collect();
        let conn = self.conn.lock().await;
        super::queries::upsert_embeddings(&conn, &blobs, model_id)
    }
}
