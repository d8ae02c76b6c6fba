// MemoryVectorCache: process-local VectorCache.
//
// Stores the same encoded blobs the SQLite backend does, so decode behavior
// is identical and tests can plant corrupt entries.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use super::blob::{decode_vector, encode_vector};
use super::traits::VectorCache;

#[derive(Default)]
pub struct MemoryVectorCache {
    entries: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryVectorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw bytes for an entry, bypassing the encoder.
    pub fn put_raw(&self, id: &str, model_id: &str, bytes: Vec<u8>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert((id.to_string(), model_id.to_string()), bytes);
        }
    }

    /// Number of stored entries across all models.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorCache for MemoryVectorCache {
    async fn get_many(&self, ids: &[String], model_id: &str) -> Result<HashMap<String, Vec<f64>>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Vector cache lock poisoned: {e}"))?;

        let mut hits = HashMap::new();
        for id in ids {
            let Some(bytes) = entries.get(&(id.clone(), model_id.to_string())) else {
                continue;
            };
            match decode_vector(bytes) {
                Ok(vector) => {
                    hits.insert(id.clone(), vector);
                }
                Err(e) => warn!(id = %id, error = %e, "Discarding undecodable cached vector"),
            }
        }
        Ok(hits)
    }

    async fn put_many(&self, vectors: &HashMap<String, Vec<f64>>, model_id: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Vector cache lock poisoned: {e}"))?;

        for (id, vector) in vectors {
            entries.insert((id.clone(), model_id.to_string()), encode_vector(vector));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip_scoped_by_model() {
        let cache = MemoryVectorCache::new();
        let mut vectors = HashMap::new();
        vectors.insert("https://a".to_string(), vec![0.6, 0.8]);
        cache.put_many(&vectors, "model-a").await.unwrap();

        let ids = vec!["https://a".to_string(), "https://b".to_string()];
        let hits = cache.get_many(&ids, "model-a").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits["https://a"], vec![0.6, 0.8]);

        let other_model = cache.get_many(&ids, "model-b").await.unwrap();
        assert!(other_model.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let cache = MemoryVectorCache::new();
        cache.put_raw("https://a", "m", b"{broken".to_vec());
        let hits = cache
            .get_many(&["https://a".to_string()], "m")
            .await
            .unwrap();
        assert!(hits.is_empty());
    }
}
