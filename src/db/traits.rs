// Vector cache trait: backend-agnostic async interface for embedding memoization.
//
// Implementors: SqliteVectorCache (wraps rusqlite), MemoryVectorCache (in-process).
// Methods are async so a blocking store behind a Mutex and a natively async
// store fit the same interface.
//
// Every lookup is scoped by model id: a vector from one embedding model is
// meaningless next to a vector from another.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait VectorCache: Send + Sync {
    /// Look up vectors for the given item ids under `model_id`.
    ///
    /// Only hits are present in the returned map. Entries that fail to decode
    /// are logged and omitted, so the caller re-embeds them.
    async fn get_many(&self, ids: &[String], model_id: &str) -> Result<HashMap<String, Vec<f64>>>;

    /// Store (or overwrite) vectors under `model_id`.
    async fn put_many(&self, vectors: &HashMap<String, Vec<f64>>, model_id: &str) -> Result<()>;
}
