// Topic anchors: one unit-length centroid per configured topic.
//
// Anchors depend only on (topics, model), so they are computed once and kept
// in a process-wide AnchorCache keyed by a signature of both. A precomputed
// file, when it validated against the same configuration, replaces the
// provider call entirely.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::embeddings::vector::{centroid, normalize};
use crate::embeddings::{EmbedError, EmbeddingProvider};

use super::definition::TopicDefinition;
use super::precomputed::{self, PrecomputedAnchors};

/// A topic's identity plus its centroid embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicAnchor {
    pub name: String,
    pub keywords: Vec<String>,
    /// Unit-length mean of the topic's query embeddings.
    pub centroid: Vec<f64>,
}

/// Computed anchors keyed by configuration signature.
///
/// Shared across pipeline instances through an `Arc`. The lock is never held
/// while embedding, so two concurrent first calls may both compute; the
/// results are identical and the later insert wins.
#[derive(Debug, Default)]
pub struct AnchorCache {
    entries: Mutex<HashMap<String, Arc<Vec<TopicAnchor>>>>,
}

impl AnchorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, signature: &str) -> Option<Arc<Vec<TopicAnchor>>> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(signature).cloned())
    }

    pub fn insert(&self, signature: String, anchors: Vec<TopicAnchor>) -> Arc<Vec<TopicAnchor>> {
        let anchors = Arc::new(anchors);
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(signature, Arc::clone(&anchors));
        }
        anchors
    }

    /// Drop one configuration's anchors. Returns whether anything was removed.
    pub fn invalidate(&self, signature: &str) -> bool {
        self.entries
            .lock()
            .map(|mut entries| entries.remove(signature).is_some())
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Hex SHA-256 over the model id and the full topic list.
pub fn signature(topics: &[TopicDefinition], model_id: &str) -> String {
    let payload = serde_json::json!({ "model": model_id, "topics": topics });
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// The configured topics and everything needed to turn them into anchors.
pub struct AnchorSet {
    topics: Vec<TopicDefinition>,
    cache: Arc<AnchorCache>,
    precomputed: Option<PrecomputedAnchors>,
}

impl AnchorSet {
    pub fn new(topics: Vec<TopicDefinition>, cache: Arc<AnchorCache>) -> Self {
        Self {
            topics,
            cache,
            precomputed: None,
        }
    }

    /// Attach a precomputed anchors file. It is validated here against the
    /// topics and `model_id`; a file that does not match is ignored.
    pub fn with_precomputed_file(mut self, path: &Path, model_id: &str, threshold: f64) -> Self {
        self.precomputed = precomputed::load_validated(path, &self.query_strings(), model_id, threshold);
        self
    }

    pub fn topics(&self) -> &[TopicDefinition] {
        &self.topics
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn uses_precomputed(&self) -> bool {
        self.precomputed.is_some()
    }

    /// Every query string, in topic order.
    pub fn query_strings(&self) -> Vec<String> {
        self.topics.iter().flat_map(|t| t.query_strings()).collect()
    }

    pub fn signature(&self, model_id: &str) -> String {
        signature(&self.topics, model_id)
    }

    /// Anchors for the provider's model, computing them on first use.
    pub async fn anchors(
        &self,
        provider: &dyn EmbeddingProvider,
    ) -> Result<Arc<Vec<TopicAnchor>>, EmbedError> {
        let model_id = provider.model_id();
        let sig = self.signature(model_id);
        if let Some(anchors) = self.cache.get(&sig) {
            debug!(topics = anchors.len(), "Anchor cache hit");
            return Ok(anchors);
        }

        let vectors = match self.precomputed_vectors(model_id) {
            Some(vectors) => vectors,
            None => self.embed_queries(provider).await?,
        };

        let anchors = self.build_anchors(&vectors)?;
        info!(topics = anchors.len(), model = model_id, "Computed topic anchors");
        Ok(self.cache.insert(sig, anchors))
    }

    /// Forget cached anchors for this configuration and compute them again.
    pub async fn rebuild(
        &self,
        provider: &dyn EmbeddingProvider,
    ) -> Result<Arc<Vec<TopicAnchor>>, EmbedError> {
        self.cache.invalidate(&self.signature(provider.model_id()));
        self.anchors(provider).await
    }

    /// Embed every query string live, unit-normalized, in topic order.
    pub async fn embed_queries(
        &self,
        provider: &dyn EmbeddingProvider,
    ) -> Result<Vec<Vec<f64>>, EmbedError> {
        let queries = self.query_strings();
        let vectors = provider.embed(&queries).await?;
        Ok(vectors.iter().map(|v| normalize(v)).collect())
    }

    fn precomputed_vectors(&self, model_id: &str) -> Option<Vec<Vec<f64>>> {
        let file = self.precomputed.as_ref()?;
        if !file.model.is_empty() && file.model != model_id {
            warn!(
                file_model = %file.model,
                provider_model = model_id,
                "Precomputed anchors built for another model; embedding live"
            );
            return None;
        }
        debug!("Using precomputed anchor embeddings");
        Some(file.embeddings.iter().map(|v| normalize(v)).collect())
    }

    fn build_anchors(&self, vectors: &[Vec<f64>]) -> Result<Vec<TopicAnchor>, EmbedError> {
        let expected: usize = self.topics.iter().map(|t| t.query_strings().len()).sum();
        if vectors.len() != expected {
            return Err(EmbedError::CountMismatch {
                expected,
                actual: vectors.len(),
            });
        }

        let mut offset = 0;
        let mut anchors = Vec::with_capacity(self.topics.len());
        for topic in &self.topics {
            let n = topic.query_strings().len();
            let slice = &vectors[offset..offset + n];
            offset += n;
            anchors.push(TopicAnchor {
                name: topic.name.clone(),
                keywords: topic.keywords.clone(),
                centroid: centroid(slice),
            });
        }
        Ok(anchors)
    }
}
