// Embedding provider trait: the swap-ready abstraction.
//
// Every backend (remote batch API, local ONNX model, test fakes) sits behind
// this one interface. Which adapter gets constructed is decided in main.rs
// from configuration; the filter pipeline only ever sees `dyn EmbeddingProvider`.

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// Default number of texts sent per provider request.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Errors raised at the provider boundary.
///
/// These are configuration-class failures (unreachable backend, bad
/// credentials, missing model files). They are never swallowed here; the
/// filter pipeline decides how to degrade.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding backend returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("embedding backend misconfigured: {0}")]
    Config(String),

    #[error("local embedding model failed: {0}")]
    Model(String),

    #[error("embedding backend returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("vector dimension {actual} does not match anchor dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Trait for turning text into dense vectors.
///
/// Implementors provide `embed_batch` (one backend request). The provided
/// `embed` splits arbitrary input into `batch_size()` chunks and stitches the
/// results back together in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Identifier of the embedding model. Part of every cache key, since
    /// vectors from different models are not comparable.
    fn model_id(&self) -> &str;

    /// Maximum number of texts per backend request.
    fn batch_size(&self) -> usize {
        DEFAULT_BATCH_SIZE
    }

    /// Embed a single batch with one backend request.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbedError>;

    /// Embed any number of texts, one vector per input, order preserved.
    /// Empty input returns immediately without touching the backend.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batch_size = self.batch_size().max(1);
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size) {
            let embedded = self.embed_batch(batch).await?;
            if embedded.len() != batch.len() {
                return Err(EmbedError::CountMismatch {
                    expected: batch.len(),
                    actual: embedded.len(),
                });
            }
            vectors.extend(embedded);
        }

        debug!(
            count = vectors.len(),
            model = self.model_id(),
            "Embedded texts"
        );
        Ok(vectors)
    }
}
