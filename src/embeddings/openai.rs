// OpenAI-compatible embeddings API implementation.
//
// Sends batches to `POST {base_url}/embeddings` with a bearer token. Works
// against api.openai.com and any server that speaks the same wire format
// (Azure-style proxies, local gateways). Wrapped behind EmbeddingProvider so
// the pipeline never knows which backend it is talking to.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::traits::{EmbedError, EmbeddingProvider};
use super::vector::normalize;

/// Default public endpoint.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default remote model.
pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Remote embedding provider for the OpenAI embeddings endpoint.
pub struct OpenAiEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    batch_size: usize,
}

impl OpenAiEmbedder {
    /// Create a provider for the given endpoint, key, and model.
    pub fn new(
        base_url: &str,
        api_key: String,
        model: String,
        batch_size: usize,
    ) -> Result<Self, EmbedError> {
        if api_key.is_empty() {
            return Err(EmbedError::Config("OPENAI_API_KEY is empty".to_string()));
        }

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            batch_size: batch_size.max(1),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.base_url);
        let request = EmbeddingsRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::Api { status, body });
        }

        let parsed: EmbeddingsResponse = response.json().await?;
        let vectors = into_ordered_vectors(parsed, texts.len())?;

        debug!(
            batch = texts.len(),
            model = %self.model,
            "Embedded batch via remote API"
        );

        Ok(vectors)
    }
}

/// Reorder response rows by their `index` field and normalize each vector.
/// The API documents in-order responses, but the index is authoritative.
fn into_ordered_vectors(
    response: EmbeddingsResponse,
    expected: usize,
) -> Result<Vec<Vec<f64>>, EmbedError> {
    let mut rows = response.data;
    if rows.len() != expected {
        return Err(EmbedError::CountMismatch {
            expected,
            actual: rows.len(),
        });
    }
    rows.sort_by_key(|row| row.index);
    Ok(rows.iter().map(|row| normalize(&row.embedding)).collect())
}

// --- OpenAI API request/response types ---

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f64>,
}
