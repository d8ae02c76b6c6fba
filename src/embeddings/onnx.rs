// Local sentence-transformer embedder running on ONNX Runtime.
//
// Runs all-MiniLM-L6-v2 (or any BERT-style sentence encoder exported to ONNX)
// on the local CPU. No API key, no network after the one-time model download.
// Token embeddings are mean-pooled under the attention mask and then
// L2-normalized, matching how the model was trained.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::debug;

use super::traits::{EmbedError, EmbeddingProvider};
use super::vector::normalize;

/// Model identifier reported for cache keys and anchor files.
pub const LOCAL_MODEL_ID: &str = "all-MiniLM-L6-v2";

/// Longest token sequence fed to the model; article bodies are truncated here.
const MAX_SEQ_LEN: usize = 256;

/// Local ONNX embedding provider.
///
/// Session and tokenizer sit behind Arc so inference can move onto a
/// blocking thread; Session::run needs &mut, hence the Mutex.
pub struct OnnxEmbedder {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    model_id: String,
    batch_size: usize,
}

impl OnnxEmbedder {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`.
    ///
    /// Run `topicsift download-model` first if they don't exist.
    pub fn load(model_dir: &Path, batch_size: usize) -> Result<Self, EmbedError> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        for path in [&model_path, &tokenizer_path] {
            if !path.exists() {
                return Err(EmbedError::Config(format!(
                    "embedding model file not found: {}. Run `topicsift download-model` first.",
                    path.display()
                )));
            }
        }

        let session = Session::builder()
            .map_err(|e| EmbedError::Model(format!("failed to create session builder: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| {
                EmbedError::Model(format!(
                    "failed to load {}: {e}",
                    model_path.display()
                ))
            })?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbedError::Model(format!("failed to load tokenizer: {e}")))?;

        debug!(dir = %model_dir.display(), "Loaded local embedding model");

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            model_id: LOCAL_MODEL_ID.to_string(),
            batch_size: batch_size.max(1),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OnnxEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Tokenization and inference are CPU-bound, so they run on a blocking
    /// thread to keep the async runtime responsive.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || embed_sync(&session, &tokenizer, &texts))
            .await
            .map_err(|e| EmbedError::Model(format!("inference task failed: {e}")))?
    }
}

/// Tokenize, run one forward pass, and mean-pool each row.
fn embed_sync(
    session: &Mutex<Session>,
    tokenizer: &Tokenizer,
    texts: &[String],
) -> Result<Vec<Vec<f64>>, EmbedError> {
    let encodings = texts
        .iter()
        .map(|t| {
            tokenizer
                .encode(t.as_str(), true)
                .map_err(|e| EmbedError::Model(format!("tokenization failed: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let batch = encodings.len();
    let seq_len = encodings
        .iter()
        .map(|e| e.get_ids().len().min(MAX_SEQ_LEN))
        .max()
        .unwrap_or(0);

    if seq_len == 0 {
        return Err(EmbedError::Model("tokenizer produced no tokens".to_string()));
    }

    // BERT inputs: ids padded with 0, mask 1 for real tokens, type ids all 0.
    let mut input_ids: Vec<i64> = Vec::with_capacity(batch * seq_len);
    let mut attention_mask: Vec<i64> = Vec::with_capacity(batch * seq_len);

    for encoding in &encodings {
        let len = encoding.get_ids().len().min(seq_len);
        input_ids.extend(encoding.get_ids()[..len].iter().map(|&id| id as i64));
        attention_mask.extend(encoding.get_attention_mask()[..len].iter().map(|&m| m as i64));
        input_ids.extend(std::iter::repeat_n(0i64, seq_len - len));
        attention_mask.extend(std::iter::repeat_n(0i64, seq_len - len));
    }
    let token_type_ids = vec![0i64; batch * seq_len];

    let shape = [batch as i64, seq_len as i64];
    let tensor = |data: Vec<i64>, name: &str| {
        Tensor::from_array((shape, data))
            .map_err(|e| EmbedError::Model(format!("failed to build {name} tensor: {e}")))
    };
    let ids_tensor = tensor(input_ids, "input_ids")?;
    let mask_tensor = tensor(attention_mask.clone(), "attention_mask")?;
    let types_tensor = tensor(token_type_ids, "token_type_ids")?;

    // last_hidden_state: [batch, seq_len, hidden]
    let hidden = {
        let mut session = session
            .lock()
            .map_err(|e| EmbedError::Model(format!("session lock poisoned: {e}")))?;

        let outputs = session
            .run(ort::inputs! {
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                "token_type_ids" => types_tensor
            })
            .map_err(|e| EmbedError::Model(format!("inference failed: {e}")))?;

        let (_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedError::Model(format!("unexpected model output: {e}")))?;

        data.to_vec()
    };

    let dim = hidden.len() / (batch * seq_len);
    if dim == 0 {
        return Err(EmbedError::Model("model returned an empty hidden state".to_string()));
    }

    Ok(mean_pool(&hidden, &attention_mask, batch, seq_len, dim))
}

/// Average token vectors weighted by the attention mask, then normalize.
fn mean_pool(
    hidden: &[f32],
    attention_mask: &[i64],
    batch: usize,
    seq_len: usize,
    dim: usize,
) -> Vec<Vec<f64>> {
    let mut pooled = Vec::with_capacity(batch);

    for row in 0..batch {
        let mut sum = vec![0.0_f64; dim];
        let mut weight = 0.0_f64;

        for token in 0..seq_len {
            let mask = attention_mask[row * seq_len + token] as f64;
            if mask <= 0.0 {
                continue;
            }
            weight += mask;
            let offset = (row * seq_len + token) * dim;
            for (k, slot) in sum.iter_mut().enumerate() {
                *slot += hidden[offset + k] as f64 * mask;
            }
        }

        if weight > 0.0 {
            for slot in &mut sum {
                *slot /= weight;
            }
        }

        pooled.push(normalize(&sum));
    }

    pooled
}
