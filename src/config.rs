use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};

use crate::embeddings::onnx::LOCAL_MODEL_ID;
use crate::embeddings::openai::{DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL};
use crate::embeddings::DEFAULT_BATCH_SIZE;
use crate::filter::pipeline::{DEFAULT_MAX_CLUSTER_SIZE, DEFAULT_THRESHOLD};
use crate::filter::{ClusterScope, FilterConfig, OutputPolicy};

/// Which embedding backend to use.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbedderBackend {
    /// OpenAI-compatible embeddings endpoint (default), requires OPENAI_API_KEY
    OpenAi,
    /// Local ONNX sentence transformer, no API key, run download-model first
    Onnx,
}

/// Central configuration loaded from environment variables.
///
/// All secrets come from env vars (never hardcoded). The .env file
/// is loaded automatically at startup via dotenvy.
#[derive(Debug, Clone)]
pub struct Config {
    pub embedder: EmbedderBackend,
    pub openai_api_key: String,
    pub openai_base_url: String,
    /// Embedding model identifier, also the vector cache key namespace
    pub model: String,
    pub batch_size: usize,
    /// Relevance threshold for topic scores
    pub threshold: f64,
    /// Similarity for near-duplicate clustering; unset selects rank-cap mode
    pub cluster_threshold: Option<f64>,
    pub max_cluster_size: usize,
    pub cluster_scope: ClusterScope,
    pub db_path: String,
    /// Directory containing the ONNX model files
    pub model_dir: PathBuf,
    /// Explicit topics file; unset falls back to topics.txt / topics.example.txt
    pub topics_file: Option<PathBuf>,
    /// Precomputed anchor embeddings
    pub anchors_file: Option<PathBuf>,
    /// Fixed seed for cluster seeding (reproducible runs)
    pub seed: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Everything has a default; credentials are only checked by the
    /// require_* helpers for the commands that need them.
    pub fn load() -> Result<Self> {
        let embedder = match env::var("TOPICSIFT_EMBEDDER").as_deref() {
            Ok("onnx") => EmbedderBackend::Onnx,
            // "openai" or unset both default to the remote API
            _ => EmbedderBackend::OpenAi,
        };

        let model = env::var("TOPICSIFT_MODEL").unwrap_or_else(|_| match embedder {
            EmbedderBackend::OpenAi => DEFAULT_OPENAI_MODEL.to_string(),
            EmbedderBackend::Onnx => LOCAL_MODEL_ID.to_string(),
        });

        let cluster_scope = match env::var("TOPICSIFT_CLUSTER_SCOPE").as_deref() {
            Ok("global") => ClusterScope::Global,
            _ => ClusterScope::Topic,
        };

        let model_dir = env::var("TOPICSIFT_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| crate::embeddings::download::default_model_dir());

        let config = Self {
            embedder,
            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.to_string()),
            model,
            batch_size: parse_var("TOPICSIFT_BATCH_SIZE")?.unwrap_or(DEFAULT_BATCH_SIZE),
            threshold: parse_var("TOPICSIFT_THRESHOLD")?.unwrap_or(DEFAULT_THRESHOLD),
            cluster_threshold: parse_var("TOPICSIFT_CLUSTER_THRESHOLD")?,
            max_cluster_size: parse_var("TOPICSIFT_MAX_CLUSTER_SIZE")?
                .unwrap_or(DEFAULT_MAX_CLUSTER_SIZE),
            cluster_scope,
            db_path: env::var("TOPICSIFT_DB_PATH")
                .unwrap_or_else(|_| "./topicsift.db".to_string()),
            model_dir,
            topics_file: env::var("TOPICSIFT_TOPICS_FILE").ok().map(PathBuf::from),
            anchors_file: env::var("TOPICSIFT_ANCHORS_FILE").ok().map(PathBuf::from),
            seed: parse_var("TOPICSIFT_SEED")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the filter cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(-1.0..=1.0).contains(&self.threshold) {
            anyhow::bail!("TOPICSIFT_THRESHOLD must be within [-1, 1], got {}", self.threshold);
        }
        if let Some(t) = self.cluster_threshold {
            if !(-1.0..=1.0).contains(&t) {
                anyhow::bail!("TOPICSIFT_CLUSTER_THRESHOLD must be within [-1, 1], got {t}");
            }
        }
        if self.max_cluster_size == 0 {
            anyhow::bail!("TOPICSIFT_MAX_CLUSTER_SIZE must be at least 1");
        }
        if self.batch_size == 0 {
            anyhow::bail!("TOPICSIFT_BATCH_SIZE must be at least 1");
        }
        Ok(())
    }

    /// Filter settings derived from this configuration.
    pub fn filter_config(&self) -> FilterConfig {
        let policy = match self.cluster_threshold {
            Some(threshold) => OutputPolicy::Cluster {
                threshold,
                max_cluster_size: self.max_cluster_size,
                scope: self.cluster_scope,
                surface_members: false,
            },
            None => OutputPolicy::RankCap {
                max_cluster_size: self.max_cluster_size,
            },
        };
        FilterConfig {
            threshold: self.threshold,
            policy,
        }
    }

    /// Check that the OpenAI API key is configured.
    pub fn require_openai(&self) -> Result<()> {
        if self.openai_api_key.is_empty() {
            anyhow::bail!(
                "OPENAI_API_KEY not set. Add it to your .env file.\n\
                 Or set TOPICSIFT_EMBEDDER=onnx to embed locally instead."
            );
        }
        Ok(())
    }

    /// Validate that the chosen embedding backend has what it needs.
    /// For ONNX: model files must exist (or user should run download-model).
    /// For OpenAI: API key must be set.
    pub fn require_embedder(&self) -> Result<()> {
        match self.embedder {
            EmbedderBackend::Onnx => {
                if !crate::embeddings::download::embedding_files_present(&self.model_dir) {
                    anyhow::bail!(
                        "ONNX model files not found in {}\n\
                         Run `topicsift download-model` to download them.\n\
                         Or set TOPICSIFT_EMBEDDER=openai to use the API instead.",
                        self.model_dir.display()
                    );
                }
                Ok(())
            }
            EmbedderBackend::OpenAi => self.require_openai(),
        }
    }
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("{name} has an invalid value: {raw}")),
        _ => Ok(None),
    }
}
