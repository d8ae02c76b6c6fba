// Precomputed anchor embeddings file.
//
// Lets a deployment embed its topic queries once (`topicsift export-anchors`)
// and skip the provider round-trip for anchors on every run:
//
//   { "model": "...", "threshold": 0.5, "queries": [...], "embeddings": [[...], ...] }
//
// A file is only trusted when its query list and model match the current
// configuration exactly. Anything else is a configuration drift, not a fatal
// error: the file is ignored with a warning and anchors are embedded live.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// On-disk layout of the precomputed anchors file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecomputedAnchors {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub queries: Vec<String>,
    #[serde(default)]
    pub embeddings: Vec<Vec<f64>>,
}

/// Why a precomputed file was not used.
#[derive(Debug, Error)]
pub enum AnchorFileError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read: {0}")]
    Io(#[from] std::io::Error),

    #[error("not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("query set differs from configuration ({found} stored, {expected} configured)")]
    QueryMismatch { expected: usize, found: usize },

    #[error("built with model {file} but current model is {configured}")]
    ModelMismatch { file: String, configured: String },

    #[error("{queries} queries but {embeddings} embeddings")]
    ShapeMismatch { queries: usize, embeddings: usize },
}

impl PrecomputedAnchors {
    /// Read and parse a file without validating it against configuration.
    pub fn read(path: &Path) -> Result<Self, AnchorFileError> {
        if !path.exists() {
            return Err(AnchorFileError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Check that this file was produced for `queries` under `model_id`.
    /// An empty stored model is accepted.
    pub fn validate(&self, queries: &[String], model_id: &str) -> Result<(), AnchorFileError> {
        if self.queries != queries {
            return Err(AnchorFileError::QueryMismatch {
                expected: queries.len(),
                found: self.queries.len(),
            });
        }
        if !self.model.is_empty() && self.model != model_id {
            return Err(AnchorFileError::ModelMismatch {
                file: self.model.clone(),
                configured: model_id.to_string(),
            });
        }
        if self.embeddings.len() != self.queries.len() {
            return Err(AnchorFileError::ShapeMismatch {
                queries: self.queries.len(),
                embeddings: self.embeddings.len(),
            });
        }
        Ok(())
    }

    /// Write the file as pretty-printed JSON, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write anchors file {}", path.display()))?;
        Ok(())
    }
}

/// Load a precomputed file and keep it only if it matches the configuration.
///
/// Never fails: every problem is logged and reported as `None`, which makes
/// the caller embed anchors live.
pub fn load_validated(
    path: &Path,
    queries: &[String],
    model_id: &str,
    threshold: f64,
) -> Option<PrecomputedAnchors> {
    let file = match PrecomputedAnchors::read(path) {
        Ok(file) => file,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Precomputed anchors unusable; embedding live");
            return None;
        }
    };

    if let Err(e) = file.validate(queries, model_id) {
        warn!(path = %path.display(), error = %e, "Precomputed anchors rejected; embedding live");
        return None;
    }

    if let Some(stored) = file.threshold {
        if stored != threshold {
            info!(
                path = %path.display(),
                stored,
                configured = threshold,
                "Anchors file threshold differs; using configured value"
            );
        }
    }

    info!(count = file.embeddings.len(), path = %path.display(), "Loaded precomputed anchor embeddings");
    Some(file)
}
