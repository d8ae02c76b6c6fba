// Article records: the typed shape that flows in and out of the filter.
//
// Input comes from the article-collection step as JSON objects. The filter
// adds exactly three fields (category, prefilter_score, other_urls); any other
// field the collector attached (image, published, ...) is carried through
// untouched in `extra`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One candidate article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    /// Body text, already truncated by the collector.
    #[serde(default)]
    pub text: String,
    /// Feed category on input; winning topic name after filtering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Cosine similarity against the winning topic anchor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefilter_score: Option<f64>,
    /// Near-duplicates folded into this item. Present (possibly empty) on
    /// every filtered item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_urls: Option<Vec<PeerLink>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A near-duplicate reported on its cluster's kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerLink {
    pub url: String,
    /// `1 - cosine` to the kernel, rounded to 4 decimals.
    pub distance: f64,
}

impl Item {
    /// Minimal item with only the core text fields set.
    pub fn new(url: &str, title: &str, summary: &str, text: &str) -> Self {
        Self {
            url: url.to_string(),
            title: title.to_string(),
            summary: summary.to_string(),
            text: text.to_string(),
            category: None,
            prefilter_score: None,
            other_urls: None,
            extra: Map::new(),
        }
    }

    /// Cache key for this item's embedding.
    pub fn id(&self) -> &str {
        &self.url
    }

    /// The string sent to the embedding provider: title, summary, and body,
    /// newline-joined, skipping empty parts.
    pub fn embedding_text(&self) -> String {
        [&self.title, &self.summary, &self.text]
            .iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Parse a JSON array of items (the collector's snapshot format).
pub fn parse_items(json: &str) -> anyhow::Result<Vec<Item>> {
    let items: Vec<Item> = serde_json::from_str(json)
        .map_err(|e| anyhow::anyhow!("Article snapshot must be a JSON array of objects: {e}"))?;
    Ok(items)
}
