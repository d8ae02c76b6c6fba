// Topic definitions and the topics file.
//
// A topic is a name plus an ordered keyword list, optionally with extra
// phrasings. Each topic becomes one anchor: every query string it yields is
// embedded and the results are averaged into a single centroid. A bare query
// line is simply a topic with no keywords, so "one anchor per query" and
// "one anchor per keyword topic" are the same mechanism.
//
// File format (one topic per line):
//
//   # comment
//   Ransomware: ransomware, extortion, data leak site
//   > ransomware gang publishes stolen hospital records
//   critical vulnerability actively exploited in the wild
//
// `Name: kw, kw` declares keywords; a `>` line adds an alternative query to
// the topic above it; anything else is a single-query topic.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Default topics file, looked up in the working directory.
pub const DEFAULT_TOPICS_FILE: &str = "topics.txt";

/// Fallback shipped alongside the default.
pub const EXAMPLE_TOPICS_FILE: &str = "topics.example.txt";

/// One configured topic of interest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicDefinition {
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Alternative phrasings embedded alongside the representative string.
    #[serde(default)]
    pub queries: Vec<String>,
}

impl TopicDefinition {
    pub fn new(name: &str, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            queries: Vec::new(),
        }
    }

    /// A topic that is just one query string.
    pub fn from_query(query: &str) -> Self {
        Self::new(query, &[])
    }

    /// Add an alternative phrasing.
    pub fn with_query(mut self, query: &str) -> Self {
        self.queries.push(query.to_string());
        self
    }

    /// Name and keywords folded into one string: `"Name: kw1, kw2"`, or just
    /// the name when there are no keywords.
    pub fn representative_text(&self) -> String {
        if self.keywords.is_empty() {
            self.name.clone()
        } else {
            format!("{}: {}", self.name, self.keywords.join(", "))
        }
    }

    /// Every string embedded for this topic, representative text first.
    pub fn query_strings(&self) -> Vec<String> {
        std::iter::once(self.representative_text())
            .chain(self.queries.iter().cloned())
            .collect()
    }
}

/// Parse the topics file format.
pub fn parse_topics(content: &str) -> Result<Vec<TopicDefinition>> {
    let mut topics: Vec<TopicDefinition> = Vec::new();

    for (lineno, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(alt) = line.strip_prefix('>') {
            let alt = alt.trim();
            let Some(topic) = topics.last_mut() else {
                anyhow::bail!(
                    "line {}: alternative query `{}` has no topic above it",
                    lineno + 1,
                    alt
                );
            };
            if !alt.is_empty() {
                topic.queries.push(alt.to_string());
            }
            continue;
        }

        let topic = match line.split_once(':') {
            Some((name, keywords)) if !name.trim().is_empty() => TopicDefinition {
                name: name.trim().to_string(),
                keywords: keywords
                    .split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string)
                    .collect(),
                queries: Vec::new(),
            },
            _ => TopicDefinition::from_query(line),
        };
        topics.push(topic);
    }

    Ok(topics)
}

/// Load topics from an explicit path, or from the default file falling back
/// to the example file.
pub fn load_topics(path: Option<&Path>) -> Result<Vec<TopicDefinition>> {
    if let Some(path) = path {
        return load_from_path(path);
    }

    for candidate in [DEFAULT_TOPICS_FILE, EXAMPLE_TOPICS_FILE] {
        let candidate = PathBuf::from(candidate);
        if candidate.is_file() {
            return load_from_path(&candidate);
        }
        debug!(path = %candidate.display(), "Topics file not present");
    }

    anyhow::bail!(
        "No topics file found. Provide {DEFAULT_TOPICS_FILE} or {EXAMPLE_TOPICS_FILE}, \
         or set TOPICSIFT_TOPICS_FILE."
    )
}

fn load_from_path(path: &Path) -> Result<Vec<TopicDefinition>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read topics file {}", path.display()))?;
    let topics = parse_topics(&content)
        .with_context(|| format!("Invalid topics file {}", path.display()))?;
    info!(count = topics.len(), path = %path.display(), "Loaded topics");
    Ok(topics)
}
