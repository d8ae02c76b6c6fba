// Unit tests for topic anchors and the precomputed anchors file.
//
// Covers the topics file loader, anchor caching by signature, precomputed
// file validation, and the export -> reload round trip.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;

use topicsift::articles::Item;
use topicsift::embeddings::{EmbedError, EmbeddingProvider};
use topicsift::filter::{FilterConfig, FilterPipeline, OutputPolicy};
use topicsift::topics::definition::parse_topics;
use topicsift::topics::{load_topics, AnchorCache, AnchorSet, PrecomputedAnchors, TopicDefinition};

/// Looks texts up in a fixed table and records every batch it embeds.
struct TableEmbedder {
    model: String,
    table: HashMap<String, Vec<f64>>,
    batches: Mutex<Vec<Vec<String>>>,
}

impl TableEmbedder {
    fn new(model: &str, entries: &[(&str, Vec<f64>)]) -> Self {
        Self {
            model: model.to_string(),
            table: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            batches: Mutex::new(Vec::new()),
        }
    }

    fn embedded(&self) -> Vec<String> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl EmbeddingProvider for TableEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbedError> {
        self.batches.lock().unwrap().push(texts.to_vec());
        Ok(texts
            .iter()
            .map(|t| self.table.get(t).cloned().unwrap_or_else(|| vec![0.0, 0.0]))
            .collect())
    }
}

fn table() -> Vec<(&'static str, Vec<f64>)> {
    vec![
        ("Alpha", vec![1.0, 0.0]),
        ("Beta", vec![0.0, 1.0]),
        ("X", vec![1.0, 0.0]),
        ("Z", vec![0.6, 0.8]),
    ]
}

fn alpha_beta() -> Vec<TopicDefinition> {
    vec![
        TopicDefinition::from_query("Alpha"),
        TopicDefinition::from_query("Beta"),
    ]
}

// ============================================================
// Topics file
// ============================================================

#[test]
fn topics_file_keywords_and_alternatives() {
    let topics = parse_topics(
        "# comment\n\
         Cloud Security: aws, misconfiguration\n\
         > exposed storage bucket leaks customer data\n\
         \n\
         supply chain attack on package registry\n",
    )
    .unwrap();

    assert_eq!(topics.len(), 2);
    assert_eq!(
        topics[0].query_strings(),
        vec![
            "Cloud Security: aws, misconfiguration",
            "exposed storage bucket leaks customer data"
        ]
    );
    assert_eq!(
        topics[1].query_strings(),
        vec!["supply chain attack on package registry"]
    );
}

#[test]
fn topics_file_explicit_path_must_exist() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("topics.txt");
    assert!(load_topics(Some(&missing)).is_err());

    std::fs::write(&missing, "Alpha\n").unwrap();
    assert_eq!(load_topics(Some(&missing)).unwrap().len(), 1);
}

// ============================================================
// AnchorSet
// ============================================================

#[tokio::test]
async fn anchors_embed_all_topics_in_one_call() {
    let provider = TableEmbedder::new("m", &table());
    let set = AnchorSet::new(alpha_beta(), Arc::new(AnchorCache::new()));
    let anchors = set.anchors(&provider).await.unwrap();

    assert_eq!(anchors.len(), 2);
    assert_eq!(anchors[0].name, "Alpha");
    assert_eq!(anchors[1].centroid, vec![0.0, 1.0]);
    assert_eq!(provider.batches.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn anchors_keyed_by_model() {
    let cache = Arc::new(AnchorCache::new());
    let set = AnchorSet::new(alpha_beta(), Arc::clone(&cache));

    let m1 = TableEmbedder::new("m1", &table());
    let m2 = TableEmbedder::new("m2", &table());
    set.anchors(&m1).await.unwrap();
    set.anchors(&m2).await.unwrap();
    set.anchors(&m1).await.unwrap();

    assert_eq!(cache.len(), 2);
    assert_eq!(m1.batches.lock().unwrap().len(), 1);
    assert_eq!(m2.batches.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn different_topic_sets_do_not_collide() {
    let cache = Arc::new(AnchorCache::new());
    let provider = TableEmbedder::new("m", &table());

    let ab = AnchorSet::new(alpha_beta(), Arc::clone(&cache));
    let b = AnchorSet::new(vec![TopicDefinition::from_query("Beta")], Arc::clone(&cache));

    let first = ab.anchors(&provider).await.unwrap();
    let second = b.anchors(&provider).await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].name, "Beta");
}

// ============================================================
// Precomputed file
// ============================================================

fn write_file(dir: &std::path::Path, file: &PrecomputedAnchors) -> std::path::PathBuf {
    let path = dir.join("anchors.json");
    file.write(&path).unwrap();
    path
}

#[tokio::test]
async fn valid_precomputed_file_skips_provider() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        &PrecomputedAnchors {
            model: "m".to_string(),
            threshold: Some(0.5),
            queries: vec!["Alpha".to_string(), "Beta".to_string()],
            embeddings: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        },
    );

    let provider = TableEmbedder::new("m", &[]);
    let set = AnchorSet::new(alpha_beta(), Arc::new(AnchorCache::new()))
        .with_precomputed_file(&path, "m", 0.7);
    assert!(set.uses_precomputed());

    let anchors = set.anchors(&provider).await.unwrap();
    assert_eq!(anchors[0].centroid, vec![1.0, 0.0]);
    assert!(provider.embedded().is_empty());
}

#[tokio::test]
async fn mismatched_queries_fall_back_to_live() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        &PrecomputedAnchors {
            model: "m".to_string(),
            threshold: None,
            queries: vec!["Alpha".to_string(), "Gamma".to_string()],
            embeddings: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        },
    );

    let provider = TableEmbedder::new("m", &table());
    let set = AnchorSet::new(alpha_beta(), Arc::new(AnchorCache::new()))
        .with_precomputed_file(&path, "m", 0.5);
    assert!(!set.uses_precomputed());

    set.anchors(&provider).await.unwrap();
    assert_eq!(provider.embedded(), vec!["Alpha", "Beta"]);
}

#[tokio::test]
async fn mismatched_model_falls_back_to_live() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        &PrecomputedAnchors {
            model: "old-model".to_string(),
            threshold: None,
            queries: vec!["Alpha".to_string(), "Beta".to_string()],
            embeddings: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        },
    );

    let set = AnchorSet::new(alpha_beta(), Arc::new(AnchorCache::new()))
        .with_precomputed_file(&path, "m", 0.5);
    assert!(!set.uses_precomputed());
}

#[test]
fn corrupt_precomputed_file_never_raises() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("anchors.json");
    std::fs::write(&path, "[1, 2").unwrap();

    let set = AnchorSet::new(alpha_beta(), Arc::new(AnchorCache::new()))
        .with_precomputed_file(&path, "m", 0.5);
    assert!(!set.uses_precomputed());
}

// ============================================================
// Export -> reload round trip
// ============================================================

async fn scores(set: AnchorSet, provider: Arc<TableEmbedder>) -> Vec<(String, Option<String>, Option<f64>)> {
    let config = FilterConfig {
        threshold: 0.0,
        policy: OutputPolicy::RankCap {
            max_cluster_size: 10,
        },
    };
    let pipeline = FilterPipeline::new(provider, set, config);
    let items = vec![Item::new("https://x", "X", "", ""), Item::new("https://z", "Z", "", "")];
    pipeline
        .filter(items, &mut StdRng::seed_from_u64(0))
        .await
        .into_iter()
        .map(|i| (i.url, i.category, i.prefilter_score))
        .collect()
}

#[tokio::test]
async fn exported_anchors_score_like_live_anchors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("anchors.json");

    let provider = Arc::new(TableEmbedder::new("m", &table()));
    let live = AnchorSet::new(alpha_beta(), Arc::new(AnchorCache::new()));
    let exported = PrecomputedAnchors {
        model: provider.model_id().to_string(),
        threshold: Some(0.5),
        queries: live.query_strings(),
        embeddings: live.embed_queries(provider.as_ref()).await.unwrap(),
    };
    exported.write(&path).unwrap();

    let live_scores = scores(live, Arc::clone(&provider)).await;

    let reloaded = AnchorSet::new(alpha_beta(), Arc::new(AnchorCache::new()))
        .with_precomputed_file(&path, "m", 0.5);
    assert!(reloaded.uses_precomputed());
    let reloaded_scores = scores(reloaded, Arc::clone(&provider)).await;

    assert_eq!(live_scores, reloaded_scores);
    assert_eq!(live_scores.len(), 2);
}
