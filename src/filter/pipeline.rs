// Filter pipeline: anchors -> scoring -> clustering -> capped output.
//
// One invocation works on a fully materialized batch. The only blocking work
// is the embedding provider and the vector cache, both called in batches.
// Any provider failure degrades to returning the input unchanged, so a broken
// backend never silently empties the digest.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::articles::Item;
use crate::db::VectorCache;
use crate::embeddings::{EmbedError, EmbeddingProvider};
use crate::topics::AnchorSet;

use super::cluster::ClusterEngine;
use super::rank::{by_score_desc, rank_cap};
use super::scorer::{ScoredItem, Scorer};

/// Default relevance threshold.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Default number of items surfaced or peer-linked per cluster or bucket.
pub const DEFAULT_MAX_CLUSTER_SIZE: usize = 5;

/// Which items are clustered together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterScope {
    /// One bucket per topic, in configured topic order.
    #[default]
    Topic,
    /// Every relevant item in one bucket.
    Global,
}

/// How a bucket is reduced to its output.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputPolicy {
    /// Leader clustering at `threshold`; one kernel per cluster.
    Cluster {
        threshold: f64,
        max_cluster_size: usize,
        scope: ClusterScope,
        /// Also emit the capped members after each kernel.
        surface_members: bool,
    },
    /// Top `max_cluster_size` per topic by score.
    RankCap { max_cluster_size: usize },
}

impl OutputPolicy {
    pub fn max_cluster_size(&self) -> usize {
        match self {
            Self::Cluster {
                max_cluster_size, ..
            } => *max_cluster_size,
            Self::RankCap { max_cluster_size } => *max_cluster_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterConfig {
    /// Items scoring strictly below this are dropped.
    pub threshold: f64,
    pub policy: OutputPolicy,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            policy: OutputPolicy::RankCap {
                max_cluster_size: DEFAULT_MAX_CLUSTER_SIZE,
            },
        }
    }
}

/// Counts for one invocation.
///
/// For a non-degraded run: `input == rejected + clusters + deduplicated + capped`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub input: usize,
    /// Below the relevance threshold.
    pub rejected: usize,
    /// Clusters formed (one per rank-capped bucket).
    pub clusters: usize,
    /// Members kept as peer links or surfaced beside their kernel.
    pub deduplicated: usize,
    /// Members dropped by the size cap.
    pub capped: usize,
    /// Items returned.
    pub retained: usize,
    /// The run failed and returned its input unchanged.
    pub degraded: bool,
}

#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub items: Vec<Item>,
    pub stats: FilterStats,
}

pub struct FilterPipeline {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Option<Arc<dyn VectorCache>>,
    anchors: AnchorSet,
    config: FilterConfig,
}

impl FilterPipeline {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, anchors: AnchorSet, config: FilterConfig) -> Self {
        Self {
            provider,
            cache: None,
            anchors,
            config,
        }
    }

    /// Memoize item embeddings in `cache`.
    pub fn with_cache(mut self, cache: Arc<dyn VectorCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn anchors(&self) -> &AnchorSet {
        &self.anchors
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Filter a batch, returning only the surfaced items.
    pub async fn filter<R: Rng + ?Sized>(&self, items: Vec<Item>, rng: &mut R) -> Vec<Item> {
        self.filter_with_stats(items, rng).await.items
    }

    /// Filter a batch and report what happened to it.
    ///
    /// Never fails. On any provider error the input comes back unchanged with
    /// `stats.degraded` set.
    pub async fn filter_with_stats<R: Rng + ?Sized>(&self, items: Vec<Item>, rng: &mut R) -> FilterOutcome {
        if items.is_empty() {
            return FilterOutcome {
                items,
                stats: FilterStats::default(),
            };
        }

        match self.run(&items, rng).await {
            Ok(outcome) => {
                info!(
                    input = outcome.stats.input,
                    rejected = outcome.stats.rejected,
                    clusters = outcome.stats.clusters,
                    deduplicated = outcome.stats.deduplicated,
                    capped = outcome.stats.capped,
                    retained = outcome.stats.retained,
                    "Prefilter complete"
                );
                outcome
            }
            Err(e) => {
                warn!(
                    error = %e,
                    before = items.len(),
                    after = items.len(),
                    "Prefilter failed; passing all items through unfiltered"
                );
                let stats = FilterStats {
                    input: items.len(),
                    retained: items.len(),
                    degraded: true,
                    ..FilterStats::default()
                };
                FilterOutcome { items, stats }
            }
        }
    }

    async fn run<R: Rng + ?Sized>(&self, items: &[Item], rng: &mut R) -> Result<FilterOutcome, EmbedError> {
        // Step 1: Topic anchors (cached per topic set and model)
        if self.anchors.is_empty() {
            return Err(EmbedError::Config("no topics configured".to_string()));
        }
        let anchors = self.anchors.anchors(self.provider.as_ref()).await?;

        // Step 2: Item vectors, cache first
        let vectors = self.item_vectors(items).await?;
        check_dimensions(anchors.iter().map(|a| &a.centroid).chain(&vectors))?;

        // Step 3: Nearest-anchor scoring and the relevance threshold
        let scored = Scorer::new(&anchors, self.config.threshold).score(items, vectors);
        let mut stats = FilterStats {
            input: items.len(),
            rejected: scored.rejected,
            ..FilterStats::default()
        };

        // Step 4: Reduce each bucket
        let mut output = Vec::new();
        for bucket in self.buckets(scored.retained, anchors.len()) {
            output.extend(self.reduce_bucket(bucket, rng, &mut stats));
        }

        stats.retained = output.len();
        Ok(FilterOutcome {
            items: output,
            stats,
        })
    }

    /// Vectors parallel to `items`: cache hits first, the rest from the
    /// provider, newly embedded ones written back.
    async fn item_vectors(&self, items: &[Item]) -> Result<Vec<Vec<f64>>, EmbedError> {
        let model_id = self.provider.model_id();
        let ids: Vec<String> = items.iter().map(|item| item.id().to_string()).collect();

        let mut hits = match &self.cache {
            Some(cache) => cache.get_many(&ids, model_id).await.unwrap_or_else(|e| {
                warn!(error = %e, "Vector cache read failed; embedding everything");
                HashMap::new()
            }),
            None => HashMap::new(),
        };

        let misses: Vec<usize> = (0..items.len())
            .filter(|&i| !hits.contains_key(&ids[i]))
            .collect();
        debug!(hits = items.len() - misses.len(), misses = misses.len(), "Item vector lookup");

        if !misses.is_empty() {
            let texts: Vec<String> = misses.iter().map(|&i| items[i].embedding_text()).collect();
            let embedded = self.provider.embed(&texts).await?;

            let fresh: HashMap<String, Vec<f64>> = misses
                .iter()
                .zip(embedded)
                .map(|(&i, vector)| (ids[i].clone(), vector))
                .collect();

            if let Some(cache) = &self.cache {
                if let Err(e) = cache.put_many(&fresh, model_id).await {
                    warn!(error = %e, count = fresh.len(), "Vector cache write failed");
                }
            }
            hits.extend(fresh);
        }

        ids.iter()
            .map(|id| {
                hits.get(id).cloned().ok_or_else(|| EmbedError::CountMismatch {
                    expected: items.len(),
                    actual: hits.len(),
                })
            })
            .collect()
    }

    /// Split scored items into buckets, keeping input order within each.
    fn buckets(&self, scored: Vec<ScoredItem>, topic_count: usize) -> Vec<Vec<ScoredItem>> {
        let per_topic = match self.config.policy {
            OutputPolicy::Cluster { scope, .. } => scope == ClusterScope::Topic,
            OutputPolicy::RankCap { .. } => true,
        };
        if !per_topic {
            return vec![scored];
        }

        let mut buckets: Vec<Vec<ScoredItem>> = (0..topic_count).map(|_| Vec::new()).collect();
        for item in scored {
            buckets[item.topic_index].push(item);
        }
        buckets
    }

    fn reduce_bucket<R: Rng + ?Sized>(
        &self,
        bucket: Vec<ScoredItem>,
        rng: &mut R,
        stats: &mut FilterStats,
    ) -> Vec<Item> {
        if bucket.is_empty() {
            return Vec::new();
        }

        match self.config.policy {
            OutputPolicy::RankCap { max_cluster_size } => {
                let total = bucket.len();
                let (items, dropped) = rank_cap(bucket, max_cluster_size);
                stats.clusters += 1;
                stats.capped += dropped;
                stats.deduplicated += total - dropped - 1;
                items
            }
            OutputPolicy::Cluster {
                threshold,
                max_cluster_size,
                surface_members,
                ..
            } => {
                let mut clusters = ClusterEngine::new(threshold).cluster(bucket, rng);
                clusters.sort_by(|a, b| by_score_desc(&a.kernel, &b.kernel));
                stats.clusters += clusters.len();

                let mut items = Vec::new();
                for cluster in clusters {
                    let members = cluster.len();
                    let (surfaced, dropped) = if surface_members {
                        cluster.into_surfaced(max_cluster_size)
                    } else {
                        let (kernel, dropped) = cluster.into_kernel(max_cluster_size);
                        (vec![kernel], dropped)
                    };
                    stats.capped += dropped;
                    stats.deduplicated += members - dropped - 1;
                    items.extend(surfaced);
                }
                items
            }
        }
    }
}

/// Every vector must have the first one's length. A stale anchors file or a
/// cached vector from another model would otherwise score on a truncated
/// dot product.
fn check_dimensions<'a>(vectors: impl IntoIterator<Item = &'a Vec<f64>>) -> Result<(), EmbedError> {
    let mut expected = None;
    for vector in vectors {
        match expected {
            None => expected = Some(vector.len()),
            Some(dim) if dim != vector.len() => {
                return Err(EmbedError::DimensionMismatch {
                    expected: dim,
                    actual: vector.len(),
                })
            }
            Some(_) => {}
        }
    }
    Ok(())
}
