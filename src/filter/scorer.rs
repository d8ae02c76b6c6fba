// Nearest-anchor classification.
//
// Every item vector is normalized, dotted against each topic centroid, and
// assigned to the argmax topic. Items whose best score falls below the
// relevance threshold are rejected outright.

use tracing::debug;

use crate::articles::Item;
use crate::embeddings::vector::{cosine, normalize};
use crate::topics::TopicAnchor;

/// An item that passed the relevance threshold, with everything clustering
/// needs to work on it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredItem {
    pub item: Item,
    /// Unit-length embedding of the item.
    pub vector: Vec<f64>,
    /// Cosine similarity against the winning anchor.
    pub score: f64,
    /// Index of the winning anchor in configured topic order.
    pub topic_index: usize,
}

impl ScoredItem {
    pub fn url(&self) -> &str {
        &self.item.url
    }
}

/// Result of scoring one batch.
#[derive(Debug, Default)]
pub struct ScoreOutcome {
    pub retained: Vec<ScoredItem>,
    pub rejected: usize,
}

pub struct Scorer<'a> {
    anchors: &'a [TopicAnchor],
    threshold: f64,
}

impl<'a> Scorer<'a> {
    pub fn new(anchors: &'a [TopicAnchor], threshold: f64) -> Self {
        Self { anchors, threshold }
    }

    /// Best-matching anchor for a unit vector as `(index, score)`.
    ///
    /// Equal scores keep the earlier anchor. `None` only when there are no
    /// anchors.
    pub fn best_topic(&self, vector: &[f64]) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (index, anchor) in self.anchors.iter().enumerate() {
            let score = cosine(vector, &anchor.centroid);
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((index, score)),
            }
        }
        best
    }

    /// Score items against the anchors. `vectors` is parallel to `items`.
    ///
    /// Retained items get `category` and `prefilter_score` set; input order
    /// is preserved.
    pub fn score(&self, items: &[Item], vectors: Vec<Vec<f64>>) -> ScoreOutcome {
        let mut outcome = ScoreOutcome::default();

        for (item, raw) in items.iter().zip(vectors) {
            let vector = normalize(&raw);
            let Some((topic_index, score)) = self.best_topic(&vector) else {
                outcome.rejected += 1;
                continue;
            };

            if score < self.threshold {
                debug!(url = %item.url, score, threshold = self.threshold, "Below relevance threshold");
                outcome.rejected += 1;
                continue;
            }

            let mut item = item.clone();
            item.category = Some(self.anchors[topic_index].name.clone());
            item.prefilter_score = Some(score);
            outcome.retained.push(ScoredItem {
                item,
                vector,
                score,
                topic_index,
            });
        }

        outcome
    }
}
