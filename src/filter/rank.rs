// Rank-cap: the non-randomized per-topic budget.
//
// Sort the bucket by score, keep the top `max_cluster_size`, and let the top
// item carry distances to the rest of what was kept.

use crate::articles::{Item, PeerLink};
use crate::embeddings::vector::cosine_distance;

use super::scorer::ScoredItem;

/// Score descending, then URL ascending.
pub fn by_score_desc(a: &ScoredItem, b: &ScoredItem) -> std::cmp::Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.url().cmp(b.url()))
}

/// Keep the `max_cluster_size` best items of one bucket.
///
/// Returns the surfaced items (best first) and how many were dropped.
pub fn rank_cap(mut bucket: Vec<ScoredItem>, max_cluster_size: usize) -> (Vec<Item>, usize) {
    bucket.sort_by(by_score_desc);
    let keep = max_cluster_size.max(1);
    let dropped = bucket.len().saturating_sub(keep);
    bucket.truncate(keep);

    let mut kept = bucket.into_iter();
    let Some(top) = kept.next() else {
        return (Vec::new(), dropped);
    };

    let rest: Vec<ScoredItem> = kept.collect();
    let mut links: Vec<PeerLink> = rest
        .iter()
        .map(|other| PeerLink {
            url: other.item.url.clone(),
            distance: cosine_distance(&top.vector, &other.vector),
        })
        .collect();
    links.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.url.cmp(&b.url)));

    let mut surfaced = Vec::with_capacity(rest.len() + 1);
    let mut head = top.item;
    head.other_urls = Some(links);
    surfaced.push(head);
    surfaced.extend(rest.into_iter().map(|other| {
        let mut item = other.item;
        item.other_urls = Some(Vec::new());
        item
    }));

    (surfaced, dropped)
}
