// Near-duplicate removal by randomized greedy leader clustering.
//
// Repeatedly draw a random seed from the unclustered pool and absorb every
// remaining item at least `threshold`-similar to it. Each cluster then picks
// one kernel: the member closest to the cluster centroid, with ties broken by
// relevance score and then by URL so that the choice depends only on
// membership, never on the draw order.
//
// The random source is always passed in; the same items, order, and seed
// produce the same clusters.

use std::cmp::Ordering;

use rand::Rng;
use tracing::debug;

use crate::articles::{Item, PeerLink};
use crate::embeddings::vector::{centroid, cosine, cosine_distance};

use super::scorer::ScoredItem;

/// Grid step for centroid similarities when picking a kernel.
pub const KERNEL_TIE_EPSILON: f64 = 1e-9;

/// A non-kernel member and its distance to the kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct Peer {
    pub member: ScoredItem,
    pub distance: f64,
}

/// One cluster: its kernel plus the other members, nearest first.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub kernel: ScoredItem,
    pub others: Vec<Peer>,
}

impl Cluster {
    /// Build a cluster from its members, choosing the kernel.
    ///
    /// `members` must be non-empty.
    fn from_members(mut members: Vec<ScoredItem>) -> Self {
        let kernel_index = select_kernel(&members);
        let kernel = members.swap_remove(kernel_index);
        let mut others: Vec<Peer> = members
            .into_iter()
            .map(|member| Peer {
                distance: cosine_distance(&kernel.vector, &member.vector),
                member,
            })
            .collect();
        others.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.member.url().cmp(b.member.url()))
        });
        Self { kernel, others }
    }

    pub fn len(&self) -> usize {
        self.others.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Collapse to the kernel alone, carrying up to `max_cluster_size - 1`
    /// nearest peers in `other_urls`. Returns the item and how many members
    /// were dropped by the cap.
    pub fn into_kernel(self, max_cluster_size: usize) -> (Item, usize) {
        let cap = max_cluster_size.max(1) - 1;
        let dropped = self.others.len().saturating_sub(cap);
        let mut kernel = self.kernel.item;
        kernel.other_urls = Some(
            self.others
                .iter()
                .take(cap)
                .map(|peer| PeerLink {
                    url: peer.member.item.url.clone(),
                    distance: peer.distance,
                })
                .collect(),
        );
        (kernel, dropped)
    }

    /// Surface the kernel followed by up to `max_cluster_size - 1` nearest
    /// members. Only the kernel carries peer links; surfaced members get an
    /// empty `other_urls`. Returns the items and the count dropped by the cap.
    pub fn into_surfaced(self, max_cluster_size: usize) -> (Vec<Item>, usize) {
        let cap = max_cluster_size.max(1) - 1;
        let members: Vec<Item> = self
            .others
            .iter()
            .take(cap)
            .map(|peer| {
                let mut item = peer.member.item.clone();
                item.other_urls = Some(Vec::new());
                item
            })
            .collect();
        let (kernel, dropped) = self.into_kernel(max_cluster_size);

        let mut surfaced = Vec::with_capacity(members.len() + 1);
        surfaced.push(kernel);
        surfaced.extend(members);
        (surfaced, dropped)
    }
}

/// Index of the member closest to the members' centroid.
///
/// Centroid similarities are compared on a KERNEL_TIE_EPSILON grid. Ties on
/// the grid go to the higher score, then to the lexicographically smaller
/// URL. Members are visited in URL order so the centroid sum, and with it
/// the winner, is the same for every ordering of one membership.
pub fn select_kernel(members: &[ScoredItem]) -> usize {
    let mut order: Vec<usize> = (0..members.len()).collect();
    order.sort_by(|&a, &b| members[a].url().cmp(members[b].url()));

    let center = centroid(&order.iter().map(|&i| members[i].vector.as_slice()).collect::<Vec<_>>());
    let grid: Vec<i64> = members
        .iter()
        .map(|m| similarity_grid(cosine(&m.vector, &center)))
        .collect();

    let Some((&first, rest)) = order.split_first() else {
        return 0;
    };
    let mut best = first;
    for &candidate in rest {
        if outranks((grid[candidate], &members[candidate]), (grid[best], &members[best])) {
            best = candidate;
        }
    }
    best
}

fn similarity_grid(similarity: f64) -> i64 {
    (similarity / KERNEL_TIE_EPSILON).round() as i64
}

fn outranks(a: (i64, &ScoredItem), b: (i64, &ScoredItem)) -> bool {
    let (a_grid, a_item) = a;
    let (b_grid, b_item) = b;
    a_grid
        .cmp(&b_grid)
        .then_with(|| a_item.score.total_cmp(&b_item.score))
        .then_with(|| b_item.url().cmp(a_item.url()))
        == Ordering::Greater
}

/// Greedy leader clustering at a fixed similarity threshold.
#[derive(Debug, Clone, Copy)]
pub struct ClusterEngine {
    threshold: f64,
}

impl ClusterEngine {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Partition `items` into clusters. Every input item ends up in exactly
    /// one cluster, as its kernel or as one of its others.
    pub fn cluster<R: Rng + ?Sized>(&self, items: Vec<ScoredItem>, rng: &mut R) -> Vec<Cluster> {
        let total = items.len();
        let mut pool = items;
        let mut clusters = Vec::new();

        while !pool.is_empty() {
            let seed = pool.remove(rng.random_range(0..pool.len()));
            let (joined, rest): (Vec<ScoredItem>, Vec<ScoredItem>) = pool
                .into_iter()
                .partition(|candidate| cosine(&seed.vector, &candidate.vector) >= self.threshold);
            pool = rest;

            let mut members = Vec::with_capacity(joined.len() + 1);
            members.push(seed);
            members.extend(joined);
            clusters.push(Cluster::from_members(members));
        }

        debug!(
            items = total,
            clusters = clusters.len(),
            threshold = self.threshold,
            "Clustered bucket"
        );
        clusters
    }
}
