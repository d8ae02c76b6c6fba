// Relevance filtering and near-duplicate collapse.

pub mod cluster;
pub mod pipeline;
pub mod rank;
pub mod scorer;

pub use cluster::{Cluster, ClusterEngine};
pub use pipeline::{ClusterScope, FilterConfig, FilterOutcome, FilterPipeline, FilterStats, OutputPolicy};
pub use scorer::{ScoredItem, Scorer};
