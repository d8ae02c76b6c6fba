// topicsift: embedding-based relevance prefilter for article digests
//
// This is the library root. Data flows articles -> embeddings (cached in db)
// -> topics (anchors) -> filter (scoring, clustering) -> output.

pub mod articles;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod filter;
pub mod output;
pub mod topics;
