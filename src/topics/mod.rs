// Topics of interest and their embedding anchors.

pub mod anchors;
pub mod definition;
pub mod precomputed;

pub use anchors::{AnchorCache, AnchorSet, TopicAnchor};
pub use definition::{load_topics, TopicDefinition};
pub use precomputed::{AnchorFileError, PrecomputedAnchors};
