// Embedding providers: trait, adapters, and the vector math they feed.
//
// EmbeddingProvider is the only interface the filter pipeline depends on.
// OpenAiEmbedder talks to a remote batch API; OnnxEmbedder runs a sentence
// transformer locally. Both return L2-normalized vectors.

pub mod download;
pub mod onnx;
pub mod openai;
pub mod traits;
pub mod vector;

pub use traits::{EmbedError, EmbeddingProvider, DEFAULT_BATCH_SIZE};
