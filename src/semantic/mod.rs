//! # Semantic Expansion
//!
//! Bridges free-text interest terms to the graph's controlled vocabulary:
//! the targets of labelling edges (`tagged_as`, `about`, ...) are embedded
//! once per graph, and a query term expands to the vocabulary terms whose
//! embeddings are closest to its own.
//!
//! | Backend | Feature | Description |
//! |---------|---------|-------------|
//! | `HashingEmbedder` | (default) | Offline feature hashing, deterministic |
//! | `HttpEmbedder` | `http` | OpenAI-compatible `/embeddings` service |

pub mod embedder;
pub mod index;
#[cfg(feature = "http")]
pub mod http;

pub use embedder::{Embedder, HashingEmbedder, cosine_similarity};
pub use index::{ScoredTerm, SemanticIndex, normalize_term};
#[cfg(feature = "http")]
pub use http::HttpEmbedder;
