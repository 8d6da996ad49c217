//! Embedding: text-to-vector providers and candidate vector scoring
//!
//! - `EmbeddingProvider` abstracts the embedding backend (local FastEmbed or a
//!   remote API implemented by the caller)
//! - `CandidateEmbedder` scores a bounded candidate set against the query in
//!   fixed-size concurrent batches, turning every failure into a zero score
mod batch;
mod provider;

pub use batch::{CandidateEmbedder, Score, ScoreError, VectorScores};
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
