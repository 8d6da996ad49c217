//! hyrank - Hybrid retrieval and ranking
//!
//! Ranks a corpus of catalog items against a free-text query by combining
//! BM25+ lexical scores, embedding similarity over a bounded candidate set and
//! Reciprocal Rank Fusion, backed by a small persistent vector store.

pub mod cli;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod lexical;
pub mod retrieval;
pub mod store;

pub use error::{HyrankError, Result};
