//! Lexical relevance: tokenization and BM25+ scoring

mod bm25;
mod tokenizer;

pub use bm25::{calculate_bm25_scores, Bm25Params, Bm25Scorer};
pub use tokenizer::tokenize;
