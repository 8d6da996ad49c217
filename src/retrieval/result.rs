//! Scored results and search response metadata

use super::EnhancedQuery;
use crate::corpus::Document;
use serde::{Deserialize, Serialize};

/// Per-query scoring record for one document, discarded after the response
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub id: String,
    pub raw_bm25: f64,
    /// `None` when the document was not a candidate or vector scoring was skipped
    pub raw_vector_sim: Option<f64>,
    pub raw_rrf: f64,
    pub normalized_bm25: f64,
    pub normalized_vector: f64,
    pub normalized_rrf: f64,
    pub composite_score: f64,
}

/// Pre-normalization values, for debugging rankings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawScores {
    pub raw_bm25: f64,
    pub raw_vector: Option<f64>,
    pub raw_rrf: f64,
    pub composite: f64,
    /// Whether the document made the vector candidate set
    pub candidate: bool,
}

/// A ranked document with its sub-scores on a 0-100 scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredItem {
    #[serde(flatten)]
    pub document: Document,
    pub match_score: u32,
    pub bm25_score: u32,
    pub vector_score: u32,
    pub rrf_score: u32,
    pub debug: RawScores,
}

impl ScoredItem {
    pub fn id(&self) -> &str {
        &self.document.id
    }
}

/// Scale a value to an integer percentage, floored at 0.
///
/// Composites only stay within 100 when the weights sum to at most 1, so the
/// upper end is left open for heavier profiles to keep their ordering.
pub fn to_percent(value: f64) -> u32 {
    if !value.is_finite() {
        return 0;
    }
    (value * 100.0).round().max(0.0) as u32
}

/// Stage timings and counters for one search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Performance {
    pub total_ms: u64,
    pub enhance_ms: u64,
    pub bm25_ms: u64,
    pub vector_ms: u64,
    pub corpus_size: usize,
    pub candidates: usize,
    pub vector_scored: usize,
    pub vector_failed: usize,
    pub vector_skipped: usize,
    /// Query embedding was unavailable, so no vector scoring ran
    pub vector_stage_skipped: bool,
    pub deadline_hit: bool,
    pub results: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMetadata {
    pub query: EnhancedQuery,
    pub profile: String,
    pub performance: Performance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<ScoredItem>,
    pub metadata: SearchMetadata,
}

impl SearchResponse {
    pub fn ids(&self) -> Vec<&str> {
        self.results.iter().map(ScoredItem::id).collect()
    }
}
