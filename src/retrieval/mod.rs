//! Hybrid retrieval and ranking
//!
//! BM25+ scores the whole corpus, the top candidates get vector similarity,
//! and Reciprocal Rank Fusion over both rankings adds a consensus signal. The
//! three normalized signals are combined with a weight profile.

mod candidate;
mod enhancer;
mod fusion;
mod hybrid;
mod result;
mod weights;

pub use candidate::{select_candidates, Candidate};
pub use enhancer::{DictionaryEnhancer, EnhanceError, EnhancedQuery, PassthroughEnhancer, QueryEnhancer};
pub use fusion::{normalize_scores, reciprocal_rank_fusion, DEFAULT_RRF_K};
pub use hybrid::{HybridConfig, HybridSearcher, SearchError};
pub use result::{
    to_percent, Performance, RawScores, ScoredCandidate, ScoredItem, SearchMetadata,
    SearchResponse,
};
pub use weights::{
    builtin_profiles, AdaptiveThresholds, ProfileSet, WeightProfile, WeightSelection, BALANCED,
    CONSENSUS, KEYWORD, SEMANTIC,
};
