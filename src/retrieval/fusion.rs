//! Reciprocal Rank Fusion and min-max score normalization

use ahash::AHashMap;
use std::hash::Hash;

/// Fixed RRF smoothing constant
pub const DEFAULT_RRF_K: f64 = 60.0;

/// Fuse ranked lists into one consensus score per item.
///
/// RRF formula: score(id) = sum over lists of 1 / (k + rank), rank starting
/// at 1. An item missing from a list gets nothing from that list.
pub fn reciprocal_rank_fusion<T>(ranked_lists: &[Vec<T>], k: f64) -> AHashMap<T, f64>
where
    T: Clone + Eq + Hash,
{
    let mut scores: AHashMap<T, f64> = AHashMap::new();

    for list in ranked_lists {
        for (rank, item) in list.iter().enumerate() {
            *scores.entry(item.clone()).or_insert(0.0) += 1.0 / (k + rank as f64 + 1.0);
        }
    }

    scores
}

/// Min-max scale scores into [0, 1].
///
/// When every score is equal (including a single item) every output is 0, so
/// a signal that cannot tell items apart contributes nothing.
pub fn normalize_scores<T>(scores: &AHashMap<T, f64>) -> AHashMap<T, f64>
where
    T: Clone + Eq + Hash,
{
    let (min, max) = scores
        .values()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &s| {
            (lo.min(s), hi.max(s))
        });
    let range = max - min;

    scores
        .iter()
        .map(|(id, &score)| {
            let normalized = if range > 0.0 && range.is_finite() {
                ((score - min) / range).clamp(0.0, 1.0)
            } else {
                0.0
            };
            (id.clone(), normalized)
        })
        .collect()
}
