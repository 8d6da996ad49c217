//! Cosine similarity and exhaustive nearest-neighbour ranking

use std::cmp::Ordering;

/// Cosine similarity in [-1, 1].
///
/// Returns 0.0 when either vector has zero magnitude or the dimensions differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Distance as reported by the store: `1 - similarity`
pub fn similarity_to_distance(similarity: f32) -> f32 {
    1.0 - similarity
}

/// Score every candidate and keep the `top_k` best as `(index, similarity)`,
/// highest first. Ties keep insertion order.
pub fn rank_by_similarity(query: &[f32], candidates: &[Vec<f32>], top_k: usize) -> Vec<(usize, f32)> {
    let mut scored: Vec<(usize, f32)> = candidates
        .iter()
        .enumerate()
        .map(|(idx, candidate)| (idx, cosine_similarity(query, candidate)))
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
    scored.truncate(top_k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vectors() {
        let v = vec![0.3, -1.2, 4.5, 0.01];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_is_exactly_zero() {
        let v = vec![1.0, 2.0, 3.0];
        let zero = vec![0.0; 3];
        assert_eq!(cosine_similarity(&v, &zero), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn test_dimension_mismatch_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_bounds() {
        let pairs = [
            (vec![1.0, 0.0], vec![-1.0, 0.0]),
            (vec![1.0, 2.0, 3.0], vec![-3.0, 0.5, 7.0]),
            (vec![1e-3, 1e3], vec![1e3, 1e-3]),
            (vec![0.1, 0.1, 0.1], vec![0.1, 0.1, 0.1]),
        ];
        for (a, b) in pairs {
            let s = cosine_similarity(&a, &b);
            assert!((-1.0..=1.0).contains(&s), "similarity {} out of range", s);
        }
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rank_order_and_truncation() {
        let candidates = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.9, 0.1]];
        let ranked = rank_by_similarity(&[1.0, 0.0], &candidates, 2);

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0, 1);
        assert_eq!(ranked[1].0, 2);
        assert!(ranked[0].1 >= ranked[1].1);
    }

    #[test]
    fn test_rank_ties_keep_insertion_order() {
        let candidates = vec![vec![1.0, 0.0], vec![2.0, 0.0], vec![3.0, 0.0]];
        let ranked = rank_by_similarity(&[1.0, 0.0], &candidates, 10);
        let order: Vec<usize> = ranked.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }
}
