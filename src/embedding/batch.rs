/// Bounded-batch vector scoring of search candidates
use super::{EmbeddingError, EmbeddingProvider};
use crate::corpus::{Document, TextExtractor};
use crate::store::cosine_similarity;
use ahash::AHashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Vector similarity of one candidate against the query
pub type Score = f32;

#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("Candidate embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Query deadline expired before the candidate was scored")]
    DeadlineExceeded,
}

/// Outcome of scoring a candidate set on the vector axis
#[derive(Debug, Clone, Default)]
pub struct VectorScores {
    /// Similarity per candidate id; failed or skipped candidates hold 0
    pub scores: AHashMap<String, f64>,
    /// Candidates with a real similarity
    pub scored: usize,
    /// Candidates whose embedding failed
    pub failed: usize,
    /// Candidates never attempted because the deadline passed
    pub skipped: usize,
    pub deadline_hit: bool,
}

/// Scores candidates in fixed-size batches: every call in a batch runs
/// concurrently and the whole batch settles before the next one starts.
pub struct CandidateEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl CandidateEmbedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Similarity of one candidate: its stored embedding when present,
    /// otherwise one generated from its text.
    async fn score_one(
        &self,
        query_embedding: &[f32],
        candidate: &Document,
        extractor: &dyn TextExtractor,
    ) -> Result<Score, ScoreError> {
        let embedding = match &candidate.embedding {
            Some(embedding) => embedding.clone(),
            None => self.provider.embed(&extractor.extract(candidate)).await?,
        };

        if embedding.len() != query_embedding.len() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: query_embedding.len(),
                actual: embedding.len(),
            }
            .into());
        }

        Ok(cosine_similarity(query_embedding, &embedding))
    }

    /// Reduce a candidate outcome to a score; every failure is worth 0
    fn settle(id: &str, outcome: Result<Score, ScoreError>) -> (Score, bool) {
        match outcome {
            Ok(score) => (score, true),
            Err(e) => {
                warn!("Vector score for candidate {} unavailable: {}", id, e);
                (0.0, false)
            }
        }
    }

    /// Score every candidate, never failing as a whole. With a deadline,
    /// in-flight calls are cut off at expiry and remaining batches skipped.
    pub async fn score_candidates(
        &self,
        query_embedding: &[f32],
        candidates: &[&Document],
        extractor: &dyn TextExtractor,
        deadline: Option<Instant>,
    ) -> VectorScores {
        let mut result = VectorScores::default();

        for (batch_idx, batch) in candidates.chunks(self.batch_size).enumerate() {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                result.deadline_hit = true;
                let remaining = &candidates[batch_idx * self.batch_size..];
                for candidate in remaining {
                    result.scores.insert(candidate.id.clone(), 0.0);
                }
                result.skipped += remaining.len();
                warn!(
                    "Query deadline reached, skipping vector scores for {} candidates",
                    remaining.len()
                );
                break;
            }

            let outcomes = futures::future::join_all(batch.iter().map(|candidate| async move {
                let fut = self.score_one(query_embedding, candidate, extractor);
                match deadline {
                    Some(d) => tokio::time::timeout_at(d, fut)
                        .await
                        .unwrap_or(Err(ScoreError::DeadlineExceeded)),
                    None => fut.await,
                }
            }))
            .await;

            for (candidate, outcome) in batch.iter().zip(outcomes) {
                if matches!(outcome, Err(ScoreError::DeadlineExceeded)) {
                    result.deadline_hit = true;
                }
                let (score, ok) = Self::settle(&candidate.id, outcome);
                if ok {
                    result.scored += 1;
                } else {
                    result.failed += 1;
                }
                result.scores.insert(candidate.id.clone(), score as f64);
            }

            debug!("Scored candidate batch {} ({} items)", batch_idx, batch.len());
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Embeds text as [len, 1]; fails on texts containing "fail"
    struct StubProvider {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Duration,
    }

    impl StubProvider {
        fn new(delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                delay,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for StubProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if text.contains("fail") {
                return Err(EmbeddingError::Unavailable("rate limited".to_string()));
            }
            Ok(vec![text.len() as f32, 1.0])
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    fn text_of(doc: &Document) -> String {
        doc.field_text("text").unwrap_or_default()
    }

    fn docs(texts: &[&str]) -> Vec<Document> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Document::new(i.to_string()).with_field("text", *t))
            .collect()
    }

    #[tokio::test]
    async fn test_failure_scores_zero_without_aborting() {
        let provider = Arc::new(StubProvider::new(Duration::ZERO));
        let embedder = CandidateEmbedder::new(provider.clone(), 5);
        let corpus = docs(&["alpha", "fail here", "beta"]);
        let candidates: Vec<&Document> = corpus.iter().collect();

        let result = embedder
            .score_candidates(&[5.0, 1.0], &candidates, &text_of, None)
            .await;

        assert_eq!(result.scores.len(), 3);
        assert_eq!(result.scores["1"], 0.0);
        assert!(result.scores["0"] > 0.0);
        assert_eq!(result.failed, 1);
        assert_eq!(result.scored, 2);
    }

    #[tokio::test]
    async fn test_stored_embeddings_skip_the_provider() {
        let provider = Arc::new(StubProvider::new(Duration::ZERO));
        let embedder = CandidateEmbedder::new(provider.clone(), 5);
        let corpus = vec![Document::new("a").with_embedding(vec![1.0, 0.0])];
        let candidates: Vec<&Document> = corpus.iter().collect();

        let result = embedder
            .score_candidates(&[1.0, 0.0], &candidates, &text_of, None)
            .await;

        assert!((result.scores["a"] - 1.0).abs() < 1e-6);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_scores_zero() {
        let provider = Arc::new(StubProvider::new(Duration::ZERO));
        let embedder = CandidateEmbedder::new(provider, 5);
        let corpus = vec![Document::new("a").with_embedding(vec![1.0, 0.0, 0.0])];
        let candidates: Vec<&Document> = corpus.iter().collect();

        let result = embedder
            .score_candidates(&[1.0, 0.0], &candidates, &text_of, None)
            .await;

        assert_eq!(result.scores["a"], 0.0);
        assert_eq!(result.failed, 1);
    }

    #[tokio::test]
    async fn test_concurrency_bounded_by_batch_size() {
        let provider = Arc::new(StubProvider::new(Duration::from_millis(10)));
        let embedder = CandidateEmbedder::new(provider.clone(), 3);
        let texts: Vec<String> = (0..10).map(|i| format!("doc {}", i)).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let corpus = docs(&refs);
        let candidates: Vec<&Document> = corpus.iter().collect();

        embedder
            .score_candidates(&[1.0, 1.0], &candidates, &text_of, None)
            .await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 10);
        assert!(provider.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_deadline_skips_remaining_batches() {
        let provider = Arc::new(StubProvider::new(Duration::from_millis(200)));
        let embedder = CandidateEmbedder::new(provider.clone(), 2);
        let corpus = docs(&["a", "b", "c", "d", "e", "f"]);
        let candidates: Vec<&Document> = corpus.iter().collect();

        let deadline = Instant::now() + Duration::from_millis(50);
        let result = embedder
            .score_candidates(&[1.0, 1.0], &candidates, &text_of, Some(deadline))
            .await;

        assert!(result.deadline_hit);
        assert_eq!(result.scores.len(), 6);
        assert_eq!(result.scored, 0);
        assert_eq!(result.failed, 2);
        assert_eq!(result.skipped, 4);
        assert!(result.scores.values().all(|s| *s == 0.0));
    }
}
