//! Hybrid search combining lexical, vector and rank-fusion signals

use super::candidate::{select_candidates, Candidate};
use super::enhancer::{EnhancedQuery, PassthroughEnhancer, QueryEnhancer};
use super::fusion::{normalize_scores, reciprocal_rank_fusion, DEFAULT_RRF_K};
use super::result::{
    to_percent, Performance, RawScores, ScoredCandidate, ScoredItem, SearchMetadata,
    SearchResponse,
};
use super::weights::{ProfileSet, WeightProfile, WeightSelection};
use crate::corpus::{deduplicate_documents, Document, FieldExtractor, TextExtractor};
use crate::embedding::{CandidateEmbedder, EmbeddingProvider, VectorScores};
use crate::lexical::{tokenize, Bm25Params, Bm25Scorer};
use ahash::{AHashMap, AHashSet};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Query text cannot be empty")]
    EmptyQuery,

    #[error("Invalid weights: {0}")]
    InvalidWeights(String),

    #[error("Unknown weight profile: {0}")]
    UnknownProfile(String),
}

/// Tuning for a [`HybridSearcher`]
#[derive(Debug, Clone)]
pub struct HybridConfig {
    /// Documents passed from the lexical pass to vector scoring
    pub candidate_limit: usize,
    /// Concurrent embedding calls per batch
    pub embedding_batch_size: usize,
    pub rrf_k: f64,
    pub bm25: Bm25Params,
    /// Per-query deadline for collaborator calls
    pub query_timeout: Option<Duration>,
    pub profiles: ProfileSet,
    /// Used when a search passes no explicit selection
    pub default_selection: WeightSelection,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            candidate_limit: 50,
            embedding_batch_size: 5,
            rrf_k: DEFAULT_RRF_K,
            bm25: Bm25Params::default(),
            query_timeout: Some(Duration::from_secs(30)),
            profiles: ProfileSet::default(),
            default_selection: WeightSelection::default(),
        }
    }
}

/// Hybrid searcher: BM25+ over the whole corpus, vector similarity over a
/// bounded candidate set, RRF across both rankings, then a weighted composite.
pub struct HybridSearcher {
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    enhancer: Arc<dyn QueryEnhancer>,
    extractor: Arc<dyn TextExtractor>,
    config: HybridConfig,
}

impl HybridSearcher {
    /// Create a searcher with passthrough enhancement and the catalog field extractor
    pub fn new(embedding_provider: Arc<dyn EmbeddingProvider>, config: HybridConfig) -> Self {
        Self {
            embedding_provider: Some(embedding_provider),
            enhancer: Arc::new(PassthroughEnhancer),
            extractor: Arc::new(FieldExtractor::default()),
            config,
        }
    }

    /// Searcher without an embedding provider; every query ranks on BM25 and RRF only
    pub fn lexical_only(config: HybridConfig) -> Self {
        Self {
            embedding_provider: None,
            enhancer: Arc::new(PassthroughEnhancer),
            extractor: Arc::new(FieldExtractor::default()),
            config,
        }
    }

    pub fn with_enhancer(mut self, enhancer: Arc<dyn QueryEnhancer>) -> Self {
        self.enhancer = enhancer;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &HybridConfig {
        &self.config
    }

    /// Rank `corpus` against `query`.
    ///
    /// Only an empty query or unusable weights fail; collaborator failures
    /// degrade the ranking instead.
    pub async fn search(
        &self,
        query: &str,
        corpus: &[Document],
        selection: Option<&WeightSelection>,
    ) -> Result<SearchResponse, SearchError> {
        if tokenize(query).is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let (profile_name, weights) = self.resolve_weights(query, selection)?;

        let started = Instant::now();
        let deadline = self
            .config
            .query_timeout
            .map(|timeout| tokio::time::Instant::now() + timeout);
        let mut performance = Performance::default();

        let corpus = unique_corpus(corpus);
        performance.corpus_size = corpus.len();

        // Step 1: Query enhancement
        let stage = Instant::now();
        let enhanced = self.enhance(query, deadline).await;
        performance.enhance_ms = elapsed_ms(stage);
        debug!(
            "Enhanced query '{}' -> '{}' ({} terms)",
            enhanced.original,
            enhanced.corrected,
            enhanced.expanded.len()
        );

        // Step 2: BM25+ over the full corpus
        let stage = Instant::now();
        let bm25_scores = Bm25Scorer::build(&corpus, self.extractor.as_ref(), self.config.bm25)
            .score(&enhanced.expanded);
        performance.bm25_ms = elapsed_ms(stage);

        // Step 3: Candidate selection
        let candidates = select_candidates(&corpus, &bm25_scores, self.config.candidate_limit);
        performance.candidates = candidates.len();
        debug!(
            "BM25 scored {} documents in {}ms, {} candidates",
            corpus.len(),
            performance.bm25_ms,
            candidates.len()
        );

        // Steps 4-5: Query embedding, then candidate similarity in batches
        let stage = Instant::now();
        let vector = self
            .score_vectors(&enhanced, &candidates, deadline)
            .await;
        performance.vector_ms = elapsed_ms(stage);
        match &vector {
            Some(v) => {
                performance.vector_scored = v.scored;
                performance.vector_failed = v.failed;
                performance.vector_skipped = v.skipped;
                performance.deadline_hit = v.deadline_hit;
                debug!(
                    "Vector scored {}/{} candidates in {}ms",
                    v.scored,
                    candidates.len(),
                    performance.vector_ms
                );
            }
            None => performance.vector_stage_skipped = true,
        }

        // Step 6: Fusion over the candidate rankings
        let rrf_scores = self.fuse(&candidates, vector.as_ref());

        // Step 7: Normalization
        let bm25_norm = normalize_scores(&bm25_scores);
        let vector_norm = vector
            .as_ref()
            .map(|v| normalize_scores(&v.scores))
            .unwrap_or_default();
        let rrf_norm = normalize_scores(&rrf_scores);

        // Step 8: Composite score
        let candidate_ids: AHashSet<&str> = candidates.iter().map(Candidate::id).collect();
        let mut scored: Vec<(&Document, ScoredCandidate)> = corpus
            .iter()
            .map(|doc| {
                let id = doc.id.as_str();
                let normalized_bm25 = bm25_norm.get(id).copied().unwrap_or(0.0);
                let normalized_vector = vector_norm.get(id).copied().unwrap_or(0.0);
                let normalized_rrf = rrf_norm.get(id).copied().unwrap_or(0.0);

                let record = ScoredCandidate {
                    id: doc.id.clone(),
                    raw_bm25: bm25_scores.get(id).copied().unwrap_or(0.0),
                    raw_vector_sim: vector.as_ref().and_then(|v| v.scores.get(id).copied()),
                    raw_rrf: rrf_scores.get(id).copied().unwrap_or(0.0),
                    normalized_bm25,
                    normalized_vector,
                    normalized_rrf,
                    composite_score: weights
                        .combine(normalized_bm25, normalized_vector, normalized_rrf)
                        .max(0.0),
                };
                (doc, record)
            })
            .collect();

        // Step 9: Sort, then drop non-matches. The sort is stable, so equal
        // composites keep corpus order.
        scored.sort_by(|a, b| b.1.composite_score.total_cmp(&a.1.composite_score));

        let results: Vec<ScoredItem> = scored
            .into_iter()
            .filter(|(_, record)| to_percent(record.composite_score) > 0)
            .map(|(doc, record)| {
                let candidate = candidate_ids.contains(record.id.as_str());
                to_item(doc, record, candidate)
            })
            .collect();

        performance.results = results.len();
        performance.total_ms = elapsed_ms(started);
        debug!(
            "Hybrid search returned {} results in {}ms (profile {})",
            results.len(),
            performance.total_ms,
            profile_name
        );

        Ok(SearchResponse {
            results,
            metadata: SearchMetadata {
                query: enhanced,
                profile: profile_name,
                performance,
            },
        })
    }

    fn resolve_weights(
        &self,
        query: &str,
        selection: Option<&WeightSelection>,
    ) -> Result<(String, WeightProfile), SearchError> {
        let selection = selection.unwrap_or(&self.config.default_selection);

        let (name, weights) = self
            .config
            .profiles
            .resolve(selection, query)
            .ok_or_else(|| match selection {
                WeightSelection::Named(name) => SearchError::UnknownProfile(name.clone()),
                _ => SearchError::UnknownProfile(format!("{:?}", selection)),
            })?;

        if !weights.is_valid() {
            return Err(SearchError::InvalidWeights(format!(
                "profile '{}' has negative or non-finite weights: {:?}",
                name, weights
            )));
        }

        Ok((name, weights))
    }

    /// Enhancer failure or timeout falls back to the raw query's tokens
    async fn enhance(&self, query: &str, deadline: Option<tokio::time::Instant>) -> EnhancedQuery {
        let outcome = match deadline {
            Some(d) => match tokio::time::timeout_at(d, self.enhancer.enhance(query)).await {
                Ok(outcome) => outcome.map_err(|e| e.to_string()),
                Err(_) => Err("deadline exceeded".to_string()),
            },
            None => self.enhancer.enhance(query).await.map_err(|e| e.to_string()),
        };

        outcome.unwrap_or_else(|e| {
            warn!("Query enhancement failed, using raw query: {}", e);
            EnhancedQuery::passthrough(query)
        })
    }

    /// `None` when the vector stage is skipped for this query
    async fn score_vectors(
        &self,
        enhanced: &EnhancedQuery,
        candidates: &[Candidate<'_>],
        deadline: Option<tokio::time::Instant>,
    ) -> Option<VectorScores> {
        let provider = self.embedding_provider.as_ref()?;
        if candidates.is_empty() {
            return None;
        }

        let embed = provider.embed(&enhanced.corrected);
        let query_embedding = match deadline {
            Some(d) => tokio::time::timeout_at(d, embed)
                .await
                .map_err(|_| "deadline exceeded".to_string())
                .and_then(|r| r.map_err(|e| e.to_string())),
            None => embed.await.map_err(|e| e.to_string()),
        };

        let query_embedding = match query_embedding {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("Query embedding unavailable, skipping vector scoring: {}", e);
                return None;
            }
        };

        let documents: Vec<&Document> = candidates.iter().map(|c| c.document).collect();
        let embedder = CandidateEmbedder::new(provider.clone(), self.config.embedding_batch_size);

        Some(
            embedder
                .score_candidates(&query_embedding, &documents, self.extractor.as_ref(), deadline)
                .await,
        )
    }

    /// RRF over the BM25 candidate ranking and, when present, the vector ranking
    fn fuse(&self, candidates: &[Candidate<'_>], vector: Option<&VectorScores>) -> AHashMap<String, f64> {
        let bm25_ranked: Vec<String> = candidates.iter().map(|c| c.id().to_string()).collect();
        let mut lists = vec![bm25_ranked];

        if let Some(vector) = vector {
            let mut by_vector: Vec<(&str, f64)> = candidates
                .iter()
                .map(|c| (c.id(), vector.scores.get(c.id()).copied().unwrap_or(0.0)))
                .collect();
            by_vector.sort_by(|a, b| b.1.total_cmp(&a.1));
            lists.push(by_vector.into_iter().map(|(id, _)| id.to_string()).collect());
        }

        reciprocal_rank_fusion(&lists, self.config.rrf_k)
    }
}

/// Borrow the corpus unless it repeats ids
fn unique_corpus(corpus: &[Document]) -> Cow<'_, [Document]> {
    let mut seen = AHashSet::with_capacity(corpus.len());
    if corpus.iter().all(|doc| seen.insert(doc.id.as_str())) {
        Cow::Borrowed(corpus)
    } else {
        Cow::Owned(deduplicate_documents(corpus.to_vec()))
    }
}

fn to_item(document: &Document, record: ScoredCandidate, candidate: bool) -> ScoredItem {
    let mut document = document.clone();
    document.embedding = None;

    ScoredItem {
        document,
        match_score: to_percent(record.composite_score),
        bm25_score: to_percent(record.normalized_bm25),
        vector_score: to_percent(record.normalized_vector),
        rrf_score: to_percent(record.normalized_rrf),
        debug: RawScores {
            raw_bm25: record.raw_bm25,
            raw_vector: record.raw_vector_sim,
            raw_rrf: record.raw_rrf,
            composite: record.composite_score,
            candidate,
        },
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingError;
    use crate::retrieval::DictionaryEnhancer;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    /// One dimension per vocabulary word, counts as components
    struct VocabProvider {
        vocab: Vec<&'static str>,
    }

    #[async_trait]
    impl EmbeddingProvider for VocabProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let tokens = crate::lexical::tokenize(text);
            Ok(self
                .vocab
                .iter()
                .map(|w| tokens.iter().filter(|t| t == w).count() as f32)
                .collect())
        }

        fn dimension(&self) -> usize {
            self.vocab.len()
        }

        fn model_name(&self) -> &str {
            "vocab"
        }
    }

    fn text_doc(id: &str, text: &str) -> Document {
        Document::new(id).with_field("text", text)
    }

    fn searcher() -> HybridSearcher {
        let provider = VocabProvider {
            vocab: vec!["kubernetes", "cluster", "autoscaling", "scaling", "banking", "cloud"],
        };
        HybridSearcher::new(Arc::new(provider), HybridConfig::default())
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let result = searcher().search("   ", &[text_doc("1", "x")], None).await;
        assert!(matches!(result, Err(SearchError::EmptyQuery)));

        let result = searcher().search("???", &[text_doc("1", "x")], None).await;
        assert!(matches!(result, Err(SearchError::EmptyQuery)));
    }

    #[tokio::test]
    async fn test_unknown_profile_rejected() {
        let selection = WeightSelection::Named("aggressive".to_string());
        let result = searcher()
            .search("kubernetes", &[text_doc("1", "kubernetes")], Some(&selection))
            .await;
        assert!(matches!(result, Err(SearchError::UnknownProfile(_))));
    }

    #[tokio::test]
    async fn test_negative_weights_rejected() {
        let selection = WeightSelection::Fixed(WeightProfile::new(-1.0, 0.5, 0.5));
        let result = searcher()
            .search("kubernetes", &[text_doc("1", "kubernetes")], Some(&selection))
            .await;
        assert!(matches!(result, Err(SearchError::InvalidWeights(_))));
    }

    #[tokio::test]
    async fn test_empty_corpus() {
        let response = searcher().search("kubernetes", &[], None).await.unwrap();
        assert!(response.results.is_empty());
        assert!(response.metadata.performance.vector_stage_skipped);
    }

    #[tokio::test]
    async fn test_duplicate_ids_scored_once() {
        let corpus = vec![
            text_doc("1", "kubernetes cluster"),
            text_doc("2", "banking"),
            text_doc("1", "kubernetes again"),
        ];

        let response = searcher().search("kubernetes", &corpus, None).await.unwrap();

        assert_eq!(response.metadata.performance.corpus_size, 2);
        assert_eq!(response.ids(), vec!["1"]);
    }

    #[tokio::test]
    async fn test_synonym_expansion_reaches_autoscaling() {
        let enhancer = DictionaryEnhancer::new(
            BTreeMap::new(),
            BTreeMap::from([("scaling".to_string(), vec!["autoscaling".to_string()])]),
        );
        let searcher = searcher().with_enhancer(Arc::new(enhancer));
        let corpus = vec![
            text_doc("1", "cloud native kubernetes deployment"),
            text_doc("2", "banking customer support chatbot"),
            text_doc("3", "kubernetes cluster autoscaling"),
        ];

        let response = searcher.search("kubernetes scaling", &corpus, None).await.unwrap();

        assert_eq!(response.ids(), vec!["3", "1"]);
        assert!(response.metadata.query.expanded.contains(&"autoscaling".to_string()));
        assert!(response.results[0].match_score > response.results[1].match_score);
    }

    #[tokio::test]
    async fn test_heavy_weights_keep_scores_apart() {
        let selection = WeightSelection::Fixed(WeightProfile::new(1.0, 1.0, 1.0));
        let corpus = vec![
            text_doc("1", "kubernetes kubernetes cluster"),
            text_doc("2", "kubernetes banking"),
            text_doc("3", "banking"),
        ];

        let response = searcher()
            .search("kubernetes", &corpus, Some(&selection))
            .await
            .unwrap();

        assert_eq!(response.ids(), vec!["1", "2"]);
        assert_eq!(response.results[0].match_score, 300);
        assert!(response.results[0].match_score > response.results[1].match_score);
        assert!(response.results[1].match_score > 0);
    }

    #[tokio::test]
    async fn test_lexical_only_uses_bm25_and_rrf() {
        let searcher = HybridSearcher::lexical_only(HybridConfig::default());
        let corpus = vec![
            text_doc("1", "kubernetes kubernetes operators"),
            text_doc("2", "banking"),
            text_doc("3", "kubernetes"),
        ];

        let response = searcher.search("kubernetes", &corpus, None).await.unwrap();

        assert!(response.metadata.performance.vector_stage_skipped);
        assert!(response.results.iter().all(|r| r.vector_score == 0));
        assert!(response.results.iter().all(|r| r.debug.raw_vector.is_none()));
        assert!(!response.ids().contains(&"2"));
    }

    #[tokio::test]
    async fn test_single_document_is_degenerate() {
        // Every signal normalizes to 0 when nothing can be told apart
        let response = searcher()
            .search("kubernetes", &[text_doc("1", "kubernetes")], None)
            .await
            .unwrap();
        assert!(response.results.is_empty());
    }

    #[tokio::test]
    async fn test_results_strip_embeddings() {
        let corpus = vec![
            text_doc("1", "kubernetes").with_embedding(vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            text_doc("2", "banking"),
        ];
        let response = searcher().search("kubernetes", &corpus, None).await.unwrap();

        assert_eq!(response.ids(), vec!["1"]);
        assert!(response.results[0].document.embedding.is_none());
        assert!(response.results[0].debug.candidate);
    }
}
