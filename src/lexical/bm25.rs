//! BM25+ lexical scoring over a full corpus
//!
//! score(t, d) = IDF(t) * ((k1 + 1) * tf / (k1 * (1 - b + b * |d| / avgdl) + tf) + delta)
//! IDF(t)      = ln((N - n_t + 0.5) / (n_t + 0.5) + 1)
//!
//! The delta term applies only when `t` occurs in `d`, so a document matching
//! no query term scores exactly 0.

use super::tokenize;
use crate::corpus::{Document, TextExtractor};
use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};

/// BM25+ constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    /// Term frequency saturation
    pub k1: f64,
    /// Length normalisation strength
    pub b: f64,
    /// Lower bound added for every matching term
    pub delta: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            delta: 0.5,
        }
    }
}

/// Term statistics for one corpus, built once per query
pub struct Bm25Scorer {
    params: Bm25Params,
    /// Per document: (id, term frequencies, length in tokens)
    docs: Vec<(String, AHashMap<String, usize>, usize)>,
    doc_freq: AHashMap<String, usize>,
    avgdl: f64,
}

impl Bm25Scorer {
    /// Tokenize every document's extracted text and gather statistics
    pub fn build(documents: &[Document], extractor: &dyn TextExtractor, params: Bm25Params) -> Self {
        let mut doc_freq: AHashMap<String, usize> = AHashMap::new();
        let mut total_len = 0usize;

        let docs: Vec<(String, AHashMap<String, usize>, usize)> = documents
            .iter()
            .map(|doc| {
                let tokens = tokenize(&extractor.extract(doc));
                let mut tf: AHashMap<String, usize> = AHashMap::new();
                for token in &tokens {
                    *tf.entry(token.clone()).or_insert(0) += 1;
                }
                for term in tf.keys() {
                    *doc_freq.entry(term.clone()).or_insert(0) += 1;
                }
                total_len += tokens.len();
                (doc.id.clone(), tf, tokens.len())
            })
            .collect();

        let avgdl = if docs.is_empty() {
            0.0
        } else {
            total_len as f64 / docs.len() as f64
        };

        Self {
            params,
            docs,
            doc_freq,
            avgdl,
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn avgdl(&self) -> f64 {
        self.avgdl
    }

    pub fn idf(&self, term: &str) -> f64 {
        let n = self.docs.len() as f64;
        let n_t = self.doc_freq.get(term).copied().unwrap_or(0) as f64;
        ((n - n_t + 0.5) / (n_t + 0.5) + 1.0).ln()
    }

    /// Contribution of a single term to a document of the given length
    fn term_score(&self, idf: f64, tf: usize, doc_len: usize) -> f64 {
        if tf == 0 {
            return 0.0;
        }
        let Bm25Params { k1, b, delta } = self.params;
        let tf = tf as f64;
        let length_ratio = if self.avgdl > 0.0 {
            doc_len as f64 / self.avgdl
        } else {
            0.0
        };
        idf * ((k1 + 1.0) * tf / (k1 * (1.0 - b + b * length_ratio) + tf) + delta)
    }

    /// Score every document. Terms are lowercased and deduplicated; every
    /// document gets an entry, 0 when nothing matches.
    pub fn score(&self, query_terms: &[String]) -> AHashMap<String, f64> {
        let mut seen = AHashSet::new();
        let terms: Vec<(String, f64)> = query_terms
            .iter()
            .map(|t| t.to_lowercase())
            .filter(|t| !t.is_empty() && seen.insert(t.clone()))
            .map(|t| {
                let idf = self.idf(&t);
                (t, idf)
            })
            .collect();

        self.docs
            .iter()
            .map(|(id, tf, doc_len)| {
                let score: f64 = terms
                    .iter()
                    .map(|(term, idf)| {
                        self.term_score(*idf, tf.get(term).copied().unwrap_or(0), *doc_len)
                    })
                    .sum();
                (id.clone(), score)
            })
            .collect()
    }
}

/// Score a whole corpus against pre-tokenized query terms
pub fn calculate_bm25_scores(
    query_terms: &[String],
    documents: &[Document],
    extractor: &dyn TextExtractor,
    params: Bm25Params,
) -> AHashMap<String, f64> {
    Bm25Scorer::build(documents, extractor, params).score(query_terms)
}
