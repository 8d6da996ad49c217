//! Candidate selection: the bounded set that gets vector scoring

use crate::corpus::Document;
use ahash::AHashMap;

/// A document that passed the lexical first pass
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    /// Position in the corpus, used to break score ties
    pub index: usize,
    pub document: &'a Document,
    pub bm25: f64,
}

impl<'a> Candidate<'a> {
    pub fn id(&self) -> &'a str {
        &self.document.id
    }
}

/// Top `limit` documents by BM25 score, highest first, ties broken by corpus
/// order. Documents scoring 0 fill remaining slots when fewer match.
pub fn select_candidates<'a>(
    corpus: &'a [Document],
    bm25_scores: &AHashMap<String, f64>,
    limit: usize,
) -> Vec<Candidate<'a>> {
    let mut candidates: Vec<Candidate<'a>> = corpus
        .iter()
        .enumerate()
        .map(|(index, document)| Candidate {
            index,
            document,
            bm25: bm25_scores.get(&document.id).copied().unwrap_or(0.0),
        })
        .collect();

    candidates.sort_by(|a, b| b.bm25.total_cmp(&a.bm25).then(a.index.cmp(&b.index)));
    candidates.truncate(limit);
    candidates
}
