//! Query enhancement: spelling correction and term expansion

use crate::lexical::tokenize;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnhanceError {
    #[error("Query enhancement unavailable: {0}")]
    Unavailable(String),
}

/// A query after correction and expansion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedQuery {
    pub original: String,
    /// Text used for the query embedding
    pub corrected: String,
    /// Terms used for lexical scoring
    pub expanded: Vec<String>,
}

impl EnhancedQuery {
    /// No correction, expansion = the query's own tokens
    pub fn passthrough(query: &str) -> Self {
        Self {
            original: query.to_string(),
            corrected: query.to_string(),
            expanded: tokenize(query),
        }
    }
}

/// Turns a raw query into corrected text plus expanded terms
#[async_trait]
pub trait QueryEnhancer: Send + Sync {
    async fn enhance(&self, query: &str) -> Result<EnhancedQuery, EnhanceError>;
}

/// Tokenizes only
#[derive(Debug, Clone, Default)]
pub struct PassthroughEnhancer;

#[async_trait]
impl QueryEnhancer for PassthroughEnhancer {
    async fn enhance(&self, query: &str) -> Result<EnhancedQuery, EnhanceError> {
        Ok(EnhancedQuery::passthrough(query))
    }
}

/// Table-driven enhancer: a correction map applied token by token, then
/// synonyms appended after the corrected tokens
#[derive(Debug, Clone, Default)]
pub struct DictionaryEnhancer {
    corrections: BTreeMap<String, String>,
    synonyms: BTreeMap<String, Vec<String>>,
}

impl DictionaryEnhancer {
    pub fn new(
        corrections: BTreeMap<String, String>,
        synonyms: BTreeMap<String, Vec<String>>,
    ) -> Self {
        let lower = |s: &String| s.to_lowercase();
        Self {
            corrections: corrections
                .iter()
                .map(|(k, v)| (lower(k), lower(v)))
                .collect(),
            synonyms: synonyms
                .iter()
                .map(|(k, v)| (lower(k), v.iter().map(lower).collect()))
                .collect(),
        }
    }

    fn correct(&self, token: String) -> String {
        self.corrections.get(&token).cloned().unwrap_or(token)
    }
}

#[async_trait]
impl QueryEnhancer for DictionaryEnhancer {
    async fn enhance(&self, query: &str) -> Result<EnhancedQuery, EnhanceError> {
        let corrected_tokens: Vec<String> = tokenize(query)
            .into_iter()
            .map(|t| self.correct(t))
            .collect();

        let mut seen: HashSet<String> = HashSet::new();
        let mut expanded: Vec<String> = Vec::new();

        for token in &corrected_tokens {
            if seen.insert(token.clone()) {
                expanded.push(token.clone());
            }
        }
        for token in &corrected_tokens {
            for synonym in self.synonyms.get(token).into_iter().flatten() {
                // Multi-word synonyms contribute each of their words
                for part in tokenize(synonym) {
                    if seen.insert(part.clone()) {
                        expanded.push(part);
                    }
                }
            }
        }

        Ok(EnhancedQuery {
            original: query.to_string(),
            corrected: corrected_tokens.join(" "),
            expanded,
        })
    }
}
