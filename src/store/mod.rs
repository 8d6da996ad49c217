//! Vector store: named collections of (id, text, embedding, metadata) records
//!
//! Two backings share the `VectorStore` trait:
//! - `SnapshotVectorStore` keeps everything in memory and mirrors the whole
//!   store to one JSON snapshot file on every mutation (write-through)
//! - `SqliteVectorStore` keeps records in an embedded SQLite database
//!
//! Nearest-neighbour search is exhaustive cosine similarity in both. An ANN
//! index is a future extension for collections beyond a few thousand records.

mod similarity;
mod snapshot;
mod sqlite;

pub use similarity::{cosine_similarity, rank_by_similarity, similarity_to_distance};
pub use snapshot::{SnapshotVectorStore, StoreSnapshot};
pub use sqlite::SqliteVectorStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Free-form record metadata; unknown keys are preserved as-is
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Name of the persistent collection holding the whole item catalog
pub const CATALOG_COLLECTION: &str = "idea_catalog";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Dimension mismatch: {documents} documents but {embeddings} embeddings")]
    DimensionMismatch { documents: usize, embeddings: usize },

    #[error("Inconsistent embedding dimension: expected {expected}, got {actual}")]
    InconsistentDimension { expected: usize, actual: usize },

    #[error("Embedding {index} has a NaN or infinite component")]
    NonFiniteEmbedding { index: usize },

    #[error("Length mismatch for {field}: expected {expected}, got {actual}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Duplicate document id in collection: {0}")]
    DuplicateId(String),

    #[error("Vector store used before initialization")]
    NotInitialized,

    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(e: r2d2::Error) -> Self {
        StoreError::Database(format!("Connection pool error: {}", e))
    }
}

/// A named collection; the four vectors are parallel arrays
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Collection {
    pub name: String,
    pub documents: Vec<String>,
    pub embeddings: Vec<Vec<f32>>,
    pub metadatas: Vec<Metadata>,
    pub ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: Vec::new(),
            embeddings: Vec::new(),
            metadatas: Vec::new(),
            ids: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Dimension shared by every embedding, if any are stored
    pub fn dimension(&self) -> Option<usize> {
        self.embeddings.first().map(Vec::len)
    }

    pub fn info(&self) -> CollectionInfo {
        CollectionInfo {
            name: self.name.clone(),
            document_count: self.len(),
            created_at: self.created_at,
        }
    }

    pub fn stats(&self) -> CollectionStats {
        let total_size = self
            .documents
            .iter()
            .zip(self.embeddings.iter())
            .map(|(doc, emb)| doc.len() as u64 + (emb.len() * std::mem::size_of::<f32>()) as u64)
            .sum();

        CollectionStats {
            document_count: self.len(),
            created_at: self.created_at,
            total_size,
        }
    }

    /// Brute-force top-k over the whole collection
    pub fn query(&self, query_embedding: &[f32], top_k: usize) -> QueryResult {
        let ranked = rank_by_similarity(query_embedding, &self.embeddings, top_k);

        let mut result = QueryResult::default();
        for (idx, similarity) in ranked {
            result.documents.push(self.documents[idx].clone());
            result.metadatas.push(self.metadatas[idx].clone());
            result.distances.push(similarity_to_distance(similarity));
            result.ids.push(self.ids[idx].clone());
        }
        result
    }
}

/// Summary returned by get-or-create and listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionInfo {
    pub name: String,
    pub document_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionStats {
    pub document_count: usize,
    pub created_at: DateTime<Utc>,
    /// Document text bytes plus raw embedding bytes
    pub total_size: u64,
}

/// Parallel result lists ordered by descending similarity
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    pub documents: Vec<String>,
    pub metadatas: Vec<Metadata>,
    /// `1 - cosine similarity`, not a Euclidean distance
    pub distances: Vec<f32>,
    pub ids: Vec<String>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Records to append to a collection
#[derive(Debug, Clone, Default)]
pub struct NewDocuments {
    pub documents: Vec<String>,
    pub embeddings: Vec<Vec<f32>>,
    /// Synthesized per record when absent or of the wrong length
    pub metadatas: Option<Vec<Metadata>>,
    /// Generated when absent
    pub ids: Option<Vec<String>>,
}

impl NewDocuments {
    pub fn new(documents: Vec<String>, embeddings: Vec<Vec<f32>>) -> Self {
        Self {
            documents,
            embeddings,
            metadatas: None,
            ids: None,
        }
    }

    pub fn with_metadatas(mut self, metadatas: Vec<Metadata>) -> Self {
        self.metadatas = Some(metadatas);
        self
    }

    pub fn with_ids(mut self, ids: Vec<String>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Check the batch against the collection it is about to join and fill in
    /// ids and metadata. Returns `(ids, metadatas)` aligned with `documents`.
    pub(crate) fn prepare(
        &self,
        existing_dimension: Option<usize>,
        existing_ids: &[String],
    ) -> Result<(Vec<String>, Vec<Metadata>), StoreError> {
        if self.documents.len() != self.embeddings.len() {
            return Err(StoreError::DimensionMismatch {
                documents: self.documents.len(),
                embeddings: self.embeddings.len(),
            });
        }

        let expected = existing_dimension.or_else(|| self.embeddings.first().map(Vec::len));
        if let Some(expected) = expected {
            if let Some(bad) = self.embeddings.iter().find(|e| e.len() != expected) {
                return Err(StoreError::InconsistentDimension {
                    expected,
                    actual: bad.len(),
                });
            }
        }

        if let Some(index) = self
            .embeddings
            .iter()
            .position(|e| e.iter().any(|x| !x.is_finite()))
        {
            return Err(StoreError::NonFiniteEmbedding { index });
        }

        let ids = match &self.ids {
            Some(ids) if ids.len() != self.documents.len() => {
                return Err(StoreError::LengthMismatch {
                    field: "ids",
                    expected: self.documents.len(),
                    actual: ids.len(),
                });
            }
            Some(ids) => ids.clone(),
            None => (0..self.documents.len())
                .map(|_| uuid::Uuid::new_v4().to_string())
                .collect(),
        };

        let mut seen: ahash::AHashSet<&str> = existing_ids.iter().map(String::as_str).collect();
        for id in &ids {
            if !seen.insert(id.as_str()) {
                return Err(StoreError::DuplicateId(id.clone()));
            }
        }

        let metadatas = match &self.metadatas {
            Some(m) if m.len() == self.documents.len() => m.clone(),
            Some(m) => {
                tracing::debug!(
                    "Metadata count {} does not match document count {}, synthesizing defaults",
                    m.len(),
                    self.documents.len()
                );
                default_metadatas(existing_ids.len(), self.documents.len())
            }
            None => default_metadatas(existing_ids.len(), self.documents.len()),
        };

        Ok((ids, metadatas))
    }
}

fn default_metadatas(offset: usize, count: usize) -> Vec<Metadata> {
    let added_at = Utc::now().to_rfc3339();
    (0..count)
        .map(|i| {
            let mut meta = Metadata::new();
            meta.insert("source".to_string(), serde_json::Value::from("unknown"));
            meta.insert("chunk_index".to_string(), serde_json::Value::from(offset + i));
            meta.insert("added_at".to_string(), serde_json::Value::from(added_at.clone()));
            meta
        })
        .collect()
}

/// Storage backend for embedding vectors with exhaustive cosine search
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Return the named collection, creating an empty one if needed.
    /// Creation alone does not have to reach disk.
    async fn get_or_create_collection(&self, name: &str) -> Result<CollectionInfo, StoreError>;

    /// Append records and durably persist before returning
    async fn add_documents(&self, name: &str, batch: NewDocuments) -> Result<(), StoreError>;

    /// Top-k records by descending similarity. A missing or empty collection
    /// yields empty lists.
    async fn query(
        &self,
        name: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<QueryResult, StoreError>;

    /// Remove a whole collection; returns whether it existed
    async fn delete_collection(&self, name: &str) -> Result<bool, StoreError>;

    async fn get_stats(&self, name: &str) -> Result<Option<CollectionStats>, StoreError>;

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, StoreError>;
}

/// Deterministic per-session collection name derived from a session token
pub fn ephemeral_collection_name(session_token: &str) -> String {
    let hash = blake3::hash(session_token.as_bytes()).to_hex();
    format!("session_{}", &hash.as_str()[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ephemeral_name_is_deterministic() {
        let a = ephemeral_collection_name("token-123");
        let b = ephemeral_collection_name("token-123");
        let c = ephemeral_collection_name("token-456");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("session_"));
        assert_eq!(a.len(), "session_".len() + 16);
    }

    #[test]
    fn test_prepare_rejects_count_mismatch() {
        let batch = NewDocuments::new(vec!["a".into(), "b".into()], vec![vec![1.0, 0.0]]);
        let err = batch.prepare(None, &[]).unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                documents: 2,
                embeddings: 1
            }
        ));
    }

    #[test]
    fn test_prepare_rejects_mixed_dimensions() {
        let batch = NewDocuments::new(
            vec!["a".into(), "b".into()],
            vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]],
        );
        assert!(matches!(
            batch.prepare(None, &[]),
            Err(StoreError::InconsistentDimension {
                expected: 2,
                actual: 3
            })
        ));

        let batch = NewDocuments::new(vec!["a".into()], vec![vec![1.0, 0.0]]);
        assert!(matches!(
            batch.prepare(Some(3), &[]),
            Err(StoreError::InconsistentDimension { .. })
        ));
    }

    #[test]
    fn test_prepare_rejects_non_finite_components() {
        let batch = NewDocuments::new(
            vec!["a".into(), "b".into(), "c".into()],
            vec![vec![1.0, 0.0], vec![0.0, f32::INFINITY], vec![f32::NAN, 1.0]],
        );
        assert!(matches!(
            batch.prepare(None, &[]),
            Err(StoreError::NonFiniteEmbedding { index: 1 })
        ));
    }

    #[test]
    fn test_prepare_synthesizes_metadata() {
        let mut meta = Metadata::new();
        meta.insert("source".into(), "upload.pdf".into());

        // Wrong length: defaults replace the caller's list
        let batch = NewDocuments::new(
            vec!["a".into(), "b".into()],
            vec![vec![1.0], vec![2.0]],
        )
        .with_metadatas(vec![meta]);

        let (ids, metas) = batch.prepare(None, &["x".to_string()]).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(metas.len(), 2);
        assert_eq!(metas[0]["chunk_index"], serde_json::json!(1));
        assert_eq!(metas[1]["chunk_index"], serde_json::json!(2));
    }

    #[test]
    fn test_prepare_rejects_duplicate_ids() {
        let batch = NewDocuments::new(vec!["a".into()], vec![vec![1.0]])
            .with_ids(vec!["existing".into()]);
        assert!(matches!(
            batch.prepare(None, &["existing".to_string()]),
            Err(StoreError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_stats_total_size() {
        let mut collection = Collection::new("c");
        collection.documents.push("abcd".into());
        collection.embeddings.push(vec![0.0; 3]);
        collection.metadatas.push(Metadata::new());
        collection.ids.push("1".into());

        let stats = collection.stats();
        assert_eq!(stats.document_count, 1);
        assert_eq!(stats.total_size, 4 + 12);
    }
}
