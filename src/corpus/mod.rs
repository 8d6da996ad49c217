//! Corpus items and text extraction
//!
//! A corpus is whatever the caller wants ranked: catalog records with named
//! fields, optionally carrying a precomputed embedding.

mod loader;

pub use loader::load_corpus;

use crate::store::Metadata;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Catalog fields searched when no explicit field list is configured
pub const DEFAULT_TEXT_FIELDS: &[&str] = &[
    "title",
    "summary",
    "challenge_opportunity",
    "business_group",
    "additional_info",
];

/// One rankable item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,

    /// Precomputed embedding; generated on demand when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    #[serde(flatten)]
    pub fields: Metadata,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            embedding: None,
            fields: Metadata::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Field as text: strings verbatim, numbers and booleans formatted
    pub fn field_text(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// Produces the scoreable text of a document
pub trait TextExtractor: Send + Sync {
    fn extract(&self, document: &Document) -> String;
}

impl<F> TextExtractor for F
where
    F: Fn(&Document) -> String + Send + Sync,
{
    fn extract(&self, document: &Document) -> String {
        self(document)
    }
}

/// Joins a fixed list of fields; falls back to every string field when the
/// document has none of them
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    fields: Vec<String>,
}

impl FieldExtractor {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }
}

impl Default for FieldExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_TEXT_FIELDS.iter().map(|f| f.to_string()).collect())
    }
}

impl TextExtractor for FieldExtractor {
    fn extract(&self, document: &Document) -> String {
        let parts: Vec<String> = self
            .fields
            .iter()
            .filter_map(|f| document.field_text(f))
            .collect();

        if !parts.is_empty() {
            return parts.join(" ");
        }

        document
            .fields
            .values()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Drop repeated ids, keeping the first occurrence
pub fn deduplicate_documents(documents: Vec<Document>) -> Vec<Document> {
    let mut seen: HashSet<String> = HashSet::new();
    let before = documents.len();

    let unique: Vec<Document> = documents
        .into_iter()
        .filter(|doc| seen.insert(doc.id.clone()))
        .collect();

    if unique.len() != before {
        tracing::warn!(
            "Dropped {} documents with duplicate ids",
            before - unique.len()
        );
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_extractor_uses_catalog_fields() {
        let doc = Document::new("1")
            .with_field("title", "Edge AI for Retail")
            .with_field("summary", "Vision at the shelf")
            .with_field("prototype_url", "http://prototype.ai/x");

        let text = FieldExtractor::default().extract(&doc);
        assert_eq!(text, "Edge AI for Retail Vision at the shelf");
    }

    #[test]
    fn test_field_extractor_falls_back_to_all_strings() {
        let doc = Document::new("1")
            .with_field("text", "cloud native kubernetes deployment")
            .with_field("score", 42);

        let text = FieldExtractor::default().extract(&doc);
        assert_eq!(text, "cloud native kubernetes deployment");
    }

    #[test]
    fn test_closure_extractor() {
        let extractor = |d: &Document| d.id.to_uppercase();
        assert_eq!(extractor.extract(&Document::new("abc")), "ABC");
    }

    #[test]
    fn test_deduplication() {
        let docs = vec![
            Document::new("1").with_field("title", "first"),
            Document::new("2"),
            Document::new("1").with_field("title", "second"),
        ];

        let deduped = deduplicate_documents(docs);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].id, "1");
        assert_eq!(deduped[0].field_text("title").as_deref(), Some("first"));
    }

    #[test]
    fn test_serialization_flattens_fields() {
        let doc = Document::new("7").with_field("title", "Agentic AI");
        let json = serde_json::to_value(&doc).unwrap();

        assert_eq!(json["id"], "7");
        assert_eq!(json["title"], "Agentic AI");
        assert!(json.get("embedding").is_none());
    }
}
