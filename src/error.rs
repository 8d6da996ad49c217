use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreError;

/// Main error type for hyrank
#[derive(Error, Debug)]
pub enum HyrankError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Corpus file could not be interpreted
    #[error("Invalid corpus {path}: {message}")]
    InvalidCorpus { path: PathBuf, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// CSV corpus errors
    #[error("CSV error: {context}: {source}")]
    Csv {
        source: csv::Error,
        context: String,
    },

    /// Vector store errors
    #[error("Vector store error: {0}")]
    Store(#[from] StoreError),

    /// Search errors
    #[error("Search error: {0}")]
    Search(#[from] crate::retrieval::SearchError),

    /// Embedding provider errors
    #[error("Embedding error: {0}")]
    Embedding(#[from] crate::embedding::EmbeddingError),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for hyrank operations
pub type Result<T> = std::result::Result<T, HyrankError>;
