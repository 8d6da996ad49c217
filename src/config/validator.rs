use crate::config::{Config, SCHEMA_VERSION};
use crate::error::{HyrankError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem before failing
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        // Validate schema version
        Self::validate_schema_version(config, &mut errors);

        // Validate storage settings
        Self::validate_storage(config, &mut errors);

        // Validate embedding settings
        Self::validate_embedding(config, &mut errors);

        // Validate retrieval tuning
        Self::validate_retrieval(config, &mut errors);

        // Validate BM25+ constants
        Self::validate_bm25(config, &mut errors);

        // Validate weight profiles
        Self::validate_profiles(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(HyrankError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }

        if config.storage.snapshot_file.trim().is_empty() {
            errors.push(ValidationError::new(
                "storage.snapshot_file",
                "Snapshot file name cannot be empty",
            ));
        }

        if config.storage.database_file.trim().is_empty() {
            errors.push(ValidationError::new(
                "storage.database_file",
                "Database file name cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Dimension must be greater than 0",
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        if retrieval.candidate_limit == 0 {
            errors.push(ValidationError::new(
                "retrieval.candidate_limit",
                "Candidate limit must be greater than 0",
            ));
        }

        if retrieval.embedding_batch_size == 0 {
            errors.push(ValidationError::new(
                "retrieval.embedding_batch_size",
                "Embedding batch size must be greater than 0",
            ));
        }

        if !retrieval.rrf_k.is_finite() || retrieval.rrf_k < 0.0 {
            errors.push(ValidationError::new(
                "retrieval.rrf_k",
                format!("RRF k must be a non-negative number, got {}", retrieval.rrf_k),
            ));
        }

        if retrieval.query_timeout_ms == Some(0) {
            errors.push(ValidationError::new(
                "retrieval.query_timeout_ms",
                "Query timeout must be greater than 0 (omit it to disable)",
            ));
        }

        if retrieval.keyword_max_tokens >= retrieval.semantic_min_tokens {
            errors.push(ValidationError::new(
                "retrieval.keyword_max_tokens",
                format!(
                    "keyword_max_tokens ({}) must be below semantic_min_tokens ({})",
                    retrieval.keyword_max_tokens, retrieval.semantic_min_tokens
                ),
            ));
        }

        if config.profile_set().get(&retrieval.default_profile).is_none() {
            errors.push(ValidationError::new(
                "retrieval.default_profile",
                format!("Unknown profile '{}'", retrieval.default_profile),
            ));
        }
    }

    fn validate_bm25(config: &Config, errors: &mut Vec<ValidationError>) {
        let bm25 = &config.bm25;

        if !bm25.k1.is_finite() || bm25.k1 < 0.0 {
            errors.push(ValidationError::new(
                "bm25.k1",
                format!("k1 must be a non-negative number, got {}", bm25.k1),
            ));
        }

        if !(0.0..=1.0).contains(&bm25.b) {
            errors.push(ValidationError::new(
                "bm25.b",
                format!("b must be between 0.0 and 1.0, got {}", bm25.b),
            ));
        }

        if !bm25.delta.is_finite() || bm25.delta < 0.0 {
            errors.push(ValidationError::new(
                "bm25.delta",
                format!("delta must be a non-negative number, got {}", bm25.delta),
            ));
        }
    }

    fn validate_profiles(config: &Config, errors: &mut Vec<ValidationError>) {
        for (name, weights) in &config.profiles {
            if !weights.is_valid() {
                errors.push(ValidationError::new(
                    format!("profiles.{}", name),
                    format!("Weights must be finite and non-negative, got {:?}", weights),
                ));
            }
        }
    }
}
