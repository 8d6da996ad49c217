//! Configuration management for hyrank
//!
//! Loads `config.toml`, applies `HYRANK_<SECTION>__<KEY>` environment
//! overrides and validates the result. The typed sections convert into the
//! runtime settings of the store, the embedding provider and the searcher.

use crate::corpus::FieldExtractor;
use crate::error::{HyrankError, Result};
use crate::lexical::Bm25Params;
use crate::retrieval::{
    AdaptiveThresholds, DictionaryEnhancer, HybridConfig, ProfileSet, WeightProfile,
    WeightSelection,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub bm25: Bm25Params,
    #[serde(default)]
    pub enhancer: EnhancerConfig,
    /// Weight profiles; a name matching a built-in replaces it
    #[serde(default)]
    pub profiles: BTreeMap<String, WeightProfile>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-memory collections mirrored to one JSON file
    Snapshot,
    /// Embedded SQLite database
    Sqlite,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Snapshot => write!(f, "snapshot"),
            StorageBackend::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "snapshot" => Ok(StorageBackend::Snapshot),
            "sqlite" => Ok(StorageBackend::Sqlite),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub backend: StorageBackend,
    /// Relative to `data_dir`
    pub snapshot_file: String,
    /// Relative to `data_dir`
    pub database_file: String,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
    /// Texts per provider call when indexing
    pub batch_size: usize,
}

impl EmbeddingConfig {
    /// Fail when the loaded model disagrees with the configured dimension
    pub fn check_dimension(&self, actual: usize) -> Result<()> {
        if actual != self.dimension {
            return Err(HyrankError::InvalidConfigValue {
                path: "embedding.dimension".to_string(),
                message: format!(
                    "model '{}' produces {}-dimensional vectors, config expects {}",
                    self.model, actual, self.dimension
                ),
            });
        }
        Ok(())
    }
}

/// Retrieval tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub candidate_limit: usize,
    pub embedding_batch_size: usize,
    pub rrf_k: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_timeout_ms: Option<u64>,
    pub default_profile: String,
    #[serde(default)]
    pub adaptive_weights: bool,
    pub keyword_max_tokens: usize,
    pub semantic_min_tokens: usize,
    /// Document fields searched; empty means the catalog defaults
    #[serde(default)]
    pub text_fields: Vec<String>,
}

/// Query enhancement tables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnhancerConfig {
    #[serde(default)]
    pub synonyms: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub corrections: BTreeMap<String, String>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(HyrankError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| HyrankError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let config: Config = toml::from_str(&content)?;
        config.finish()
    }

    /// Load `path`, or fall back to the defaults when it does not exist.
    /// Both paths get env overrides and validation.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }

        tracing::warn!(
            "Config file not found, using defaults. Run 'hyrank config init' to create one."
        );
        Self::default().finish()
    }

    fn finish(mut self) -> Result<Self> {
        // Apply environment variable overrides
        self.apply_env_overrides();

        // Validate configuration
        ConfigValidator::validate(&self)?;

        Ok(self)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| HyrankError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: HYRANK_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("HYRANK_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATA_DIR" => self.storage.data_dir = PathBuf::from(value),
            "STORAGE__BACKEND" => {
                self.storage.backend =
                    value
                        .parse()
                        .map_err(|message| HyrankError::InvalidConfigValue {
                            path: path.to_string(),
                            message,
                        })?;
            }
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__DIMENSION" => self.embedding.dimension = parse_env(path, value)?,
            "RETRIEVAL__CANDIDATE_LIMIT" => {
                self.retrieval.candidate_limit = parse_env(path, value)?;
            }
            "RETRIEVAL__EMBEDDING_BATCH_SIZE" => {
                self.retrieval.embedding_batch_size = parse_env(path, value)?;
            }
            "RETRIEVAL__QUERY_TIMEOUT_MS" => {
                self.retrieval.query_timeout_ms = Some(parse_env(path, value)?);
            }
            "RETRIEVAL__DEFAULT_PROFILE" => self.retrieval.default_profile = value.to_string(),
            "RETRIEVAL__ADAPTIVE_WEIGHTS" => {
                self.retrieval.adaptive_weights = parse_env(path, value)?;
            }
            "BM25__K1" => self.bm25.k1 = parse_env(path, value)?,
            "BM25__B" => self.bm25.b = parse_env(path, value)?,
            "BM25__DELTA" => self.bm25.delta = parse_env(path, value)?,
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| HyrankError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("hyrank").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| HyrankError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".hyrank"))
    }

    /// Data directory with `~/` expanded
    pub fn data_dir(&self) -> Result<PathBuf> {
        expand_path(&self.storage.data_dir)
    }

    pub fn snapshot_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(&self.storage.snapshot_file))
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(&self.storage.database_file))
    }

    /// Built-in profiles with the configured ones layered on top
    pub fn profile_set(&self) -> ProfileSet {
        ProfileSet::new(
            self.profiles.clone(),
            AdaptiveThresholds {
                keyword_max_tokens: self.retrieval.keyword_max_tokens,
                semantic_min_tokens: self.retrieval.semantic_min_tokens,
            },
        )
    }

    /// Weight selection used when a search names none
    pub fn default_selection(&self) -> WeightSelection {
        if self.retrieval.adaptive_weights {
            WeightSelection::Adaptive
        } else {
            WeightSelection::Named(self.retrieval.default_profile.clone())
        }
    }

    pub fn hybrid_config(&self) -> HybridConfig {
        HybridConfig {
            candidate_limit: self.retrieval.candidate_limit,
            embedding_batch_size: self.retrieval.embedding_batch_size,
            rrf_k: self.retrieval.rrf_k,
            bm25: self.bm25,
            query_timeout: self.retrieval.query_timeout_ms.map(Duration::from_millis),
            profiles: self.profile_set(),
            default_selection: self.default_selection(),
        }
    }

    pub fn enhancer(&self) -> DictionaryEnhancer {
        DictionaryEnhancer::new(
            self.enhancer.corrections.clone(),
            self.enhancer.synonyms.clone(),
        )
    }

    pub fn extractor(&self) -> FieldExtractor {
        if self.retrieval.text_fields.is_empty() {
            FieldExtractor::default()
        } else {
            FieldExtractor::new(self.retrieval.text_fields.clone())
        }
    }

    /// One top-level section as JSON, e.g. `"retrieval"` or `"_meta"`
    pub fn section(&self, name: &str) -> Result<Option<serde_json::Value>> {
        let value = serde_json::to_value(self).map_err(|e| HyrankError::Json {
            source: e,
            context: "Failed to serialize config".to_string(),
        })?;
        Ok(value.get(name).cloned())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.hyrank"),
                backend: StorageBackend::Snapshot,
                snapshot_file: "vector_store.json".to_string(),
                database_file: "vectors.sqlite".to_string(),
            },
            embedding: EmbeddingConfig {
                model: "all-MiniLM-L6-v2".to_string(),
                dimension: 384,
                batch_size: 32,
            },
            retrieval: RetrievalConfig {
                candidate_limit: 50,
                embedding_batch_size: 5,
                rrf_k: 60.0,
                query_timeout_ms: Some(30_000),
                default_profile: crate::retrieval::BALANCED.to_string(),
                adaptive_weights: false,
                keyword_max_tokens: 2,
                semantic_min_tokens: 10,
                text_fields: Vec::new(),
            },
            bm25: Bm25Params::default(),
            enhancer: EnhancerConfig::default(),
            profiles: BTreeMap::new(),
        }
    }
}

fn parse_env<T>(path: &str, value: &str) -> Result<T>
where
    T: FromStr,
{
    value.parse().map_err(|_| HyrankError::InvalidConfigValue {
        path: path.to_string(),
        message: format!(
            "Cannot parse '{}' as {}",
            value,
            std::any::type_name::<T>()
        ),
    })
}

/// Expand a leading `~/` to the home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| HyrankError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| HyrankError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let mut config = Config::default();
        config.retrieval.candidate_limit = 25;
        config
            .profiles
            .insert("lexical".to_string(), WeightProfile::new(1.0, 0.0, 0.0));
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.retrieval.candidate_limit, 25);
        assert_eq!(loaded.profiles["lexical"], WeightProfile::new(1.0, 0.0, 0.0));
        assert_eq!(loaded.storage.backend, StorageBackend::Snapshot);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Path::new("/nonexistent/hyrank.toml"));
        assert!(matches!(result, Err(HyrankError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_optional_sections_default() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[_meta]
schema_version = "1.0.0"

[storage]
data_dir = "/tmp/hyrank"
backend = "sqlite"
snapshot_file = "vector_store.json"
database_file = "vectors.sqlite"

[embedding]
model = "bge-small-en-v1.5"
dimension = 384
batch_size = 16

[retrieval]
candidate_limit = 50
embedding_batch_size = 5
rrf_k = 60.0
default_profile = "semantic"
keyword_max_tokens = 2
semantic_min_tokens = 10

[enhancer.synonyms]
scaling = ["autoscaling"]
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.bm25, Bm25Params::default());
        assert!(config.retrieval.query_timeout_ms.is_none());
        assert_eq!(config.enhancer.synonyms["scaling"], vec!["autoscaling"]);
        assert_eq!(
            config.default_selection(),
            WeightSelection::Named("semantic".to_string())
        );
    }

    #[test]
    fn test_load_or_default_without_file() {
        let config = Config::load_or_default(Path::new("/nonexistent/hyrank.toml")).unwrap();
        assert_eq!(config.retrieval.candidate_limit, 50);
    }

    #[test]
    fn test_defaults_are_validated() {
        let mut config = Config::default();
        config.retrieval.candidate_limit = 0;

        assert!(matches!(
            config.finish(),
            Err(HyrankError::ConfigValidation { .. })
        ));
    }

    #[test]
    fn test_embedding_dimension_check() {
        let embedding = Config::default().embedding;
        assert!(embedding.check_dimension(384).is_ok());
        assert!(matches!(
            embedding.check_dimension(768),
            Err(HyrankError::InvalidConfigValue { path, .. }) if path == "embedding.dimension"
        ));
    }

    #[test]
    fn test_env_value_parsing() {
        let mut config = Config::default();

        config
            .set_value_from_env("RETRIEVAL__CANDIDATE_LIMIT", "80")
            .unwrap();
        config.set_value_from_env("STORAGE__BACKEND", "SQLite").unwrap();
        config
            .set_value_from_env("RETRIEVAL__ADAPTIVE_WEIGHTS", "true")
            .unwrap();

        assert_eq!(config.retrieval.candidate_limit, 80);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.default_selection(), WeightSelection::Adaptive);

        assert!(config.set_value_from_env("BM25__K1", "fast").is_err());
        assert!(config.set_value_from_env("STORAGE__BACKEND", "redis").is_err());
        assert!(config.set_value_from_env("UNKNOWN__KEY", "1").is_ok());
    }

    #[test]
    fn test_hybrid_config_conversion() {
        let mut config = Config::default();
        config.retrieval.query_timeout_ms = Some(1500);
        config.bm25.k1 = 1.2;

        let hybrid = config.hybrid_config();
        assert_eq!(hybrid.candidate_limit, 50);
        assert_eq!(hybrid.embedding_batch_size, 5);
        assert_eq!(hybrid.query_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(hybrid.bm25.k1, 1.2);
        assert!(hybrid.profiles.get("consensus").is_some());
    }

    #[test]
    fn test_paths() {
        let mut config = Config::default();
        config.storage.data_dir = PathBuf::from("/var/lib/hyrank");

        assert_eq!(
            config.snapshot_path().unwrap(),
            PathBuf::from("/var/lib/hyrank/vector_store.json")
        );
        assert_eq!(
            config.database_path().unwrap(),
            PathBuf::from("/var/lib/hyrank/vectors.sqlite")
        );
        assert!(!expand_path(Path::new("~/x")).unwrap().starts_with("~"));
    }

    #[test]
    fn test_section_lookup() {
        let config = Config::default();
        let retrieval = config.section("retrieval").unwrap().unwrap();
        assert_eq!(retrieval["candidate_limit"], 50);
        assert!(config.section("daemon").unwrap().is_none());
    }
}
