//! Run configuration
//!
//! Loaded from a YAML file; every section falls back to defaults so a partial
//! file is valid. Endpoints and secrets can be overridden from the environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fatal configuration problems, detected before any document is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("missing documentation for category {category}: {detail}")]
    MissingCategoryDocs { category: String, detail: String },

    #[error("feature not compiled in: {0}")]
    FeatureDisabled(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub classifier: ClassifierConfig,
    pub embedder: EmbedderConfig,
    pub storage: StorageConfig,
    pub documents: DocumentsConfig,
    pub pipeline: PipelineConfig,
    pub runner: RunnerConfig,
    pub report: ReportConfig,
    pub review: ReviewConfig,
    pub categories: CategoriesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Base URL of an OpenAI-compatible API; `/chat/completions` is appended
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Replaces the built-in system prompt when set
    pub system_prompt_path: Option<PathBuf>,
    /// Attempts per structured call before the document fails
    pub max_attempts: u32,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            model: "Qwen".to_string(),
            api_key: None,
            system_prompt_path: None,
            max_attempts: 3,
            backoff_initial_ms: 500,
            backoff_max_ms: 8_000,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbedderBackend {
    Http,
    Fastembed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    pub backend: EmbedderBackend,
    /// Base URL of an OpenAI-compatible API for the `http` backend; `/embeddings` is appended
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub dimensions: usize,
    pub timeout_secs: u64,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            backend: EmbedderBackend::Http,
            endpoint: String::new(),
            model: "nomic-embed-text-v1.5".to_string(),
            api_key: None,
            dimensions: 768,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VectorBackend {
    Memory,
    Sqlite,
    SqliteVec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub graph_db: PathBuf,
    pub vector_backend: VectorBackend,
    pub vector_db: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let dir = default_data_dir();
        Self {
            graph_db: dir.join("graph.db"),
            vector_backend: VectorBackend::Sqlite,
            vector_db: dir.join("vectors.db"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PostAction {
    None,
    ArchiveThenDelete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentsConfig {
    pub root: PathBuf,
    pub prefix: String,
    pub page_size: usize,
    pub archive_dir: PathBuf,
    pub post_action: PostAction,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("documents"),
            prefix: String::new(),
            page_size: 1_000,
            archive_dir: PathBuf::from("archive"),
            post_action: PostAction::None,
        }
    }
}

/// Thresholds and limits for one document's decision pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum vector score for a neighbor to count as a candidate
    pub similarity_threshold: f64,
    /// Verified candidates scoring above this stop the write
    pub duplicate_cutoff: f64,
    pub vector_top_k: usize,
    pub graph_match_limit: usize,
    /// Source text used when neither name nor description is available
    pub excerpt_chars: usize,
    /// Below this confidence a classification is rejected
    pub min_confidence: f64,
    /// Below this confidence (and above `min_confidence`) a document needs review
    pub review_threshold: f64,
    /// Ask the classifier to confirm candidate duplicates
    pub adjudicate: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            duplicate_cutoff: 0.92,
            vector_top_k: 5,
            graph_match_limit: 5,
            excerpt_chars: 500,
            min_confidence: 0.75,
            review_threshold: 0.85,
            adjudicate: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Documents processed concurrently
    pub concurrency: usize,
    /// Re-attempt relationships with missing targets after the batch
    pub retry_missing_relationships: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            retry_missing_relationships: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub path: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("run_report.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub dir: PathBuf,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("review"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoriesConfig {
    /// Directory with one `<category>.txt` per category; built-in docs when unset
    pub docs_dir: Option<PathBuf>,
}

/// Default data directory (~/.local/share/atlas-ingest)
pub fn default_data_dir() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("atlas-ingest")
}

impl Config {
    /// Read, apply environment overrides, and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&text)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Override endpoints and secrets from the environment.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("INFERENCE_ENDPOINT") {
            self.classifier.endpoint = v;
        }
        if let Some(v) = lookup("INFERENCE_API_KEY") {
            self.classifier.api_key = Some(v);
        }
        if let Some(v) = lookup("INFERENCE_MODEL") {
            self.classifier.model = v;
        }
        if let Some(v) = lookup("EMBEDDINGS_ENDPOINT") {
            self.embedder.endpoint = v;
        }
        if let Some(v) = lookup("EMBEDDINGS_API_KEY") {
            self.embedder.api_key = Some(v);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pipeline;
        for (field, value) in [
            ("pipeline.similarity_threshold", p.similarity_threshold),
            ("pipeline.duplicate_cutoff", p.duplicate_cutoff),
            ("pipeline.min_confidence", p.min_confidence),
            ("pipeline.review_threshold", p.review_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("{} is outside [0, 1]", value),
                });
            }
        }
        if p.review_threshold < p.min_confidence {
            return Err(ConfigError::Invalid {
                field: "pipeline.review_threshold",
                reason: "must not be below pipeline.min_confidence".to_string(),
            });
        }
        if p.vector_top_k == 0 {
            return Err(invalid_zero("pipeline.vector_top_k"));
        }
        if p.excerpt_chars == 0 {
            return Err(invalid_zero("pipeline.excerpt_chars"));
        }
        if self.runner.concurrency == 0 {
            return Err(invalid_zero("runner.concurrency"));
        }
        if self.classifier.max_attempts == 0 {
            return Err(invalid_zero("classifier.max_attempts"));
        }
        if self.documents.page_size == 0 {
            return Err(invalid_zero("documents.page_size"));
        }
        if self.embedder.dimensions == 0 {
            return Err(invalid_zero("embedder.dimensions"));
        }
        if self.classifier.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "classifier.endpoint",
                reason: "no inference endpoint configured (set INFERENCE_ENDPOINT)".to_string(),
            });
        }
        if self.embedder.backend == EmbedderBackend::Http && self.embedder.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "embedder.endpoint",
                reason: "no embeddings endpoint configured (set EMBEDDINGS_ENDPOINT)".to_string(),
            });
        }
        Ok(())
    }
}

fn invalid_zero(field: &'static str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: "must be greater than zero".to_string(),
    }
}
