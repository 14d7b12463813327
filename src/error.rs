//! Per-document error taxonomy
//!
//! Everything a single document can fail with. The orchestrator downgrades
//! these into report entries; only `ConfigError` aborts a run, and that is
//! raised before the first document is touched.

use crate::classifier::ClassifierError;
use crate::config::ConfigError;
use crate::document::DocumentError;
use crate::embedding::EmbeddingError;
use crate::storage::StorageError;
use crate::writer::WriterError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Network or HTTP failure talking to the classifier
    #[error("transport error: {0}")]
    Transport(#[source] ClassifierError),

    /// The classifier never produced a valid structured result
    #[error("classification error: {0}")]
    Classification(#[source] ClassifierError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("missing embedding for node {0}")]
    MissingEmbedding(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Short machine-friendly name, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Transport(_) => "transport",
            PipelineError::Classification(_) => "classification",
            PipelineError::Embedding(_) => "embedding",
            PipelineError::MissingEmbedding(_) => "missing_embedding",
            PipelineError::Storage(_) => "storage",
            PipelineError::Document(_) => "document",
            PipelineError::Configuration(_) => "configuration",
            PipelineError::Cancelled => "cancelled",
        }
    }
}

impl From<ClassifierError> for PipelineError {
    fn from(err: ClassifierError) -> Self {
        if err.is_transport() {
            PipelineError::Transport(err)
        } else {
            PipelineError::Classification(err)
        }
    }
}

impl From<WriterError> for PipelineError {
    fn from(err: WriterError) -> Self {
        match err {
            WriterError::MissingEmbedding(name) => PipelineError::MissingEmbedding(name),
            WriterError::Storage(e) => PipelineError::Storage(e),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
