//! Local embedder backed by fastembed (ONNX Runtime)

use super::{check_dimensions, Embedder, EmbeddingError};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Arc, Mutex};

/// Wraps `fastembed::TextEmbedding` in a `Mutex` because its `embed`
/// method requires `&mut self`. Inference runs on the blocking pool.
pub struct FastEmbedEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    dimensions: usize,
}

impl FastEmbedEmbedder {
    pub fn new(model: EmbeddingModel, dimensions: usize) -> Result<Self, EmbeddingError> {
        let options = InitOptions::new(model).with_show_download_progress(false);
        let embedding =
            TextEmbedding::try_new(options).map_err(|e| EmbeddingError::ModelError(e.to_string()))?;
        Ok(Self {
            model: Arc::new(Mutex::new(embedding)),
            dimensions,
        })
    }

    /// Resolve a configured model name.
    pub fn from_name(name: &str, dimensions: usize) -> Result<Self, EmbeddingError> {
        let model = match name {
            "nomic-embed-text-v1.5" => EmbeddingModel::NomicEmbedTextV15,
            "all-MiniLM-L6-v2" => EmbeddingModel::AllMiniLML6V2,
            "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
            "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
            other => {
                return Err(EmbeddingError::ModelError(format!(
                    "unsupported fastembed model: {}",
                    other
                )))
            }
        };
        Self::new(model, dimensions)
    }
}

#[async_trait]
impl Embedder for FastEmbedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();
        let embeddings = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| EmbeddingError::ModelError("model lock poisoned".to_string()))?;
            model
                .embed(vec![text], None)
                .map_err(|e| EmbeddingError::ModelError(e.to_string()))
        })
        .await
        .map_err(|e| EmbeddingError::ModelError(e.to_string()))??;

        let vector = embeddings
            .into_iter()
            .next()
            .ok_or(EmbeddingError::EmptyResult)?;
        check_dimensions(vector, self.dimensions)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
