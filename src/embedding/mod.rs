//! Embedder: text to a fixed-length vector
//!
//! Uses a trait-based backend so production code can call an embeddings
//! endpoint or fastembed while tests use a deterministic mock.

mod http;
mod mock;

#[cfg(feature = "embeddings")]
mod fastembed_impl;

pub use http::HttpEmbedder;
pub use mock::MockEmbedder;

#[cfg(feature = "embeddings")]
pub use fastembed_impl::FastEmbedEmbedder;

use async_trait::async_trait;
use thiserror::Error;

/// Error type for embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding returned no results")]
    EmptyResult,

    #[error("embedding model error: {0}")]
    ModelError(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("embedding API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("embedding response parse error: {0}")]
    Parse(String),

    #[error("expected {expected} dimensions, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Produces a vector for a text snippet.
///
/// Treated as a pure function of the input: identical text must give an
/// identical vector for a given model.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Length of every vector this embedder returns.
    fn dimensions(&self) -> usize;
}

/// Reject empty vectors and vectors of the wrong length.
pub fn check_dimensions(vector: Vec<f32>, expected: usize) -> Result<Vec<f32>, EmbeddingError> {
    if vector.is_empty() {
        return Err(EmbeddingError::EmptyResult);
    }
    if vector.len() != expected {
        return Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(vector)
}

/// Cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Scale to unit length. Zero vectors are returned unchanged.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}
