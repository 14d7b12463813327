//! Deterministic embedder for tests
//!
//! Hashes lowercase word tokens into buckets and normalizes the result, so
//! identical text always gives identical vectors and texts sharing words
//! land close together. Fixed vectors can be pinned per text.

use super::{l2_normalize, Embedder, EmbeddingError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct MockEmbedder {
    dimensions: usize,
    pinned: HashMap<String, Vec<f32>>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            pinned: HashMap::new(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Return `vector` whenever exactly `text` is embedded.
    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.pinned.insert(text.into(), vector);
        self
    }

    /// Fail every call.
    pub fn with_failure(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn hashed(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let h = fnv1a(&token.to_lowercase());
            let bucket = (h % self.dimensions as u64) as usize;
            let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        if v.iter().all(|x| *x == 0.0) {
            v[0] = 1.0;
        }
        l2_normalize(&v)
    }
}

fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in s.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.fail {
            return Err(EmbeddingError::ModelError("mock embedder failure".to_string()));
        }
        Ok(self
            .pinned
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.hashed(text)))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
