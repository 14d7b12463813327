//! Document source trait definitions

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Errors raised by a document source
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("invalid document key: {0}")]
    InvalidKey(String),

    #[error("malformed document {key}: {reason}")]
    Malformed { key: String, reason: String },

    #[error("IO error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

pub type DocumentResult<T> = Result<T, DocumentError>;

/// A listing entry. Identity is the source key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub key: String,
    pub size: u64,
    /// Folder-like entries are listed but never processed
    pub is_container: bool,
}

impl DocumentRef {
    pub fn file(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
            is_container: false,
        }
    }

    pub fn container(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size: 0,
            is_container: true,
        }
    }

    /// Zero-byte and container entries are skipped by the runner.
    pub fn is_processable(&self) -> bool {
        !self.is_container && self.size > 0 && !self.key.ends_with('/')
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct DocumentPage {
    pub refs: Vec<DocumentRef>,
    /// Pass back to `list` for the next page; `None` on the last page
    pub next_token: Option<String>,
}

/// The unit of work: an article with a title and body text.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub text: String,
}

#[derive(Deserialize)]
struct RawDocument {
    title: String,
    text: String,
}

impl Document {
    pub fn new(id: impl Into<String>, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            text: text.into(),
        }
    }

    /// Decode a stored JSON object with at least `title` and `text` fields.
    pub fn from_json(key: &str, bytes: &[u8]) -> DocumentResult<Self> {
        let raw: RawDocument =
            serde_json::from_slice(bytes).map_err(|e| DocumentError::Malformed {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        if raw.title.trim().is_empty() {
            return Err(DocumentError::Malformed {
                key: key.to_string(),
                reason: "empty title".to_string(),
            });
        }
        Ok(Self::new(key, raw.title.trim(), raw.text))
    }

    /// The first `max_chars` characters of the body.
    pub fn excerpt(&self, max_chars: usize) -> &str {
        match self.text.char_indices().nth(max_chars) {
            Some((idx, _)) => &self.text[..idx],
            None => &self.text,
        }
    }
}

/// Source of raw documents (object storage, a directory, ...).
///
/// Implementations must be safe to call from concurrent workers.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// List entries under `prefix`, one page at a time.
    async fn list(&self, prefix: &str, page_token: Option<&str>) -> DocumentResult<DocumentPage>;

    async fn fetch(&self, doc: &DocumentRef) -> DocumentResult<Document>;

    /// Copy the document to the archive location.
    async fn archive(&self, doc: &DocumentRef) -> DocumentResult<()>;

    async fn delete(&self, doc: &DocumentRef) -> DocumentResult<()>;
}
