//! Storage trait definitions

use crate::graph::{GraphNode, NodeId, Properties, Relationship};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Vector has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Vector backend error: {0}")]
    Backend(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// The graph side of the dual store.
///
/// Writes are MERGE-style: a node is keyed by its provenance and a
/// relationship by `(source, type, target)`, so concurrent workers and
/// re-runs converge instead of duplicating. Implementations must be
/// thread-safe (Send + Sync).
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create the node for `provenance` unless it already exists.
    ///
    /// Returns the stored node and whether this call created it. An existing
    /// node is returned unchanged.
    async fn merge_node(
        &self,
        labels: &[String],
        properties: &Properties,
        provenance: &str,
    ) -> StorageResult<(GraphNode, bool)>;

    async fn get_node(&self, id: &NodeId) -> StorageResult<Option<GraphNode>>;

    /// Node whose name equals `name`, ignoring case. Oldest wins on ties.
    async fn find_by_exact_name(&self, name: &str) -> StorageResult<Option<GraphNode>>;

    /// Nodes whose name contains `fragment`, ignoring case, optionally
    /// restricted to nodes carrying `label`. Shortest names first.
    async fn search_by_name(
        &self,
        fragment: &str,
        label: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<GraphNode>>;

    /// Create the relationship unless one with the same identity exists.
    ///
    /// Both endpoints must exist. Returns whether this call created it.
    async fn merge_relationship(&self, relationship: &Relationship) -> StorageResult<bool>;

    async fn relationships_from(&self, source: &NodeId) -> StorageResult<Vec<Relationship>>;

    async fn node_count(&self) -> StorageResult<usize>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: GraphStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}

/// What the vector index keeps about a node, enough to identify it without
/// a join against the graph store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub name: String,
    pub labels: Vec<String>,
    pub subtype: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorFilter {
    pub subtype: Option<String>,
}

impl VectorFilter {
    pub fn subtype(subtype: impl Into<String>) -> Self {
        Self {
            subtype: Some(subtype.into()),
        }
    }

    pub fn matches(&self, metadata: &VectorMetadata) -> bool {
        self.subtype
            .as_deref()
            .map_or(true, |s| s == metadata.subtype)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: NodeId,
    /// Cosine similarity to the query
    pub score: f32,
    pub metadata: VectorMetadata,
}

/// Nearest-neighbour index mirroring node embeddings, keyed by graph node id.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace the vector for `id`.
    async fn upsert(&self, id: &NodeId, vector: &[f32], metadata: VectorMetadata) -> StorageResult<()>;

    /// Up to `top_k` matches, highest score first.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&VectorFilter>,
    ) -> StorageResult<Vec<VectorMatch>>;

    async fn contains(&self, id: &NodeId) -> StorageResult<bool>;

    async fn len(&self) -> StorageResult<usize>;
}
