//! Atlas Ingest: LLM-driven knowledge graph ingestion
//!
//! Turns encyclopedia-style articles into typed nodes and relationships in a
//! knowledge graph. A language model classifies each article, a vector index
//! and name search guard against duplicates, and a single writer keeps the
//! graph store and the vector index in step.
//!
//! # Core Concepts
//!
//! - **Classification**: the model's structured verdict on a document
//! - **Candidates**: existing nodes that may already cover the document
//! - **Dual store**: nodes live in the graph store; their embeddings are
//!   mirrored into the vector index
//! - **Run report**: counters for one batch, persisted as JSON
//!
//! # Example
//!
//! ```
//! use atlas_ingest::{build_labels, NodeSubtype, NodeType};
//!
//! let labels = build_labels(NodeType::L1, NodeSubtype::Knowledge, &["History".to_string()]);
//! assert_eq!(labels, vec!["L1", "Knowledge", "History"]);
//! ```

pub mod classifier;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod pipeline;
pub mod prompts;
pub mod resolver;
pub mod schema;
pub mod storage;
pub mod writer;

pub use config::{Config, ConfigError};
pub use document::{Document, DocumentRef, DocumentStore};
pub use error::{PipelineError, PipelineResult};
pub use graph::{GraphNode, NodeId, Relationship};
pub use pipeline::{BatchRunner, CancellationToken, DocumentOutcome, Orchestrator, RunReport};
pub use resolver::{SimilarityCandidate, SimilarityResolver};
pub use schema::{Classification, NodeSubtype, NodeType, RelationshipProposal};
pub use storage::{GraphStore, StorageError, VectorIndex};
pub use writer::{build_labels, GraphWriter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
