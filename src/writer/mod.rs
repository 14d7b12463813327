//! Graph Writer
//!
//! The only writer of node state. Creates nodes with a fixed label order,
//! mirrors their embeddings into the vector index, and links relationships
//! by exact target name.

use crate::graph::{
    embedding_from_value, embedding_to_value, normalize_relationship_type, property, GraphNode,
    NodeId, Properties, Relationship,
};
use crate::schema::{Classification, NodeSubtype, NodeType, RelationshipProposal};
use crate::storage::{GraphStore, StorageError, VectorIndex, VectorMetadata};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum WriterError {
    /// Nodes are never written without an embedding
    #[error("node {0} has no embedding")]
    MissingEmbedding(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Labels in their fixed order: layer, subtype, then refinements.
///
/// Refinements are reduced to `[A-Za-z0-9_]`; blanks and repeats are dropped.
pub fn build_labels(layer: NodeType, subtype: NodeSubtype, refinements: &[String]) -> Vec<String> {
    let mut labels = vec![layer.label().to_string(), subtype.label().to_string()];
    for raw in refinements {
        let label: String = raw
            .trim()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let label = label.trim_matches('_').to_string();
        if !label.is_empty() && !labels.contains(&label) {
            labels.push(label);
        }
    }
    labels
}

/// A node about to be written.
#[derive(Debug, Clone)]
pub struct NodeDraft {
    pub layer: NodeType,
    pub subtype: NodeSubtype,
    pub refinements: Vec<String>,
    pub properties: Properties,
    /// Source document key; the node's identity
    pub provenance: String,
}

impl NodeDraft {
    pub fn from_classification(
        classification: &Classification,
        refinements: &[String],
        provenance: impl Into<String>,
    ) -> Self {
        let mut properties = classification.properties.clone();
        properties.insert(
            property::CONFIDENCE.to_string(),
            Value::from(classification.confidence_score),
        );
        Self {
            layer: classification.node_type,
            subtype: classification.node_subtype,
            refinements: refinements.to_vec(),
            properties,
            provenance: provenance.into(),
        }
    }

    pub fn with_embedding(mut self, embedding: &[f32]) -> Self {
        self.properties
            .insert(property::EMBEDDING.to_string(), embedding_to_value(embedding));
        self
    }

    pub fn labels(&self) -> Vec<String> {
        build_labels(self.layer, self.subtype, &self.refinements)
    }
}

#[derive(Debug, Clone)]
pub struct WriteReceipt {
    pub node: GraphNode,
    /// False when the node already existed for this provenance
    pub created: bool,
    /// The graph write succeeded but the vector mirror did not
    pub partial_commit: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationshipOutcome {
    /// Relationships this call added
    pub created: usize,
    /// Relationships that already existed
    pub existing: usize,
    /// Proposals whose target could not be found, kept intact for a retry
    pub missing_targets: Vec<RelationshipProposal>,
}

pub struct GraphWriter {
    graph: Arc<dyn GraphStore>,
    vectors: Arc<dyn VectorIndex>,
}

impl GraphWriter {
    pub fn new(graph: Arc<dyn GraphStore>, vectors: Arc<dyn VectorIndex>) -> Self {
        Self { graph, vectors }
    }

    /// Write the node, then mirror its embedding into the vector index.
    ///
    /// `aiGenerated` is always forced to true. A vector-index failure after
    /// the graph write is reported through `partial_commit`, not as an error.
    pub async fn create_node(&self, draft: NodeDraft) -> Result<WriteReceipt, WriterError> {
        let display_name = draft
            .properties
            .get(property::NAME)
            .and_then(Value::as_str)
            .unwrap_or(draft.provenance.as_str())
            .to_string();
        if draft
            .properties
            .get(property::EMBEDDING)
            .and_then(embedding_from_value)
            .is_none()
        {
            return Err(WriterError::MissingEmbedding(display_name));
        }

        let labels = draft.labels();
        let mut properties = draft.properties;
        properties.insert(property::AI_GENERATED.to_string(), Value::Bool(true));
        properties.insert(
            property::PROVENANCE.to_string(),
            Value::String(draft.provenance.clone()),
        );
        properties.insert(
            property::CREATED_AT.to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );

        let (node, created) = self
            .graph
            .merge_node(&labels, &properties, &draft.provenance)
            .await?;
        debug!(node = %node.id, created, labels = ?node.labels, "node merged");

        let partial_commit = match self.mirror(&node).await {
            Ok(()) => false,
            Err(e) => {
                warn!(
                    node = %node.id,
                    name = %display_name,
                    error = %e,
                    "partial commit: node is in the graph but not in the vector index"
                );
                true
            }
        };

        Ok(WriteReceipt {
            node,
            created,
            partial_commit,
        })
    }

    /// Whether the vector index holds an entry for this node.
    pub async fn is_mirrored(&self, id: &NodeId) -> Result<bool, WriterError> {
        Ok(self.vectors.contains(id).await?)
    }

    /// Upsert the stored node's embedding with enough metadata to identify it.
    async fn mirror(&self, node: &GraphNode) -> Result<(), WriterError> {
        let embedding = node
            .embedding()
            .ok_or_else(|| WriterError::MissingEmbedding(node.id.to_string()))?;
        let created_at = node
            .properties
            .get(property::CREATED_AT)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        let metadata = VectorMetadata {
            name: node.name().unwrap_or_default().to_string(),
            labels: node.labels.clone(),
            subtype: node.subtype().unwrap_or_default().to_string(),
            description: node.description().map(str::to_string),
            created_at,
        };
        self.vectors.upsert(&node.id, &embedding, metadata).await?;
        Ok(())
    }

    /// Link `source` to each proposal's target, looked up by exact name.
    ///
    /// Unknown targets are returned, never raised.
    pub async fn create_relationships(
        &self,
        source: &NodeId,
        proposals: &[RelationshipProposal],
    ) -> Result<RelationshipOutcome, WriterError> {
        let mut outcome = RelationshipOutcome::default();
        for proposal in proposals {
            let Some(rel_type) = normalize_relationship_type(&proposal.rel_type) else {
                warn!(rel_type = %proposal.rel_type, "unusable relationship type");
                outcome.missing_targets.push(proposal.clone());
                continue;
            };
            let target = match self.graph.find_by_exact_name(&proposal.target_node_name).await? {
                Some(node) => node,
                None => {
                    debug!(target = %proposal.target_node_name, "relationship target not found");
                    outcome.missing_targets.push(proposal.clone());
                    continue;
                }
            };
            let relationship = Relationship::new(*source, rel_type, target.id)
                .with_properties(proposal.properties.clone());
            if self.graph.merge_relationship(&relationship).await? {
                outcome.created += 1;
            } else {
                outcome.existing += 1;
            }
        }
        Ok(outcome)
    }
}
