//! In-memory graph store and vector index
//!
//! Thread-safe, non-persistent. Used by tests and dry runs.

use super::traits::{
    GraphStore, StorageError, StorageResult, VectorFilter, VectorIndex, VectorMatch, VectorMetadata,
};
use crate::embedding::cosine_similarity;
use crate::graph::{GraphNode, NodeId, Properties, Relationship};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::RwLock;

type RelationshipKey = (NodeId, String, NodeId);

#[derive(Default)]
pub struct InMemoryGraphStore {
    nodes: DashMap<NodeId, GraphNode>,
    relationships: DashMap<RelationshipKey, Relationship>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored node, oldest first.
    pub fn nodes(&self) -> Vec<GraphNode> {
        let mut nodes: Vec<GraphNode> = self.nodes.iter().map(|e| e.value().clone()).collect();
        nodes.sort_by(|a, b| created_at(a).cmp(&created_at(b)));
        nodes
    }

    pub fn relationships(&self) -> Vec<Relationship> {
        self.relationships.iter().map(|e| e.value().clone()).collect()
    }
}

fn created_at(node: &GraphNode) -> String {
    node.properties
        .get(crate::graph::property::CREATED_AT)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn merge_node(
        &self,
        labels: &[String],
        properties: &Properties,
        provenance: &str,
    ) -> StorageResult<(GraphNode, bool)> {
        let id = NodeId::for_provenance(provenance);
        match self.nodes.entry(id) {
            Entry::Occupied(existing) => Ok((existing.get().clone(), false)),
            Entry::Vacant(slot) => {
                let node = GraphNode::new(id, labels.to_vec(), properties.clone());
                slot.insert(node.clone());
                Ok((node, true))
            }
        }
    }

    async fn get_node(&self, id: &NodeId) -> StorageResult<Option<GraphNode>> {
        Ok(self.nodes.get(id).map(|n| n.value().clone()))
    }

    async fn find_by_exact_name(&self, name: &str) -> StorageResult<Option<GraphNode>> {
        let wanted = name.trim().to_lowercase();
        Ok(self
            .nodes()
            .into_iter()
            .find(|n| n.name().map_or(false, |candidate| candidate.to_lowercase() == wanted)))
    }

    async fn search_by_name(
        &self,
        fragment: &str,
        label: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<GraphNode>> {
        let fragment = fragment.trim().to_lowercase();
        let mut hits: Vec<GraphNode> = self
            .nodes()
            .into_iter()
            .filter(|n| label.map_or(true, |l| n.has_label(l)))
            .filter(|n| {
                n.name()
                    .map_or(false, |name| name.to_lowercase().contains(&fragment))
            })
            .collect();
        hits.sort_by_key(|n| n.name().map_or(usize::MAX, |s| s.chars().count()));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn merge_relationship(&self, relationship: &Relationship) -> StorageResult<bool> {
        for endpoint in [&relationship.source, &relationship.target] {
            if !self.nodes.contains_key(endpoint) {
                return Err(StorageError::NodeNotFound(endpoint.to_string()));
            }
        }
        let key = (
            relationship.source,
            relationship.rel_type.clone(),
            relationship.target,
        );
        match self.relationships.entry(key) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(relationship.clone());
                Ok(true)
            }
        }
    }

    async fn relationships_from(&self, source: &NodeId) -> StorageResult<Vec<Relationship>> {
        Ok(self
            .relationships
            .iter()
            .filter(|e| &e.key().0 == source)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn node_count(&self) -> StorageResult<usize> {
        Ok(self.nodes.len())
    }
}

/// In-memory vector index. Thread-safe via RwLock; brute-force cosine scan.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    entries: RwLock<HashMap<NodeId, (Vec<f32>, VectorMetadata)>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata(&self, id: &NodeId) -> Option<VectorMetadata> {
        self.entries
            .read()
            .unwrap()
            .get(id)
            .map(|(_, metadata)| metadata.clone())
    }
}

/// Rank `(id, vector, metadata)` rows against a query.
pub(crate) fn rank<'a, I>(rows: I, query: &[f32], top_k: usize) -> Vec<VectorMatch>
where
    I: Iterator<Item = (NodeId, &'a [f32], VectorMetadata)>,
{
    let mut matches: Vec<VectorMatch> = rows
        .map(|(id, vector, metadata)| VectorMatch {
            id,
            score: cosine_similarity(query, vector),
            metadata,
        })
        .collect();
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches.truncate(top_k);
    matches
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, id: &NodeId, vector: &[f32], metadata: VectorMetadata) -> StorageResult<()> {
        self.entries
            .write()
            .unwrap()
            .insert(*id, (vector.to_vec(), metadata));
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&VectorFilter>,
    ) -> StorageResult<Vec<VectorMatch>> {
        let entries = self.entries.read().unwrap();
        let rows = entries
            .iter()
            .filter(|(_, (_, metadata))| filter.map_or(true, |f| f.matches(metadata)))
            .map(|(id, (v, metadata))| (*id, v.as_slice(), metadata.clone()));
        Ok(rank(rows, vector, top_k))
    }

    async fn contains(&self, id: &NodeId) -> StorageResult<bool> {
        Ok(self.entries.read().unwrap().contains_key(id))
    }

    async fn len(&self) -> StorageResult<usize> {
        Ok(self.entries.read().unwrap().len())
    }
}
