//! Core graph data structures

mod edge;
mod node;

pub use edge::{normalize_relationship_type, Relationship};
pub use node::{
    embedding_from_value, embedding_to_value, property, string_property, GraphNode, NodeId,
    Properties,
};
