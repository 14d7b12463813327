//! Node representation in the knowledge graph

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Namespace for provenance-derived node ids.
const NODE_NAMESPACE: Uuid = Uuid::from_u128(0x5c1e_9a3d_27b4_4f0e_8d61_a2f3_0b7c_4e19);

/// Unique identifier for a node
///
/// Ids written by the pipeline are derived from the node's provenance, so the
/// same source document always maps to the same id in both stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Create a new random NodeId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Deterministic id for a node created from the given provenance key.
    pub fn for_provenance(provenance: &str) -> Self {
        Self(Uuid::new_v5(&NODE_NAMESPACE, provenance.as_bytes()))
    }

    /// Create a NodeId from an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse a NodeId from its hyphenated string form.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Properties collection (free-form JSON values, as produced by the classifier)
pub type Properties = serde_json::Map<String, Value>;

/// Well-known property keys.
pub mod property {
    pub const NAME: &str = "name";
    pub const DESCRIPTION: &str = "description";
    pub const DEFINITION: &str = "definition";
    pub const EMBEDDING: &str = "embedding";
    pub const AI_GENERATED: &str = "aiGenerated";
    pub const PROVENANCE: &str = "provenance";
    pub const CREATED_AT: &str = "createdAt";
    pub const CONFIDENCE: &str = "confidenceScore";
}

/// A node in the knowledge graph
///
/// Labels are ordered: layer label first, subtype next, refinements after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub labels: Vec<String>,
    pub properties: Properties,
}

impl GraphNode {
    pub fn new(id: NodeId, labels: Vec<String>, properties: Properties) -> Self {
        Self {
            id,
            labels,
            properties,
        }
    }

    pub fn name(&self) -> Option<&str> {
        string_property(&self.properties, property::NAME)
    }

    /// Description, falling back to a definition when no description was given.
    pub fn description(&self) -> Option<&str> {
        string_property(&self.properties, property::DESCRIPTION)
            .or_else(|| string_property(&self.properties, property::DEFINITION))
    }

    pub fn provenance(&self) -> Option<&str> {
        string_property(&self.properties, property::PROVENANCE)
    }

    pub fn embedding(&self) -> Option<Vec<f32>> {
        self.properties
            .get(property::EMBEDDING)
            .and_then(embedding_from_value)
    }

    pub fn is_ai_generated(&self) -> bool {
        self.properties
            .get(property::AI_GENERATED)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// The subtype label (second position), if any.
    pub fn subtype(&self) -> Option<&str> {
        self.labels.get(1).map(String::as_str)
    }
}

/// Read a non-empty string property.
pub fn string_property<'a>(properties: &'a Properties, key: &str) -> Option<&'a str> {
    properties
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Decode an embedding stored as a JSON array of numbers.
///
/// Returns `None` for anything that is not a non-empty numeric array.
pub fn embedding_from_value(value: &Value) -> Option<Vec<f32>> {
    let items = value.as_array()?;
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

pub fn embedding_to_value(embedding: &[f32]) -> Value {
    Value::Array(
        embedding
            .iter()
            .map(|f| serde_json::Number::from_f64(f64::from(*f)).map_or(Value::Null, Value::Number))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn provenance_ids_are_stable() {
        let a = NodeId::for_provenance("articles/transistor.json");
        let b = NodeId::for_provenance("articles/transistor.json");
        let c = NodeId::for_provenance("articles/diode.json");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn node_id_serializes_as_plain_string() {
        let id = NodeId::for_provenance("x");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        assert_eq!(NodeId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn description_falls_back_to_definition() {
        let mut props = Properties::new();
        props.insert("name".into(), json!("Transistor"));
        props.insert("definition".into(), json!("A semiconductor device"));
        let node = GraphNode::new(NodeId::new(), vec!["L1".into(), "Knowledge".into()], props);
        assert_eq!(node.name(), Some("Transistor"));
        assert_eq!(node.description(), Some("A semiconductor device"));
        assert_eq!(node.subtype(), Some("Knowledge"));
    }

    #[test]
    fn embedding_rejects_non_numeric_arrays() {
        assert!(embedding_from_value(&json!([])).is_none());
        assert!(embedding_from_value(&json!(["a", 1.0])).is_none());
        assert!(embedding_from_value(&json!("0.1,0.2")).is_none());
        assert_eq!(
            embedding_from_value(&json!([0.5, 1])).unwrap(),
            vec![0.5_f32, 1.0]
        );
    }

    #[test]
    fn embedding_survives_json_encoding() {
        let v = vec![0.25_f32, -0.5, 0.125];
        assert_eq!(embedding_from_value(&embedding_to_value(&v)).unwrap(), v);
    }
}
