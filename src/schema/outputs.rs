//! Typed results of the classifier's structured tool calls.
//!
//! Each type is decoded strictly from the tool call arguments; anything that
//! does not decode, or fails `validate`, is a schema violation.

use super::category::{NodeSubtype, NodeType};
use crate::classifier::ToolOutput;
use crate::graph::{property, string_property, Properties};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A relationship the classifier proposes from the new node to an existing one.
///
/// The target is resolved by exact name when the relationship is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipProposal {
    /// Relationship type, e.g. REQUIRES_KNOWLEDGE or PART_OF
    #[serde(rename = "type")]
    pub rel_type: String,
    /// Exact name of the existing node this relationship points to
    pub target_node_name: String,
    /// Properties to set on the relationship
    #[serde(default)]
    pub properties: Properties,
}

/// The classifier's verdict on a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    /// Graph layer of the node: L1, L2 or L3
    pub node_type: NodeType,
    /// Category of the node, or None when the content does not belong in the graph
    pub node_subtype: NodeSubtype,
    /// Node properties. Must include name and description (or definition)
    #[serde(default)]
    pub properties: Properties,
    /// Relationships from the new node to existing nodes
    #[serde(default)]
    pub relationships: Vec<RelationshipProposal>,
    /// Confidence in this classification, between 0 and 1
    pub confidence_score: f64,
    /// Why this classification was chosen
    #[serde(default)]
    pub reasoning: String,
    /// Whether the node should be added to the graph
    pub should_add: bool,
}

impl Classification {
    pub fn name(&self) -> Option<&str> {
        string_property(&self.properties, property::NAME)
    }

    pub fn description(&self) -> Option<&str> {
        string_property(&self.properties, property::DESCRIPTION)
            .or_else(|| string_property(&self.properties, property::DEFINITION))
    }

    /// True when the document should proceed past classification.
    pub fn is_accepted(&self) -> bool {
        self.should_add && !self.node_subtype.is_none()
    }

    /// Route to review: clears `should_add` and records why.
    pub fn mark_for_review(&mut self, note: &str) {
        self.should_add = false;
        if self.reasoning.is_empty() {
            self.reasoning = note.to_string();
        } else {
            self.reasoning = format!("{}\n\n{}", self.reasoning, note);
        }
    }
}

impl ToolOutput for Classification {
    const TOOL_NAME: &'static str = "handleChoice";
    const DESCRIPTION: &'static str =
        "Records the category chosen for the provided content and the node to create from it";

    fn validate(&mut self) -> Result<(), String> {
        check_unit_interval("confidenceScore", self.confidence_score)?;
        if self.node_subtype.is_none() {
            self.should_add = false;
        }
        for rel in &self.relationships {
            if rel.rel_type.trim().is_empty() || rel.target_node_name.trim().is_empty() {
                return Err("relationship proposals need a type and a targetNodeName".to_string());
            }
        }
        Ok(())
    }
}

/// Second-stage refinement of a category into finer labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubtypeRefinement {
    /// The finer-grained subtypes that apply, most specific last
    pub sub_types_selected: Vec<String>,
    /// Why these subtypes were selected
    #[serde(default)]
    pub selection_reason: String,
}

impl ToolOutput for SubtypeRefinement {
    const TOOL_NAME: &'static str = "refineNodeSubTypes";
    const DESCRIPTION: &'static str =
        "Selects the subcategories of the chosen category that apply to the content";

    fn validate(&mut self) -> Result<(), String> {
        self.sub_types_selected.retain(|s| !s.trim().is_empty());
        Ok(())
    }
}

/// Adjudication of whether a proposed node duplicates an existing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityVerdict {
    /// True if both nodes describe the same real-world concept
    pub are_similar: bool,
    /// How similar the two nodes are, between 0 and 1
    pub similarity_score: f64,
    /// Why the nodes are or are not the same
    #[serde(default)]
    pub reasoning: String,
}

impl ToolOutput for SimilarityVerdict {
    const TOOL_NAME: &'static str = "assessSimilarity";
    const DESCRIPTION: &'static str =
        "Reports whether a proposed node and an existing node are the same concept";

    fn validate(&mut self) -> Result<(), String> {
        check_unit_interval("similarityScore", self.similarity_score)
    }
}

fn check_unit_interval(field: &str, value: f64) -> Result<(), String> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(format!("{} must be within [0, 1], got {}", field, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode<T: ToolOutput>(value: serde_json::Value) -> Result<T, String> {
        let mut out: T = serde_json::from_value(value).map_err(|e| e.to_string())?;
        out.validate()?;
        Ok(out)
    }

    #[test]
    fn classification_decodes_camel_case() {
        let c: Classification = decode(json!({
            "nodeType": "L1",
            "nodeSubtype": "Knowledge",
            "properties": {"name": "Transistor", "description": "A semiconductor device"},
            "relationships": [{"type": "PART_OF", "targetNodeName": "Electronics"}],
            "confidenceScore": 0.9,
            "reasoning": "Physics topic",
            "shouldAdd": true
        }))
        .unwrap();
        assert_eq!(c.node_subtype, NodeSubtype::Knowledge);
        assert_eq!(c.name(), Some("Transistor"));
        assert_eq!(c.relationships[0].target_node_name, "Electronics");
        assert!(c.is_accepted());
    }

    #[test]
    fn none_subtype_never_adds() {
        let c: Classification = decode(json!({
            "nodeType": "L1",
            "nodeSubtype": "None",
            "confidenceScore": 0.95,
            "shouldAdd": true
        }))
        .unwrap();
        assert!(!c.should_add);
        assert!(!c.is_accepted());
    }

    #[test]
    fn confidence_is_required_and_bounded() {
        assert!(decode::<Classification>(json!({
            "nodeType": "L1", "nodeSubtype": "Skill", "shouldAdd": true
        }))
        .is_err());
        assert!(decode::<Classification>(json!({
            "nodeType": "L1", "nodeSubtype": "Skill", "shouldAdd": true, "confidenceScore": 1.4
        }))
        .is_err());
    }

    #[test]
    fn mark_for_review_appends_reasoning() {
        let mut c: Classification = decode(json!({
            "nodeType": "L1", "nodeSubtype": "Skill", "shouldAdd": true,
            "confidenceScore": 0.9, "reasoning": "A skill"
        }))
        .unwrap();
        c.mark_for_review("duplicate of Welding");
        assert!(!c.should_add);
        assert_eq!(c.reasoning, "A skill\n\nduplicate of Welding");
    }

    #[test]
    fn refinement_drops_blank_labels() {
        let r: SubtypeRefinement = decode(json!({
            "subTypesSelected": ["History", " "],
            "selectionReason": "historical"
        }))
        .unwrap();
        assert_eq!(r.sub_types_selected, vec!["History".to_string()]);
    }

    #[test]
    fn verdict_score_must_be_bounded() {
        assert!(decode::<SimilarityVerdict>(json!({
            "areSimilar": true, "similarityScore": -0.1
        }))
        .is_err());
    }
}
