//! Relationships between graph nodes

use super::node::{NodeId, Properties};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A directed, typed relationship between two existing nodes.
///
/// Identity is `(source, rel_type, target)`; stores merge on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(rename = "type")]
    pub rel_type: String,
    #[serde(default)]
    pub properties: Properties,
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    pub fn new(source: NodeId, rel_type: impl Into<String>, target: NodeId) -> Self {
        Self {
            source,
            target,
            rel_type: rel_type.into(),
            properties: Properties::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }
}

/// Normalize a free-form relationship type into `UPPER_SNAKE_CASE`.
///
/// `"is part of"` and `"isPartOf"` both become `IS_PART_OF`. Returns `None`
/// when nothing usable remains.
pub fn normalize_relationship_type(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len() + 4);
    let mut prev_lower = false;
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if ch.is_ascii_uppercase() && prev_lower && !out.ends_with('_') {
                out.push('_');
            }
            out.push(ch.to_ascii_uppercase());
            prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
        } else {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        }
    }
    let trimmed = out.trim_matches('_').to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relationship_types_are_upper_snake() {
        assert_eq!(normalize_relationship_type("is part of").as_deref(), Some("IS_PART_OF"));
        assert_eq!(normalize_relationship_type("isPartOf").as_deref(), Some("IS_PART_OF"));
        assert_eq!(normalize_relationship_type("REQUIRES_KNOWLEDGE").as_deref(), Some("REQUIRES_KNOWLEDGE"));
        assert_eq!(normalize_relationship_type("  used-in ").as_deref(), Some("USED_IN"));
        assert_eq!(normalize_relationship_type(" -- "), None);
    }

    #[test]
    fn relationship_serializes_type_field() {
        let rel = Relationship::new(NodeId::new(), "USED_IN", NodeId::new());
        let json = serde_json::to_value(&rel).unwrap();
        assert_eq!(json["type"], "USED_IN");
    }
}
