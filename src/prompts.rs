//! Prompt templates for the three structured calls

use crate::config::ConfigError;
use crate::document::Document;
use crate::schema::{Classification, NodeSubtype};
use std::path::Path;

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You manage a knowledge graph that maps what people do, know and are.

Every node belongs to one layer (L1 for broad concepts, L2 for narrower ones, \
L3 for specific instances) and to one of eight categories:
- Pursuit: activities people engage in over time (careers, hobbies, sports)
- Knowledge: fields of study and bodies of understanding
- Skill: learnable abilities that improve with practice
- Personality: traits, values and dispositions
- Health: physical and mental conditions and practices
- Intrinsic: innate attributes people are born with
- Entity: organisations, places, works and other named things
- Person: individual people

Content that fits none of them is classified with subtype None and must not \
be added. Only propose relationships to nodes you are confident already exist, \
naming them exactly. Always answer by calling the provided tool; never reply \
in plain text.";

/// The configured system prompt, or the built-in one.
pub fn load_system_prompt(path: Option<&Path>) -> Result<String, ConfigError> {
    match path {
        None => Ok(DEFAULT_SYSTEM_PROMPT.to_string()),
        Some(path) => std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Primary classification: title plus the start of the article.
pub fn classification_prompt(doc: &Document, excerpt_chars: usize) -> String {
    format!(
        "Title: {}\nExcerpt: {}...\n\nEvaluate this content and decide whether it belongs in the graph.",
        doc.title,
        doc.excerpt(excerpt_chars)
    )
}

/// Subtype refinement for an accepted classification.
pub fn refinement_prompt(classification: &Classification, category_docs: &str) -> String {
    format!(
        "You classified \"{}\" as {} in the {} layer.\n\n\
         These are the subcategories of {}:\n{}\n\n\
         Select every subcategory that applies, most general first. \
         Select none if no subcategory fits.",
        classification.name().unwrap_or("this content"),
        classification.node_subtype,
        classification.node_type,
        classification.node_subtype,
        category_docs.trim()
    )
}

/// Duplicate adjudication between a proposed node and an existing one.
pub fn similarity_prompt(
    proposed_name: &str,
    proposed_text: &str,
    subtype: NodeSubtype,
    existing_name: &str,
    existing_labels: &[String],
    existing_text: Option<&str>,
) -> String {
    format!(
        "A new {} node is about to be added to the graph.\n\n\
         New node: {}\n{}\n\n\
         Existing node: {} (labels: {})\n{}\n\n\
         Do these describe the same real-world concept?",
        subtype,
        proposed_name,
        proposed_text,
        existing_name,
        existing_labels.join(", "),
        existing_text.unwrap_or("(no description)")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_prompt_truncates_the_body() {
        let doc = Document::new("t.json", "Transistor", "A transistor is a semiconductor device used to amplify");
        let prompt = classification_prompt(&doc, 14);
        assert!(prompt.starts_with("Title: Transistor\nExcerpt: A transistor i..."));
    }

    #[test]
    fn system_prompt_falls_back_to_builtin() {
        assert_eq!(load_system_prompt(None).unwrap(), DEFAULT_SYSTEM_PROMPT);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system_prompt.txt");
        std::fs::write(&path, "custom").unwrap();
        assert_eq!(load_system_prompt(Some(&path)).unwrap(), "custom");
        assert!(load_system_prompt(Some(&dir.path().join("missing.txt"))).is_err());
    }

    #[test]
    fn similarity_prompt_lists_labels() {
        let prompt = similarity_prompt(
            "Transistor",
            "A semiconductor device",
            NodeSubtype::Knowledge,
            "Transistors",
            &["L1".to_string(), "Knowledge".to_string()],
            None,
        );
        assert!(prompt.contains("Transistors (labels: L1, Knowledge)"));
        assert!(prompt.contains("(no description)"));
    }
}
