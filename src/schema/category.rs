//! Layer and subtype enumerations plus per-category subtype documentation.

use crate::config::ConfigError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Graph layer a node lives in. The layer label is always a node's first label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum NodeType {
    L1,
    L2,
    L3,
}

impl NodeType {
    pub fn label(&self) -> &'static str {
        match self {
            NodeType::L1 => "L1",
            NodeType::L2 => "L2",
            NodeType::L3 => "L3",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Top-level category a document is classified into.
///
/// `None` means the content does not belong in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum NodeSubtype {
    #[serde(alias = "PURSUIT")]
    Pursuit,
    #[serde(alias = "KNOWLEDGE")]
    Knowledge,
    #[serde(alias = "SKILL")]
    Skill,
    #[serde(alias = "PERSONALITY")]
    Personality,
    #[serde(alias = "HEALTH")]
    Health,
    #[serde(alias = "INTRINSIC")]
    Intrinsic,
    #[serde(alias = "ENTITY")]
    Entity,
    #[serde(alias = "PERSON")]
    Person,
    #[serde(alias = "NONE")]
    None,
}

impl NodeSubtype {
    /// Every real category, in documentation order.
    pub const CATEGORIES: [NodeSubtype; 8] = [
        NodeSubtype::Pursuit,
        NodeSubtype::Knowledge,
        NodeSubtype::Skill,
        NodeSubtype::Personality,
        NodeSubtype::Health,
        NodeSubtype::Intrinsic,
        NodeSubtype::Entity,
        NodeSubtype::Person,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            NodeSubtype::Pursuit => "Pursuit",
            NodeSubtype::Knowledge => "Knowledge",
            NodeSubtype::Skill => "Skill",
            NodeSubtype::Personality => "Personality",
            NodeSubtype::Health => "Health",
            NodeSubtype::Intrinsic => "Intrinsic",
            NodeSubtype::Entity => "Entity",
            NodeSubtype::Person => "Person",
            NodeSubtype::None => "None",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, NodeSubtype::None)
    }

    /// File name holding this category's documentation in a docs directory.
    pub fn docs_file_name(&self) -> String {
        format!("{}.txt", self.label().to_lowercase())
    }
}

impl fmt::Display for NodeSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Subcategory documentation for every category, used by subtype refinement.
#[derive(Debug, Clone)]
pub struct CategoryDocs {
    docs: HashMap<NodeSubtype, String>,
}

impl CategoryDocs {
    /// Documentation compiled into the binary.
    pub fn builtin() -> Self {
        let docs = NodeSubtype::CATEGORIES
            .iter()
            .map(|c| (*c, builtin_docs(*c).to_string()))
            .collect();
        Self { docs }
    }

    /// Load `<category>.txt` for every category from `dir`.
    ///
    /// A missing or empty file is a configuration error.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let mut docs = HashMap::new();
        for category in NodeSubtype::CATEGORIES {
            let path = dir.join(category.docs_file_name());
            let text = std::fs::read_to_string(&path).map_err(|e| {
                ConfigError::MissingCategoryDocs {
                    category: category.label().to_string(),
                    detail: format!("{}: {}", path.display(), e),
                }
            })?;
            if text.trim().is_empty() {
                return Err(ConfigError::MissingCategoryDocs {
                    category: category.label().to_string(),
                    detail: format!("{} is empty", path.display()),
                });
            }
            docs.insert(category, text);
        }
        Ok(Self { docs })
    }

    /// Documentation describing the valid subcategories of `category`.
    pub fn subcategory_docs(&self, category: NodeSubtype) -> Result<&str, ConfigError> {
        self.docs
            .get(&category)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::MissingCategoryDocs {
                category: category.label().to_string(),
                detail: "category has no documentation".to_string(),
            })
    }
}

fn builtin_docs(category: NodeSubtype) -> &'static str {
    match category {
        NodeSubtype::Pursuit => {
            "Pursuits are things a person does: jobs, hobbies, sports, crafts and any other \
             activity people engage in over time.\n\
             Subcategories: Career, Hobby, Sport, Art, Craft, Volunteering, Game, Outdoor."
        }
        NodeSubtype::Knowledge => {
            "Knowledge is anything a person can know about or be aware of: ideas, beliefs, \
             fields of study, historical knowledge and 'how to' knowledge. Measured with \
             Bloom's levels (Remember, Understand, Apply, Analyze, Evaluate, Create).\n\
             Subcategories: Science, Technology, Mathematics, History, Philosophy, Religion, \
             Economics, Politics, Language, Literature, Art, Law, Medicine, Geography."
        }
        NodeSubtype::Skill => {
            "Skills are specific abilities or techniques developed through training or \
             practice; what someone can actually do. Measured with the Dreyfus model \
             (Novice through Mastery).\n\
             Subcategories: Technical, Physical, Creative, Communication, Leadership, \
             Analytical, Social, Manual."
        }
        NodeSubtype::Personality => {
            "Personality is a person's pattern of behavior, cognition and emotion, described \
             with the Big Five model.\n\
             Subcategories: Openness, Conscientiousness, Extraversion, Agreeableness, \
             Neuroticism, Facet."
        }
        NodeSubtype::Health => {
            "Health covers physical and mental wellbeing: conditions, practices, fitness and \
             nutrition.\n\
             Subcategories: Physical, Mental, Nutrition, Fitness, Condition, Sleep."
        }
        NodeSubtype::Intrinsic => {
            "Intrinsic attributes are innate or fixed characteristics of a person, such as \
             aptitudes, senses and heritable traits.\n\
             Subcategories: Aptitude, Sense, Temperament, Physiology."
        }
        NodeSubtype::Entity => {
            "Entities are organizations, places, works and other named things a person can \
             relate to.\n\
             Subcategories: Organization, Place, Work, Product, Event."
        }
        NodeSubtype::Person => {
            "People are notable individuals, real or historical.\n\
             Subcategories: Scientist, Artist, Athlete, Leader, Writer, Inventor."
        }
        NodeSubtype::None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtype_accepts_uppercase_aliases() {
        let s: NodeSubtype = serde_json::from_str("\"KNOWLEDGE\"").unwrap();
        assert_eq!(s, NodeSubtype::Knowledge);
        let s: NodeSubtype = serde_json::from_str("\"Knowledge\"").unwrap();
        assert_eq!(s, NodeSubtype::Knowledge);
        assert!(serde_json::from_str::<NodeSubtype>("\"knowledgeish\"").is_err());
    }

    #[test]
    fn builtin_docs_cover_every_category() {
        let docs = CategoryDocs::builtin();
        for c in NodeSubtype::CATEGORIES {
            assert!(!docs.subcategory_docs(c).unwrap().is_empty());
        }
        assert!(docs.subcategory_docs(NodeSubtype::None).is_err());
    }

    #[test]
    fn load_requires_every_category_file() {
        let dir = tempfile::tempdir().unwrap();
        for c in NodeSubtype::CATEGORIES.iter().skip(1) {
            std::fs::write(dir.path().join(c.docs_file_name()), "docs").unwrap();
        }
        let err = CategoryDocs::load(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCategoryDocs { ref category, .. } if category == "Pursuit"));

        std::fs::write(dir.path().join("pursuit.txt"), "Pursuits: Hobby, Career").unwrap();
        let docs = CategoryDocs::load(dir.path()).unwrap();
        assert_eq!(
            docs.subcategory_docs(NodeSubtype::Pursuit).unwrap(),
            "Pursuits: Hobby, Career"
        );
    }
}
