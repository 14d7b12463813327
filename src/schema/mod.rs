//! Typed categories, subtypes and the node/relationship shape admitted into the graph.

mod category;
mod outputs;

pub use category::{CategoryDocs, NodeSubtype, NodeType};
pub use outputs::{Classification, RelationshipProposal, SimilarityVerdict, SubtypeRefinement};
