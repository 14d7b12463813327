//! Similarity Resolver
//!
//! Decides whether a proposed node duplicates an existing one before any
//! write. Two independent read adapters (vector neighbours and graph name
//! matches) feed a pure reconciliation step; surviving candidates can be
//! adjudicated by the classifier.

use crate::classifier::{ClassifierClient, Conversation};
use crate::config::PipelineConfig;
use crate::document::Document;
use crate::embedding::Embedder;
use crate::error::PipelineResult;
use crate::graph::{GraphNode, NodeId};
use crate::prompts;
use crate::schema::{Classification, SimilarityVerdict};
use crate::storage::{GraphStore, VectorFilter, VectorIndex, VectorMatch};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateSource {
    Vector,
    Graph,
}

/// An existing node that may be the same concept as the proposed one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityCandidate {
    pub id: NodeId,
    pub name: String,
    pub labels: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub score: f64,
    pub source: CandidateSource,
    #[serde(default)]
    pub llm_verified: Option<bool>,
    #[serde(default)]
    pub llm_confidence: Option<f64>,
    #[serde(default)]
    pub llm_reasoning: Option<String>,
}

impl SimilarityCandidate {
    pub fn from_vector_match(m: VectorMatch) -> Self {
        Self {
            id: m.id,
            name: m.metadata.name,
            labels: m.metadata.labels,
            description: m.metadata.description,
            score: f64::from(m.score),
            source: CandidateSource::Vector,
            llm_verified: None,
            llm_confidence: None,
            llm_reasoning: None,
        }
    }

    pub fn from_graph_node(node: &GraphNode, query_name: &str) -> Self {
        let name = node.name().unwrap_or_default().to_string();
        Self {
            id: node.id,
            score: name_score(query_name, &name),
            name,
            labels: node.labels.clone(),
            description: node.description().map(str::to_string),
            source: CandidateSource::Graph,
            llm_verified: None,
            llm_confidence: None,
            llm_reasoning: None,
        }
    }
}

/// Score for a case-insensitive substring match on names.
///
/// Exact matches score 1.0; otherwise the length ratio of the shorter name
/// to the longer one.
pub fn name_score(query: &str, candidate: &str) -> f64 {
    let q = query.trim().to_lowercase();
    let c = candidate.trim().to_lowercase();
    if q.is_empty() || c.is_empty() {
        return 0.0;
    }
    if q == c {
        return 1.0;
    }
    let (ql, cl) = (q.chars().count() as f64, c.chars().count() as f64);
    ql.min(cl) / ql.max(cl)
}

/// Merge vector and graph candidates.
///
/// Deduplicates by node id (first occurrence wins, vector results first),
/// then orders by score, preferring graph matches on equal scores.
pub fn merge_candidates(
    vector: Vec<SimilarityCandidate>,
    graph: Vec<SimilarityCandidate>,
) -> Vec<SimilarityCandidate> {
    let mut seen = HashSet::new();
    let mut merged: Vec<SimilarityCandidate> = vector
        .into_iter()
        .chain(graph)
        .filter(|c| seen.insert(c.id))
        .collect();
    merged.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| source_rank(a.source).cmp(&source_rank(b.source)))
    });
    merged
}

fn source_rank(source: CandidateSource) -> u8 {
    match source {
        CandidateSource::Graph => 0,
        CandidateSource::Vector => 1,
    }
}

/// The first candidate that blocks the write, if any.
///
/// With adjudication, a candidate must be verified and score above the
/// cutoff. Without it, the score alone decides.
pub fn find_duplicate(
    candidates: &[SimilarityCandidate],
    cutoff: f64,
    adjudicated: bool,
) -> Option<&SimilarityCandidate> {
    candidates.iter().find(|c| {
        let verified = !adjudicated || c.llm_verified == Some(true);
        verified && c.score > cutoff
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolverSettings {
    pub similarity_threshold: f64,
    pub duplicate_cutoff: f64,
    pub vector_top_k: usize,
    pub graph_match_limit: usize,
    pub excerpt_chars: usize,
    pub adjudicate: bool,
}

impl From<&PipelineConfig> for ResolverSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            similarity_threshold: config.similarity_threshold,
            duplicate_cutoff: config.duplicate_cutoff,
            vector_top_k: config.vector_top_k,
            graph_match_limit: config.graph_match_limit,
            excerpt_chars: config.excerpt_chars,
            adjudicate: config.adjudicate,
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

/// Everything the resolver learned about a proposed node.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub search_text: String,
    /// Embedding of `search_text`, reused for the node write
    pub embedding: Vec<f32>,
    pub candidates: Vec<SimilarityCandidate>,
    pub duplicate: Option<SimilarityCandidate>,
}

/// Name the proposed node goes by: its `name` property, else the title.
pub fn proposed_name<'a>(classification: &'a Classification, doc: &'a Document) -> &'a str {
    classification.name().unwrap_or(doc.title.as_str())
}

/// Text embedded for the similarity search and stored with the node.
pub fn search_text(classification: &Classification, doc: &Document, excerpt_chars: usize) -> String {
    let name = proposed_name(classification, doc);
    let body = classification
        .description()
        .unwrap_or_else(|| doc.excerpt(excerpt_chars));
    format!("{}: {}", name, body.trim())
}

pub struct SimilarityResolver {
    graph: Arc<dyn GraphStore>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    classifier: Arc<ClassifierClient>,
    settings: ResolverSettings,
}

impl SimilarityResolver {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        classifier: Arc<ClassifierClient>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            graph,
            vectors,
            embedder,
            classifier,
            settings,
        }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    pub async fn resolve(
        &self,
        doc: &Document,
        classification: &Classification,
    ) -> PipelineResult<Resolution> {
        let search_text = search_text(classification, doc, self.settings.excerpt_chars);
        let embedding = self.embedder.embed(&search_text).await?;
        let subtype = classification.node_subtype.label();

        let vector_hits: Vec<SimilarityCandidate> = self
            .vectors
            .query(
                &embedding,
                self.settings.vector_top_k,
                Some(&VectorFilter::subtype(subtype)),
            )
            .await?
            .into_iter()
            .filter(|m| f64::from(m.score) >= self.settings.similarity_threshold)
            .map(SimilarityCandidate::from_vector_match)
            .collect();

        let name = proposed_name(classification, doc);
        let graph_hits: Vec<SimilarityCandidate> = self
            .graph
            .search_by_name(name, Some(subtype), self.settings.graph_match_limit)
            .await?
            .iter()
            .map(|node| SimilarityCandidate::from_graph_node(node, name))
            .collect();

        debug!(
            document = %doc.id,
            vector = vector_hits.len(),
            graph = graph_hits.len(),
            "similarity candidates found"
        );

        let mut candidates = merge_candidates(vector_hits, graph_hits);
        if self.settings.adjudicate {
            let proposed_text = classification
                .description()
                .unwrap_or_else(|| doc.excerpt(self.settings.excerpt_chars));
            for candidate in candidates.iter_mut() {
                let needs_check = candidate.source == CandidateSource::Vector
                    || candidate.score > self.settings.similarity_threshold;
                if needs_check {
                    self.adjudicate(candidate, name, proposed_text, classification)
                        .await?;
                }
            }
        }

        let duplicate = find_duplicate(
            &candidates,
            self.settings.duplicate_cutoff,
            self.settings.adjudicate,
        )
        .cloned();

        Ok(Resolution {
            search_text,
            embedding,
            candidates,
            duplicate,
        })
    }

    async fn adjudicate(
        &self,
        candidate: &mut SimilarityCandidate,
        proposed_name: &str,
        proposed_text: &str,
        classification: &Classification,
    ) -> PipelineResult<()> {
        let prompt = prompts::similarity_prompt(
            proposed_name,
            proposed_text,
            classification.node_subtype,
            &candidate.name,
            &candidate.labels,
            candidate.description.as_deref(),
        );
        let (verdict, _) = self
            .classifier
            .call::<SimilarityVerdict>(&prompt, Conversation::new())
            .await?;
        debug!(
            candidate = %candidate.name,
            similar = verdict.are_similar,
            confidence = verdict.similarity_score,
            "candidate adjudicated"
        );
        candidate.llm_verified = Some(verdict.are_similar);
        candidate.llm_confidence = Some(verdict.similarity_score);
        candidate.llm_reasoning = Some(verdict.reasoning);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: NodeId, score: f64, source: CandidateSource) -> SimilarityCandidate {
        SimilarityCandidate {
            id,
            name: "n".into(),
            labels: vec![],
            description: None,
            score,
            source,
            llm_verified: None,
            llm_confidence: None,
            llm_reasoning: None,
        }
    }

    #[test]
    fn name_score_prefers_exact_matches() {
        assert_eq!(name_score("Transistor", "transistor"), 1.0);
        assert!((name_score("Transistor", "Transistors") - 10.0 / 11.0).abs() < 1e-9);
        assert_eq!(name_score("", "x"), 0.0);
    }

    #[test]
    fn merge_dedups_by_id_first_occurrence_wins() {
        let shared = NodeId::new();
        let merged = merge_candidates(
            vec![candidate(shared, 0.95, CandidateSource::Vector)],
            vec![
                candidate(shared, 1.0, CandidateSource::Graph),
                candidate(NodeId::new(), 0.5, CandidateSource::Graph),
            ],
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id, shared);
        assert_eq!(merged[0].source, CandidateSource::Vector);
        assert_eq!(merged[0].score, 0.95);
    }

    #[test]
    fn ties_prefer_graph_matches() {
        let merged = merge_candidates(
            vec![candidate(NodeId::new(), 0.8, CandidateSource::Vector)],
            vec![candidate(NodeId::new(), 0.8, CandidateSource::Graph)],
        );
        assert_eq!(merged[0].source, CandidateSource::Graph);
        assert_eq!(merged[1].source, CandidateSource::Vector);
    }

    #[test]
    fn duplicates_need_verification_when_adjudicating() {
        let mut c = candidate(NodeId::new(), 0.97, CandidateSource::Vector);
        assert!(find_duplicate(&[c.clone()], 0.92, true).is_none());
        assert!(find_duplicate(&[c.clone()], 0.92, false).is_some());

        c.llm_verified = Some(true);
        assert!(find_duplicate(&[c.clone()], 0.92, true).is_some());

        c.score = 0.92;
        assert!(find_duplicate(&[c], 0.92, true).is_none());
    }

    #[test]
    fn search_text_falls_back_to_excerpt() {
        let doc = Document::new("k", "Transistor", "A transistor is a semiconductor device");
        let c: Classification = serde_json::from_value(serde_json::json!({
            "nodeType": "L1", "nodeSubtype": "Knowledge",
            "confidenceScore": 0.9, "shouldAdd": true
        }))
        .unwrap();
        assert_eq!(search_text(&c, &doc, 12), "Transistor: A transistor");
    }
}
