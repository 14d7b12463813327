//! Pipeline Orchestrator
//!
//! Drives one document through classify, refine, duplicate check and write.
//! Steps within a document are strictly sequential and share one
//! conversation history; nothing is shared across documents.
//!
//! ```text
//! Fetched -> Classified -> Rejected
//!                       -> NeedsReview
//!                       -> SubtypeRefined -> DuplicateChecked -> Skipped
//!                                                             -> Written
//! ```

use super::cancel::CancellationToken;
use super::review::{Evaluation, EvaluationSink, EvaluationStatus};
use crate::classifier::{ClassifierClient, Conversation};
use crate::config::PipelineConfig;
use crate::document::Document;
use crate::error::{PipelineError, PipelineResult};
use crate::graph::{property, NodeId};
use crate::prompts;
use crate::resolver::{find_duplicate, Resolution, SimilarityCandidate, SimilarityResolver};
use crate::schema::{CategoryDocs, Classification, RelationshipProposal, SubtypeRefinement};
use crate::writer::{GraphWriter, NodeDraft};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    Fetched,
    Classified,
    Rejected,
    NeedsReview,
    SubtypeRefined,
    DuplicateChecked,
    Skipped,
    Written,
}

/// Terminal result of processing one document.
///
/// Every variant carries the final classification.
#[derive(Debug, Clone)]
pub enum DocumentOutcome {
    Rejected {
        classification: Classification,
        reason: String,
    },
    /// Accepted with a confidence too low to write unattended
    NeedsReview {
        classification: Classification,
        reason: String,
    },
    /// An existing node already covers this document
    Duplicate {
        classification: Classification,
        candidate: SimilarityCandidate,
    },
    Written {
        classification: Classification,
        node_id: NodeId,
        /// False when the node already existed for this document
        created: bool,
        relationships_created: usize,
        missing_targets: Vec<RelationshipProposal>,
        partial_commit: bool,
    },
}

impl DocumentOutcome {
    pub fn classification(&self) -> &Classification {
        match self {
            DocumentOutcome::Rejected { classification, .. }
            | DocumentOutcome::NeedsReview { classification, .. }
            | DocumentOutcome::Duplicate { classification, .. }
            | DocumentOutcome::Written { classification, .. } => classification,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentOutcome::Rejected { .. } => "rejected",
            DocumentOutcome::NeedsReview { .. } => "needs_review",
            DocumentOutcome::Duplicate { .. } => "duplicate",
            DocumentOutcome::Written { created: true, .. } => "written",
            DocumentOutcome::Written { created: false, .. } => "already_present",
        }
    }
}

/// Where a document stands once every stage before the write has run.
enum Prepared {
    Finished(DocumentOutcome),
    ReadyToWrite {
        classification: Classification,
        draft: NodeDraft,
        state: DocumentState,
    },
}

pub struct Orchestrator {
    classifier: Arc<ClassifierClient>,
    resolver: SimilarityResolver,
    writer: Arc<GraphWriter>,
    categories: CategoryDocs,
    sink: Arc<dyn EvaluationSink>,
    settings: PipelineConfig,
}

impl Orchestrator {
    pub fn new(
        classifier: Arc<ClassifierClient>,
        resolver: SimilarityResolver,
        writer: Arc<GraphWriter>,
        categories: CategoryDocs,
        sink: Arc<dyn EvaluationSink>,
        settings: PipelineConfig,
    ) -> Self {
        Self {
            classifier,
            resolver,
            writer,
            categories,
            sink,
            settings,
        }
    }

    pub fn writer(&self) -> &Arc<GraphWriter> {
        &self.writer
    }

    /// Process a document, giving up at the next suspension point once
    /// `cancel` fires.
    ///
    /// Cancellation only reaches the stages before the write. Once a
    /// document starts writing it runs to completion, so a node that lands
    /// in the graph store is always reported, partial commit included.
    pub async fn process_with_cancel(
        &self,
        doc: &Document,
        cancel: &CancellationToken,
    ) -> PipelineResult<DocumentOutcome> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        let prepared = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(document = %doc.id, "document cancelled");
                return Err(PipelineError::Cancelled);
            }
            prepared = self.prepare(doc) => prepared?,
        };
        let outcome = self.commit(doc, prepared).await?;
        log_outcome(doc, &outcome);
        Ok(outcome)
    }

    pub async fn process(&self, doc: &Document) -> PipelineResult<DocumentOutcome> {
        let prepared = self.prepare(doc).await?;
        let outcome = self.commit(doc, prepared).await?;
        log_outcome(doc, &outcome);
        Ok(outcome)
    }

    /// Write a prepared document; documents that ended early pass through.
    async fn commit(&self, doc: &Document, prepared: Prepared) -> PipelineResult<DocumentOutcome> {
        let (classification, draft, mut state) = match prepared {
            Prepared::Finished(outcome) => return Ok(outcome),
            Prepared::ReadyToWrite {
                classification,
                draft,
                state,
            } => (classification, draft, state),
        };

        let receipt = self.writer.create_node(draft).await?;
        let relationships = self
            .writer
            .create_relationships(&receipt.node.id, &classification.relationships)
            .await?;
        advance(doc, &mut state, DocumentState::Written);

        Ok(DocumentOutcome::Written {
            classification,
            node_id: receipt.node.id,
            created: receipt.created,
            relationships_created: relationships.created,
            missing_targets: relationships.missing_targets,
            partial_commit: receipt.partial_commit,
        })
    }

    /// Classify, refine and check for duplicates; nothing is written here.
    async fn prepare(&self, doc: &Document) -> PipelineResult<Prepared> {
        let mut state = DocumentState::Fetched;

        let prompt = prompts::classification_prompt(doc, self.settings.excerpt_chars);
        let (mut classification, history) = self
            .classifier
            .call::<Classification>(&prompt, Conversation::new())
            .await?;
        advance(doc, &mut state, DocumentState::Classified);

        if !classification.is_accepted() {
            let reason = if classification.node_subtype.is_none() {
                "content fits no category".to_string()
            } else {
                "classifier declined to add the content".to_string()
            };
            return self.reject(doc, &mut state, classification, reason).await;
        }

        let confidence = classification.confidence_score;
        if confidence < self.settings.min_confidence {
            let reason = format!(
                "confidence {:.2} is below the minimum of {:.2}",
                confidence, self.settings.min_confidence
            );
            return self.reject(doc, &mut state, classification, reason).await;
        }
        if confidence < self.settings.review_threshold {
            let reason = format!(
                "confidence {:.2} is below the review threshold of {:.2}",
                confidence, self.settings.review_threshold
            );
            classification.mark_for_review(&reason);
            self.record(doc, EvaluationStatus::NeedsReview, &classification, &[], &[], &reason)
                .await?;
            advance(doc, &mut state, DocumentState::NeedsReview);
            return Ok(Prepared::Finished(DocumentOutcome::NeedsReview {
                classification,
                reason,
            }));
        }

        if classification.name().is_none() {
            classification
                .properties
                .insert(property::NAME.to_string(), Value::String(doc.title.clone()));
        }

        let docs = self
            .categories
            .subcategory_docs(classification.node_subtype)?;
        let prompt = prompts::refinement_prompt(&classification, docs);
        let (refinement, _history) = self
            .classifier
            .call::<SubtypeRefinement>(&prompt, history)
            .await?;
        let refinements = refinement.sub_types_selected;
        advance(doc, &mut state, DocumentState::SubtypeRefined);

        let resolution = self.resolver.resolve(doc, &classification).await?;
        advance(doc, &mut state, DocumentState::DuplicateChecked);

        if let Some(candidate) = self.blocking_duplicate(doc, &resolution).await? {
            let note = format!(
                "Similar to existing node \"{}\" ({}), score {:.2}",
                candidate.name, candidate.id, candidate.score
            );
            classification.mark_for_review(&note);
            self.record(
                doc,
                EvaluationStatus::Duplicate,
                &classification,
                &refinements,
                &resolution.candidates,
                &note,
            )
            .await?;
            advance(doc, &mut state, DocumentState::Skipped);
            return Ok(Prepared::Finished(DocumentOutcome::Duplicate {
                classification,
                candidate,
            }));
        }

        let draft = NodeDraft::from_classification(&classification, &refinements, doc.id.as_str())
            .with_embedding(&resolution.embedding);
        Ok(Prepared::ReadyToWrite {
            classification,
            draft,
            state,
        })
    }

    /// The duplicate that stops this write, if any.
    ///
    /// A document's own node that never reached the vector index does not
    /// count: writing again re-attempts the mirror.
    async fn blocking_duplicate(
        &self,
        doc: &Document,
        resolution: &Resolution,
    ) -> PipelineResult<Option<SimilarityCandidate>> {
        let Some(duplicate) = &resolution.duplicate else {
            return Ok(None);
        };
        let own_id = NodeId::for_provenance(&doc.id);
        if duplicate.id != own_id || self.writer.is_mirrored(&own_id).await? {
            return Ok(Some(duplicate.clone()));
        }

        debug!(document = %doc.id, node = %own_id, "own node is not mirrored, healing");
        let others: Vec<SimilarityCandidate> = resolution
            .candidates
            .iter()
            .filter(|c| c.id != own_id)
            .cloned()
            .collect();
        let settings = self.resolver.settings();
        Ok(find_duplicate(&others, settings.duplicate_cutoff, settings.adjudicate).cloned())
    }

    async fn reject(
        &self,
        doc: &Document,
        state: &mut DocumentState,
        classification: Classification,
        reason: String,
    ) -> PipelineResult<Prepared> {
        self.record(doc, EvaluationStatus::Rejected, &classification, &[], &[], &reason)
            .await?;
        advance(doc, state, DocumentState::Rejected);
        Ok(Prepared::Finished(DocumentOutcome::Rejected {
            classification,
            reason,
        }))
    }

    async fn record(
        &self,
        doc: &Document,
        status: EvaluationStatus,
        classification: &Classification,
        refinements: &[String],
        candidates: &[SimilarityCandidate],
        reason: &str,
    ) -> PipelineResult<()> {
        let evaluation = Evaluation {
            document: doc.id.clone(),
            title: doc.title.clone(),
            status,
            reason: reason.to_string(),
            classification: Some(classification.clone()),
            refinements: refinements.to_vec(),
            candidates: candidates.to_vec(),
            recorded_at: Utc::now(),
        };
        self.sink.record(&evaluation).await?;
        Ok(())
    }
}

fn log_outcome(doc: &Document, outcome: &DocumentOutcome) {
    info!(
        document = %doc.id,
        outcome = outcome.label(),
        subtype = %outcome.classification().node_subtype,
        confidence = outcome.classification().confidence_score,
        "document processed"
    );
}

fn advance(doc: &Document, state: &mut DocumentState, next: DocumentState) {
    debug!(document = %doc.id, from = ?*state, to = ?next, "state transition");
    *state = next;
}
