//! Batch Runner
//!
//! Enumerates documents page by page, runs them through the orchestrator on
//! a bounded pool of tasks, applies the post-action to documents that
//! finished cleanly, and folds every result into the run report.

use super::cancel::CancellationToken;
use super::orchestrator::{DocumentOutcome, Orchestrator};
use super::report::{ReportBuilder, RunReport};
use crate::config::{Config, PostAction};
use crate::document::{DocumentRef, DocumentStore};
use crate::error::{PipelineError, PipelineResult};
use crate::graph::NodeId;
use crate::schema::RelationshipProposal;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RunnerSettings {
    pub concurrency: usize,
    pub post_action: PostAction,
    pub retry_missing_relationships: bool,
    /// Where the report is persisted; not persisted when unset
    pub report_path: Option<PathBuf>,
}

impl RunnerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.runner.concurrency.max(1),
            post_action: config.documents.post_action,
            retry_missing_relationships: config.runner.retry_missing_relationships,
            report_path: Some(config.report.path.clone()),
        }
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            post_action: PostAction::None,
            retry_missing_relationships: true,
            report_path: None,
        }
    }
}

/// What one worker task hands back.
struct TaskResult {
    doc_ref: DocumentRef,
    result: PipelineResult<DocumentOutcome>,
    post_action_error: Option<PipelineError>,
}

/// Relationship proposals waiting for their targets.
struct PendingRelationships {
    source: NodeId,
    proposals: Vec<RelationshipProposal>,
}

pub struct BatchRunner {
    store: Arc<dyn DocumentStore>,
    orchestrator: Arc<Orchestrator>,
    settings: RunnerSettings,
}

impl BatchRunner {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        orchestrator: Arc<Orchestrator>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            store,
            orchestrator,
            settings,
        }
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings.report_path = Some(path.into());
        self
    }

    /// Process every document under `prefix`.
    ///
    /// Once `cancel` fires no new document is started. In-flight documents
    /// that have not reached the write stop at their next suspension point
    /// and are left out of the report; documents already writing finish and
    /// are reported.
    ///
    /// A report that cannot be persisted is still returned, with
    /// `persist_error` set.
    pub async fn run(&self, prefix: &str, cancel: &CancellationToken) -> PipelineResult<RunReport> {
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut tasks: JoinSet<TaskResult> = JoinSet::new();
        let mut builder = ReportBuilder::new();
        let mut pending: Vec<PendingRelationships> = Vec::new();
        let mut page_token: Option<String> = None;

        info!(prefix, concurrency = self.settings.concurrency, "batch started");

        'listing: loop {
            if cancel.is_cancelled() {
                break;
            }
            let page = match self.store.list(prefix, page_token.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    error!(prefix, error = %e, "listing failed, no further documents will be started");
                    builder.record_listing_failure(prefix, &PipelineError::from(e));
                    break;
                }
            };

            for doc_ref in page.refs {
                if !doc_ref.is_processable() {
                    debug!(key = %doc_ref.key, "skipping container or empty entry");
                    continue;
                }

                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break 'listing,
                    permit = semaphore.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break 'listing,
                    },
                };

                while let Some(joined) = tasks.try_join_next() {
                    self.collect(joined, &mut builder, &mut pending);
                }

                let store = self.store.clone();
                let orchestrator = self.orchestrator.clone();
                let cancel = cancel.clone();
                let post_action = self.settings.post_action;
                tasks.spawn(async move {
                    let _permit = permit;
                    process_one(store, orchestrator, doc_ref, cancel, post_action).await
                });
            }

            match page.next_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        while let Some(joined) = tasks.join_next().await {
            self.collect(joined, &mut builder, &mut pending);
        }

        let cancelled = cancel.is_cancelled();
        self.retry_relationships(pending, cancelled, &mut builder).await;

        let mut report = builder.finish(cancelled);
        if let Some(path) = &self.settings.report_path {
            match report.persist(path) {
                Ok(()) => info!(path = %path.display(), "run report written"),
                Err(e) => {
                    error!(path = %path.display(), error = %e, "run report could not be written");
                    report.persist_error = Some(e.to_string());
                }
            }
        }
        info!(
            files = report.files_processed,
            added = report.nodes_added,
            rejected = report.rejected,
            review = report.review_needed,
            failed = report.failed,
            cancelled,
            "batch finished"
        );
        Ok(report)
    }

    fn collect(
        &self,
        joined: Result<TaskResult, JoinError>,
        builder: &mut ReportBuilder,
        pending: &mut Vec<PendingRelationships>,
    ) {
        let task = match joined {
            Ok(task) => task,
            Err(e) => {
                error!(error = %e, "document task aborted");
                builder.record_lost_task(&e.to_string());
                return;
            }
        };
        let key = task.doc_ref.key.as_str();

        if let Err(PipelineError::Cancelled) = &task.result {
            debug!(document = %key, "left out of the report after cancellation");
            return;
        }
        if let Err(e) = &task.result {
            error!(document = %key, kind = e.kind(), error = %e, "document failed");
        }
        if let Ok(DocumentOutcome::Written {
            node_id,
            missing_targets,
            ..
        }) = &task.result
        {
            if !missing_targets.is_empty() {
                pending.push(PendingRelationships {
                    source: *node_id,
                    proposals: missing_targets.clone(),
                });
            }
        }

        builder.record(key, &task.result);
        if let Some(e) = &task.post_action_error {
            warn!(document = %key, error = %e, "post-action failed");
            builder.record_post_action_failure(key, e);
        }
    }

    /// Re-attempt relationships whose targets were missing; later documents
    /// in the batch may have created them.
    async fn retry_relationships(
        &self,
        pending: Vec<PendingRelationships>,
        cancelled: bool,
        builder: &mut ReportBuilder,
    ) {
        let total: usize = pending.iter().map(|p| p.proposals.len()).sum();
        if total == 0 {
            return;
        }
        if !self.settings.retry_missing_relationships || cancelled {
            builder.record_relationship_retry(0, total);
            return;
        }

        let writer = self.orchestrator.writer();
        let (mut created, mut still_missing) = (0, 0);
        for entry in pending {
            match writer
                .create_relationships(&entry.source, &entry.proposals)
                .await
            {
                Ok(outcome) => {
                    created += outcome.created;
                    still_missing += outcome.missing_targets.len();
                }
                Err(e) => {
                    warn!(node = %entry.source, error = %e, "relationship retry failed");
                    still_missing += entry.proposals.len();
                }
            }
        }
        info!(created, still_missing, "relationship retry pass finished");
        builder.record_relationship_retry(created, still_missing);
    }
}

async fn process_one(
    store: Arc<dyn DocumentStore>,
    orchestrator: Arc<Orchestrator>,
    doc_ref: DocumentRef,
    cancel: CancellationToken,
    post_action: PostAction,
) -> TaskResult {
    let result = match store.fetch(&doc_ref).await {
        Ok(doc) => orchestrator.process_with_cancel(&doc, &cancel).await,
        Err(e) => Err(e.into()),
    };

    let post_action_error = match (&result, post_action) {
        (Ok(_), PostAction::ArchiveThenDelete) => archive_then_delete(store.as_ref(), &doc_ref)
            .await
            .err(),
        _ => None,
    };

    TaskResult {
        doc_ref,
        result,
        post_action_error,
    }
}

async fn archive_then_delete(store: &dyn DocumentStore, doc_ref: &DocumentRef) -> PipelineResult<()> {
    store.archive(doc_ref).await?;
    store.delete(doc_ref).await?;
    debug!(document = %doc_ref.key, "archived and deleted");
    Ok(())
}
