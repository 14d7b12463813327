//! Run report
//!
//! Aggregate counters built one document outcome at a time and persisted as
//! JSON at the end of a batch. Field names are a fixed external contract.

use super::orchestrator::DocumentOutcome;
use crate::error::{PipelineError, PipelineResult};
use crate::storage::StorageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One document that ended in an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub filename: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub files_processed: u64,
    pub nodes_added: u64,
    pub rejected: u64,
    pub review_needed: u64,
    pub skipped_duplicates: u64,
    pub already_present: u64,
    pub failed: u64,
    pub relationships_created: u64,
    pub missing_relationship_targets: u64,
    pub partial_commits: u64,
    pub post_action_failures: u64,
    pub average_confidence: f64,
    pub subtype_counts: BTreeMap<String, u64>,
    pub failures: Vec<FailureEntry>,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Set when the report could not be written to disk
    #[serde(skip)]
    pub persist_error: Option<String>,
}

impl RunReport {
    /// Write the report as pretty JSON, creating parent directories.
    pub fn persist(&self, path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let body = serde_json::to_string_pretty(self)?;
        std::fs::write(path, body)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Multi-line human summary for the CLI.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let status = if self.cancelled { "cancelled" } else { "complete" };
        out.push_str(&format!(
            "Run {} ({} -> {})\n",
            status,
            self.started_at.to_rfc3339(),
            self.finished_at.to_rfc3339()
        ));
        for (label, value) in [
            ("files processed", self.files_processed),
            ("nodes added", self.nodes_added),
            ("already present", self.already_present),
            ("rejected", self.rejected),
            ("needing review", self.review_needed),
            ("skipped duplicates", self.skipped_duplicates),
            ("failed", self.failed),
            ("relationships created", self.relationships_created),
            ("missing relationship targets", self.missing_relationship_targets),
            ("partial commits", self.partial_commits),
            ("post-action failures", self.post_action_failures),
        ] {
            out.push_str(&format!("  {:<30}{}\n", label, value));
        }
        out.push_str(&format!(
            "  {:<30}{:.3}\n",
            "average confidence", self.average_confidence
        ));
        if !self.subtype_counts.is_empty() {
            out.push_str("Subtypes:\n");
            for (subtype, count) in &self.subtype_counts {
                out.push_str(&format!("  {:<30}{}\n", subtype, count));
            }
        }
        if !self.failures.is_empty() {
            out.push_str("Failures:\n");
            for failure in &self.failures {
                out.push_str(&format!("  {}: {}\n", failure.filename, failure.error));
            }
        }
        if let Some(e) = &self.persist_error {
            out.push_str(&format!("Report not saved: {}\n", e));
        }
        out
    }
}

/// Accumulates outcomes into a `RunReport`.
#[derive(Debug)]
pub struct ReportBuilder {
    report: RunReport,
    confidence_sum: f64,
    confidence_count: u64,
}

impl ReportBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            report: RunReport {
                files_processed: 0,
                nodes_added: 0,
                rejected: 0,
                review_needed: 0,
                skipped_duplicates: 0,
                already_present: 0,
                failed: 0,
                relationships_created: 0,
                missing_relationship_targets: 0,
                partial_commits: 0,
                post_action_failures: 0,
                average_confidence: 0.0,
                subtype_counts: BTreeMap::new(),
                failures: Vec::new(),
                cancelled: false,
                started_at: now,
                finished_at: now,
                persist_error: None,
            },
            confidence_sum: 0.0,
            confidence_count: 0,
        }
    }

    /// Fold one document's terminal result into the counters.
    ///
    /// Missing relationship targets are counted only by
    /// `record_relationship_retry`, once it is known which ones stayed
    /// unresolved.
    pub fn record(&mut self, document: &str, result: &PipelineResult<DocumentOutcome>) {
        let report = &mut self.report;
        report.files_processed += 1;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                report.failed += 1;
                report.failures.push(FailureEntry {
                    filename: document.to_string(),
                    error: err.to_string(),
                });
                return;
            }
        };

        self.confidence_sum += outcome.classification().confidence_score;
        self.confidence_count += 1;

        match outcome {
            DocumentOutcome::Rejected { .. } => report.rejected += 1,
            DocumentOutcome::NeedsReview { .. } => report.review_needed += 1,
            DocumentOutcome::Duplicate { .. } => {
                report.review_needed += 1;
                report.skipped_duplicates += 1;
            }
            DocumentOutcome::Written {
                classification,
                created,
                relationships_created,
                partial_commit,
                ..
            } => {
                if *created {
                    report.nodes_added += 1;
                } else {
                    report.already_present += 1;
                }
                if *partial_commit {
                    report.partial_commits += 1;
                }
                report.relationships_created += *relationships_created as u64;
                *report
                    .subtype_counts
                    .entry(classification.node_subtype.label().to_string())
                    .or_insert(0) += 1;
            }
        }
    }

    /// Record a document that was processed but whose archive/delete failed.
    pub fn record_post_action_failure(&mut self, document: &str, err: &PipelineError) {
        self.report.post_action_failures += 1;
        self.report.failures.push(FailureEntry {
            filename: document.to_string(),
            error: format!("post-action failed: {}", err),
        });
    }

    /// Listing the source failed; no document is attributed.
    pub fn record_listing_failure(&mut self, prefix: &str, err: &PipelineError) {
        self.report.failures.push(FailureEntry {
            filename: format!("{}*", prefix),
            error: format!("listing failed: {}", err),
        });
    }

    /// A worker task panicked or was aborted before reporting its document.
    pub fn record_lost_task(&mut self, error: &str) {
        self.report.files_processed += 1;
        self.report.failed += 1;
        self.report.failures.push(FailureEntry {
            filename: "<unknown>".to_string(),
            error: error.to_string(),
        });
    }

    /// Result of re-attempting relationships whose targets were missing.
    pub fn record_relationship_retry(&mut self, created: usize, still_missing: usize) {
        self.report.relationships_created += created as u64;
        self.report.missing_relationship_targets += still_missing as u64;
    }

    pub fn finish(mut self, cancelled: bool) -> RunReport {
        self.report.cancelled = cancelled;
        self.report.finished_at = Utc::now();
        self.report.average_confidence = if self.confidence_count == 0 {
            0.0
        } else {
            self.confidence_sum / self.confidence_count as f64
        };
        self.report
    }
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new()
    }
}
