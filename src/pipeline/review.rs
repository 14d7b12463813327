//! Evaluation sink
//!
//! Documents that are not written (rejected, low confidence, duplicates)
//! leave their evaluation behind for a human to inspect.

use crate::resolver::SimilarityCandidate;
use crate::schema::Classification;
use crate::storage::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    Rejected,
    NeedsReview,
    Duplicate,
}

impl EvaluationStatus {
    /// Folder the filesystem sink files this status under.
    pub fn folder(&self) -> &'static str {
        match self {
            EvaluationStatus::Rejected => "rejected",
            EvaluationStatus::NeedsReview | EvaluationStatus::Duplicate => "needs_review",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub document: String,
    pub title: String,
    pub status: EvaluationStatus,
    pub reason: String,
    #[serde(default)]
    pub classification: Option<Classification>,
    #[serde(default)]
    pub refinements: Vec<String>,
    #[serde(default)]
    pub candidates: Vec<SimilarityCandidate>,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait EvaluationSink: Send + Sync {
    async fn record(&self, evaluation: &Evaluation) -> Result<(), StorageError>;
}

/// Writes `<dir>/<folder>/<document>.json`, one file per evaluation.
///
/// The document key's directories are mirrored under the status folder.
pub struct FsEvaluationSink {
    dir: PathBuf,
}

impl FsEvaluationSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, evaluation: &Evaluation) -> PathBuf {
        let key = evaluation.document.trim_end_matches(".json");
        let parts: Vec<&str> = key
            .split(['/', '\\'])
            .filter(|p| !p.is_empty() && *p != "." && *p != "..")
            .collect();

        let mut path = self.dir.join(evaluation.status.folder());
        match parts.split_last() {
            Some((file, dirs)) => {
                path.extend(dirs);
                path.push(format!("{}.json", file));
            }
            None => path.push("_.json"),
        }
        path
    }
}

#[async_trait]
impl EvaluationSink for FsEvaluationSink {
    async fn record(&self, evaluation: &Evaluation) -> Result<(), StorageError> {
        let path = self.path_for(evaluation);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(evaluation)?;
        tokio::fs::write(&path, body).await?;
        Ok(())
    }
}

/// Keeps evaluations in memory.
#[derive(Default)]
pub struct MemoryEvaluationSink {
    evaluations: Mutex<Vec<Evaluation>>,
}

impl MemoryEvaluationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluations(&self) -> Vec<Evaluation> {
        self.evaluations.lock().unwrap().clone()
    }

    pub fn with_status(&self, status: EvaluationStatus) -> Vec<Evaluation> {
        self.evaluations()
            .into_iter()
            .filter(|e| e.status == status)
            .collect()
    }
}

#[async_trait]
impl EvaluationSink for MemoryEvaluationSink {
    async fn record(&self, evaluation: &Evaluation) -> Result<(), StorageError> {
        self.evaluations.lock().unwrap().push(evaluation.clone());
        Ok(())
    }
}
