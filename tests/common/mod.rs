//! Shared harness for pipeline scenarios
//!
//! Wires the public mocks into a runnable pipeline: scripted classifier,
//! hashing embedder, in-memory stores, and an evaluation sink that keeps
//! everything in memory.

#![allow(dead_code)]

use async_trait::async_trait;
use atlas_ingest::classifier::{MockClassifier, MockReply};
use atlas_ingest::config::Config;
use atlas_ingest::document::MemoryDocumentStore;
use atlas_ingest::embedding::MockEmbedder;
use atlas_ingest::graph::NodeId;
use atlas_ingest::pipeline::{
    build_runner, BatchRunner, CancellationToken, Components, MemoryEvaluationSink,
};
use atlas_ingest::storage::{
    InMemoryGraphStore, InMemoryVectorIndex, StorageError, StorageResult, VectorFilter,
    VectorIndex, VectorMatch, VectorMetadata,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const DIMENSIONS: usize = 32;

pub struct Harness {
    pub documents: Arc<MemoryDocumentStore>,
    pub classifier: Arc<MockClassifier>,
    pub graph: Arc<InMemoryGraphStore>,
    pub vectors: Arc<FailingVectorIndex>,
    pub sink: Arc<MemoryEvaluationSink>,
    pub config: Config,
    dir: TempDir,
}

impl Harness {
    pub fn new(classifier: MockClassifier) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.classifier.endpoint = "http://localhost:0/v1".into();
        config.classifier.backoff_initial_ms = 0;
        config.classifier.backoff_max_ms = 0;
        config.embedder.dimensions = DIMENSIONS;
        config.runner.concurrency = 1;
        config.report.path = dir.path().join("run_report.json");

        Self {
            documents: Arc::new(MemoryDocumentStore::new()),
            classifier: Arc::new(classifier),
            graph: Arc::new(InMemoryGraphStore::new()),
            vectors: Arc::new(FailingVectorIndex::new()),
            sink: Arc::new(MemoryEvaluationSink::new()),
            config,
            dir,
        }
    }

    pub fn report_path(&self) -> PathBuf {
        self.config.report.path.clone()
    }

    pub fn runner(&self) -> BatchRunner {
        let components = Components {
            documents: self.documents.clone(),
            classifier: self.classifier.clone(),
            embedder: Arc::new(MockEmbedder::new(DIMENSIONS)),
            graph: self.graph.clone(),
            vectors: self.vectors.clone(),
            sink: self.sink.clone(),
        };
        build_runner(&self.config, components).unwrap()
    }
}

/// Arguments of a `handleChoice` call.
pub fn classification(name: &str, subtype: &str, confidence: f64) -> Value {
    json!({
        "nodeType": "L1",
        "nodeSubtype": subtype,
        "properties": {
            "name": name,
            "description": format!("{} as described in its article", name)
        },
        "relationships": [],
        "confidenceScore": confidence,
        "reasoning": "clear encyclopedic concept",
        "shouldAdd": subtype != "None"
    })
}

pub fn refinement(labels: &[&str]) -> MockReply {
    MockReply::Tool(json!({
        "subTypesSelected": labels,
        "selectionReason": "fits the article"
    }))
}

pub fn similar(score: f64) -> MockReply {
    MockReply::Tool(json!({
        "areSimilar": true,
        "similarityScore": score,
        "reasoning": "same concept"
    }))
}

pub fn not_similar() -> MockReply {
    MockReply::Tool(json!({
        "areSimilar": false,
        "similarityScore": 0.1,
        "reasoning": "different concepts"
    }))
}

/// In-memory vector index whose upserts can be made to fail, or to cancel
/// the run while the write is in flight.
pub struct FailingVectorIndex {
    inner: InMemoryVectorIndex,
    failing: AtomicBool,
    upserts: AtomicUsize,
    cancel_on_upsert: Mutex<Option<CancellationToken>>,
}

impl FailingVectorIndex {
    pub fn new() -> Self {
        Self {
            inner: InMemoryVectorIndex::new(),
            failing: AtomicBool::new(false),
            upserts: AtomicUsize::new(0),
            cancel_on_upsert: Mutex::new(None),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Cancel `token` at the start of every upsert, then stall briefly.
    pub fn cancel_on_upsert(&self, token: CancellationToken) {
        *self.cancel_on_upsert.lock().unwrap() = Some(token);
    }

    /// Successful upserts so far.
    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorIndex for FailingVectorIndex {
    async fn upsert(&self, id: &NodeId, vector: &[f32], metadata: VectorMetadata) -> StorageResult<()> {
        let token = self.cancel_on_upsert.lock().unwrap().clone();
        if let Some(token) = token {
            token.cancel();
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("vector index unavailable".into()));
        }
        self.inner.upsert(id, vector, metadata).await?;
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&VectorFilter>,
    ) -> StorageResult<Vec<VectorMatch>> {
        self.inner.query(vector, top_k, filter).await
    }

    async fn contains(&self, id: &NodeId) -> StorageResult<bool> {
        self.inner.contains(id).await
    }

    async fn len(&self) -> StorageResult<usize> {
        self.inner.len().await
    }
}
