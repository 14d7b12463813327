//! Wiring a runnable pipeline from configuration
//!
//! Everything that can fail with a configuration error is resolved here,
//! before the first document is listed.

use super::orchestrator::Orchestrator;
use super::review::{EvaluationSink, FsEvaluationSink};
use super::runner::{BatchRunner, RunnerSettings};
use crate::classifier::{Classifier, ClassifierClient, HttpClassifier, RetryPolicy};
use crate::config::{Config, ConfigError, EmbedderBackend, VectorBackend};
use crate::document::{DocumentStore, FsDocumentStore};
use crate::embedding::{Embedder, HttpEmbedder};
use crate::error::PipelineResult;
use crate::prompts;
use crate::resolver::{ResolverSettings, SimilarityResolver};
use crate::schema::CategoryDocs;
use crate::storage::{
    GraphStore, InMemoryVectorIndex, OpenStore, SqliteGraphStore, SqliteVectorIndex, VectorIndex,
};
use crate::writer::GraphWriter;
use std::sync::Arc;
use tracing::info;

/// The external collaborators a pipeline runs against.
pub struct Components {
    pub documents: Arc<dyn DocumentStore>,
    pub classifier: Arc<dyn Classifier>,
    pub embedder: Arc<dyn Embedder>,
    pub graph: Arc<dyn GraphStore>,
    pub vectors: Arc<dyn VectorIndex>,
    pub sink: Arc<dyn EvaluationSink>,
}

impl Components {
    /// Open every backend named by `config`.
    pub fn from_config(config: &Config) -> PipelineResult<Self> {
        let classifier = HttpClassifier::from_config(&config.classifier)
            .map_err(|e| ConfigError::Invalid {
                field: "classifier",
                reason: e.to_string(),
            })?;
        let embedder = open_embedder(config)?;
        let graph = SqliteGraphStore::open(&config.storage.graph_db)?;
        let vectors = open_vector_index(config)?;
        let documents = FsDocumentStore::new(&config.documents.root, &config.documents.archive_dir)
            .with_page_size(config.documents.page_size);

        info!(
            graph = %config.storage.graph_db.display(),
            vectors = ?config.storage.vector_backend,
            embedder = ?config.embedder.backend,
            "backends opened"
        );

        Ok(Self {
            documents: Arc::new(documents),
            classifier: Arc::new(classifier),
            embedder,
            graph: Arc::new(graph),
            vectors,
            sink: Arc::new(FsEvaluationSink::new(&config.review.dir)),
        })
    }
}

/// Assemble the orchestrator and runner around `components`.
pub fn build_runner(config: &Config, components: Components) -> PipelineResult<BatchRunner> {
    let categories = match &config.categories.docs_dir {
        Some(dir) => CategoryDocs::load(dir)?,
        None => CategoryDocs::builtin(),
    };
    let system_prompt = prompts::load_system_prompt(config.classifier.system_prompt_path.as_deref())?;

    let client = Arc::new(
        ClassifierClient::new(
            components.classifier,
            config.classifier.model.clone(),
            system_prompt,
        )
        .with_retry(RetryPolicy::from_config(&config.classifier)),
    );
    let resolver = SimilarityResolver::new(
        components.graph.clone(),
        components.vectors.clone(),
        components.embedder,
        client.clone(),
        ResolverSettings::from(&config.pipeline),
    );
    let writer = Arc::new(GraphWriter::new(components.graph, components.vectors));
    let orchestrator = Orchestrator::new(
        client,
        resolver,
        writer,
        categories,
        components.sink,
        config.pipeline.clone(),
    );

    Ok(BatchRunner::new(
        components.documents,
        Arc::new(orchestrator),
        RunnerSettings::from_config(config),
    ))
}

fn open_embedder(config: &Config) -> PipelineResult<Arc<dyn Embedder>> {
    match config.embedder.backend {
        EmbedderBackend::Http => Ok(Arc::new(HttpEmbedder::from_config(&config.embedder)?)),
        #[cfg(feature = "embeddings")]
        EmbedderBackend::Fastembed => Ok(Arc::new(
            crate::embedding::FastEmbedEmbedder::from_name(
                &config.embedder.model,
                config.embedder.dimensions,
            )?,
        )),
        #[cfg(not(feature = "embeddings"))]
        EmbedderBackend::Fastembed => Err(ConfigError::FeatureDisabled(
            "embedder backend `fastembed` needs the `embeddings` feature".to_string(),
        )
        .into()),
    }
}

fn open_vector_index(config: &Config) -> PipelineResult<Arc<dyn VectorIndex>> {
    let dimensions = config.embedder.dimensions;
    match config.storage.vector_backend {
        VectorBackend::Memory => Ok(Arc::new(InMemoryVectorIndex::new())),
        VectorBackend::Sqlite => Ok(Arc::new(SqliteVectorIndex::open(
            &config.storage.vector_db,
            dimensions,
        )?)),
        #[cfg(feature = "embeddings")]
        VectorBackend::SqliteVec => Ok(Arc::new(crate::storage::SqliteVecIndex::open(
            &config.storage.vector_db,
            dimensions,
        )?)),
        #[cfg(not(feature = "embeddings"))]
        VectorBackend::SqliteVec => Err(ConfigError::FeatureDisabled(
            "vector backend `sqlite-vec` needs the `embeddings` feature".to_string(),
        )
        .into()),
    }
}
