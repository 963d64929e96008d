//! The explicit context object that wires the memory subsystem together.
//!
//! A [`MemoryContext`] owns one embedder, one knowledge graph, one session
//! manager, and one worker pool. Nothing is global: each context is a fully
//! isolated instance, so tests can build as many as they like.
//!
//! ```rust
//! use std::collections::HashMap;
//! use mnemos_memory::config::MemoryConfig;
//! use mnemos_memory::context::MemoryContext;
//! use mnemos_types::KnowledgeType;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let ctx = MemoryContext::builder(MemoryConfig::default()).build().unwrap();
//! ctx.store_knowledge("Tokio is an async runtime", KnowledgeType::Factual, HashMap::new())
//!     .await
//!     .unwrap();
//! let hits = ctx.retrieve_knowledge("Tokio is an async runtime", 1, HashMap::new()).await.unwrap();
//! assert_eq!(hits[0].score, 1.0);
//! # });
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use mnemos_types::{KnowledgeNode, KnowledgeType, MemorySession, MnemosError, SessionId};
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::cluster::{CentroidClusterer, ConceptClusterer};
use crate::config::MemoryConfig;
use crate::embedding::Embedder;
use crate::graph::{KnowledgeGraphStore, ScoredNode};
use crate::pool::WorkerPool;
use crate::predictor::{
    EmbeddingPredictor, ImportanceEstimator, PredictorSet, ResultReranker, TagExtractor,
};
use crate::session::{AddOutcome, MemorySessionManager, ScoredItem};

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for [`MemoryContext`]. Every predictor is optional.
pub struct MemoryContextBuilder {
    config: MemoryConfig,
    embedding: Option<EmbeddingPredictor>,
    predictors: PredictorSet,
    clusterer: Option<Arc<dyn ConceptClusterer>>,
    clock: Option<Arc<dyn Clock>>,
}

impl MemoryContextBuilder {
    pub fn embedding_predictor(mut self, predictor: EmbeddingPredictor) -> Self {
        self.embedding = Some(predictor);
        self
    }

    pub fn importance_estimator(mut self, predictor: ImportanceEstimator) -> Self {
        self.predictors.importance = Some(predictor);
        self
    }

    pub fn tag_extractor(mut self, predictor: TagExtractor) -> Self {
        self.predictors.tags = Some(predictor);
        self
    }

    pub fn reranker(mut self, predictor: ResultReranker) -> Self {
        self.predictors.reranker = Some(predictor);
        self
    }

    /// Replace the default [`CentroidClusterer`].
    pub fn clusterer(mut self, clusterer: Arc<dyn ConceptClusterer>) -> Self {
        self.clusterer = Some(clusterer);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the config and assemble the context.
    pub fn build(self) -> Result<MemoryContext, MnemosError> {
        self.config.validate()?;
        let config = self.config;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let clusterer = self
            .clusterer
            .unwrap_or_else(|| Arc::new(CentroidClusterer::new(config.cluster_threshold)));
        let has_embedding_predictor = self.embedding.is_some();
        let embedder = Embedder::new(self.embedding, config.dimension, config.predictor_timeout());

        let graph = Arc::new(KnowledgeGraphStore::new(
            &config,
            embedder.clone(),
            self.predictors,
            clusterer,
            Arc::clone(&clock),
        ));
        let sessions = Arc::new(MemorySessionManager::new(
            config.clone(),
            embedder,
            Arc::clone(&graph),
            clock,
        ));
        let pool = WorkerPool::new(config.max_concurrent_tasks);

        info!(
            dimension = config.dimension,
            embedding_predictor = has_embedding_predictor,
            max_tasks = pool.capacity(),
            "memory context ready"
        );
        Ok(MemoryContext {
            config,
            graph,
            sessions,
            pool,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryContext
// ─────────────────────────────────────────────────────────────────────────────

/// Entry point for callers. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct MemoryContext {
    config: MemoryConfig,
    graph: Arc<KnowledgeGraphStore>,
    sessions: Arc<MemorySessionManager>,
    pool: WorkerPool,
}

impl MemoryContext {
    pub fn builder(config: MemoryConfig) -> MemoryContextBuilder {
        MemoryContextBuilder {
            config,
            embedding: None,
            predictors: PredictorSet::default(),
            clusterer: None,
            clock: None,
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Direct access to the graph for lookups that need no scheduling.
    pub fn graph(&self) -> &KnowledgeGraphStore {
        &self.graph
    }

    pub fn sessions(&self) -> &MemorySessionManager {
        &self.sessions
    }

    // ── pooled operations ────────────────────────────────────────────────────

    pub async fn store_knowledge(
        &self,
        content: &str,
        knowledge_type: KnowledgeType,
        metadata: HashMap<String, String>,
    ) -> Result<KnowledgeNode, MnemosError> {
        self.pool
            .run(self.graph.store_knowledge(content, knowledge_type, metadata))
            .await
    }

    pub async fn retrieve_knowledge(
        &self,
        query: &str,
        max_results: usize,
        context: HashMap<String, String>,
    ) -> Result<Vec<ScoredNode>, MnemosError> {
        self.pool
            .run(self.graph.retrieve_knowledge(query, max_results, &context))
            .await
    }

    pub async fn start_session(&self, user_id: &str) -> Result<MemorySession, MnemosError> {
        self.pool
            .run(async { Ok(self.sessions.start_session(user_id)) })
            .await
    }

    pub async fn add_to_working_memory(
        &self,
        session_id: SessionId,
        content: &str,
        context: HashMap<String, String>,
    ) -> Result<AddOutcome, MnemosError> {
        self.pool
            .run(self.sessions.add_to_working_memory(session_id, content, &context))
            .await
    }

    pub async fn retrieve_from_memory(
        &self,
        session_id: SessionId,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredItem>, MnemosError> {
        self.pool
            .run(self.sessions.retrieve_from_memory(session_id, query, k))
            .await
    }

    pub async fn consolidate_memory(&self, session_id: SessionId) -> Result<usize, MnemosError> {
        self.pool
            .run(self.sessions.consolidate_memory(session_id))
            .await
    }

    /// Cancel in-flight work and refuse further pooled operations.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
