//! Knowledge graph store.
//!
//! Owns every [`KnowledgeNode`] and its outgoing relations, keeps a tag
//! index, and feeds each new node to the [`ConceptClusterer`].
//!
//! ## Insert pipeline
//!
//! Inserting is split in two phases:
//!
//! 1. **prepare** (async) – embedding, importance, and tags are computed. The
//!    predictor calls are the only suspension points and nothing is written.
//! 2. **commit** (sync) – `SIMILAR_TO` edges are derived by scanning existing
//!    nodes, then the node and its cluster membership are written without
//!    yielding.
//!
//! A caller that drops the future at any await point therefore leaves the
//! store exactly as it was: no partial node and no partial relation.
//!
//! ## Edge direction
//!
//! Similarity edges point from the *new* node to each sufficiently similar
//! existing node. They are not mirrored.
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use mnemos_memory::context::MemoryContext;
//! use mnemos_memory::config::MemoryConfig;
//! use mnemos_types::KnowledgeType;
//!
//! # tokio_test_block(async {
//! let ctx = MemoryContext::builder(MemoryConfig::default()).build().unwrap();
//! let graph = ctx.graph();
//! let node = graph
//!     .store_knowledge("Rust guarantees memory safety", KnowledgeType::Factual, HashMap::new())
//!     .await
//!     .unwrap();
//! assert_eq!(node.embedding.len(), 384);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use mnemos_types::{
    ConceptCluster, Embedding, KnowledgeNode, KnowledgeRelation, KnowledgeType, MnemosError,
    NodeId, RelationType, ValidationStatus,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::clock::Clock;
use crate::cluster::ConceptClusterer;
use crate::config::MemoryConfig;
use crate::embedding::Embedder;
use crate::heuristics::{fallback_importance, fallback_tags};
use crate::predictor::{
    ImportanceEstimate, ImportanceRequest, PredictorSet, RerankRequest, TagExtractionRequest,
    TagExtractionResult, call_predictor, log_fallback, predict_with_fallback,
};
use crate::similarity::{cosine_similarity, rank, sort_by_score_desc};

// ─────────────────────────────────────────────────────────────────────────────
// Public types
// ─────────────────────────────────────────────────────────────────────────────

/// A retrieval hit: the node (with refreshed access stats) and its final
/// score.
#[derive(Debug, Clone)]
pub struct ScoredNode {
    pub node: KnowledgeNode,
    pub score: f64,
}

/// A node whose derived fields are computed but which is not yet stored.
///
/// Produced by the async prepare phase; turned into a stored node by
/// [`KnowledgeGraphStore::commit`]. Dropping a draft has no effect.
#[derive(Debug, Clone)]
pub struct NodeDraft {
    content: String,
    knowledge_type: KnowledgeType,
    tags: Vec<String>,
    embedding: Embedding,
    importance: f64,
    metadata: HashMap<String, String>,
}

impl NodeDraft {
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn embedding(&self) -> &[f64] {
        &self.embedding
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// KnowledgeGraphStore
// ─────────────────────────────────────────────────────────────────────────────

/// Concurrent in-memory knowledge graph.
///
/// Nodes live in a sharded [`DashMap`]: writes to one node
/// are serialised, writes to different nodes do not block each other, and
/// there is no global lock.
pub struct KnowledgeGraphStore {
    embedder: Embedder,
    predictors: PredictorSet,
    clusterer: Arc<dyn ConceptClusterer>,
    clock: Arc<dyn Clock>,
    nodes: DashMap<NodeId, KnowledgeNode>,
    link_threshold: f64,
    default_confidence: f64,
    timeout: Duration,
}

impl KnowledgeGraphStore {
    pub fn new(
        config: &MemoryConfig,
        embedder: Embedder,
        predictors: PredictorSet,
        clusterer: Arc<dyn ConceptClusterer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            embedder,
            predictors,
            clusterer,
            clock,
            nodes: DashMap::new(),
            link_threshold: config.link_threshold,
            default_confidence: config.default_confidence,
            timeout: config.predictor_timeout(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    // ── insertion ────────────────────────────────────────────────────────────

    /// Embed, score, tag, link, cluster, and store `content`.
    ///
    /// # Errors
    ///
    /// [`MnemosError::InvalidInput`] if `content` is empty or whitespace.
    #[instrument(skip(self, content, metadata), fields(kind = %knowledge_type))]
    pub async fn store_knowledge(
        &self,
        content: &str,
        knowledge_type: KnowledgeType,
        metadata: HashMap<String, String>,
    ) -> Result<KnowledgeNode, MnemosError> {
        let draft = self.prepare(content, knowledge_type, metadata).await?;
        Ok(self.commit(draft))
    }

    /// Store a consolidated memory as an `EXPERIENTIAL` node that keeps the
    /// caller's embedding and uses `importance` verbatim (clamped to `[0, 1]`).
    pub async fn store_experience(
        &self,
        content: &str,
        embedding: Embedding,
        importance: f64,
    ) -> Result<KnowledgeNode, MnemosError> {
        let draft = self.prepare_experience(content, embedding, importance).await?;
        Ok(self.commit(draft))
    }

    /// Prepare phase of [`store_knowledge`][Self::store_knowledge].
    pub async fn prepare(
        &self,
        content: &str,
        knowledge_type: KnowledgeType,
        metadata: HashMap<String, String>,
    ) -> Result<NodeDraft, MnemosError> {
        ensure_content(content)?;
        let embedding = self.embedder.embed(content).await;
        let importance = self.estimate_importance(content, &metadata).await;
        let tags = self.extract_tags(content).await;
        Ok(NodeDraft {
            content: content.to_string(),
            knowledge_type,
            tags,
            embedding,
            importance,
            metadata,
        })
    }

    /// Prepare phase of [`store_experience`][Self::store_experience].
    ///
    /// # Errors
    ///
    /// [`MnemosError::InvalidInput`] if `content` is empty or the embedding
    /// does not have the store's dimension.
    pub async fn prepare_experience(
        &self,
        content: &str,
        embedding: Embedding,
        importance: f64,
    ) -> Result<NodeDraft, MnemosError> {
        ensure_content(content)?;
        if embedding.len() != self.dimension() {
            return Err(MnemosError::InvalidInput(format!(
                "embedding has {} dimensions, expected {}",
                embedding.len(),
                self.dimension()
            )));
        }
        let tags = self.extract_tags(content).await;
        Ok(NodeDraft {
            content: content.to_string(),
            knowledge_type: KnowledgeType::Experiential,
            tags,
            embedding,
            importance: clamp01(importance),
            metadata: HashMap::new(),
        })
    }

    /// Commit phase: link, store, index, and cluster a prepared node.
    ///
    /// Never suspends.
    pub fn commit(&self, draft: NodeDraft) -> KnowledgeNode {
        let id = Uuid::new_v4();
        let now = self.clock.now();

        let mut relations: Vec<KnowledgeRelation> = self
            .nodes
            .iter()
            .filter(|existing| !existing.is_archived())
            .filter_map(|existing| {
                let sim = cosine_similarity(&draft.embedding, &existing.embedding);
                (sim > self.link_threshold).then(|| KnowledgeRelation {
                    source_id: id,
                    target_id: existing.id,
                    relation_type: RelationType::SimilarTo,
                    strength: clamp01(sim),
                    confidence: clamp01(sim),
                })
            })
            .collect();
        relations.sort_by(|a, b| b.strength.total_cmp(&a.strength));

        let node = KnowledgeNode {
            id,
            content: draft.content,
            knowledge_type: draft.knowledge_type,
            tags: draft.tags,
            relations,
            embedding: draft.embedding,
            confidence: self.default_confidence,
            importance: draft.importance,
            metadata: draft.metadata,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            validation_status: ValidationStatus::Pending,
        };

        self.nodes.insert(id, node.clone());
        let cluster = self.clusterer.assign(&node);

        debug!(
            node = %id,
            %cluster,
            links = node.relations.len(),
            importance = node.importance,
            "stored knowledge node"
        );
        node
    }

    async fn estimate_importance(&self, content: &str, metadata: &HashMap<String, String>) -> f64 {
        let request = ImportanceRequest {
            content: content.to_string(),
            metadata: metadata.clone(),
        };
        let estimate = predict_with_fallback(
            self.predictors.importance.as_ref(),
            request,
            self.timeout,
            "importance",
            || ImportanceEstimate {
                score: fallback_importance(content, metadata.len()),
            },
        )
        .await;
        clamp01(estimate.score)
    }

    async fn extract_tags(&self, content: &str) -> Vec<String> {
        let request = TagExtractionRequest {
            content: content.to_string(),
        };
        let result = predict_with_fallback(
            self.predictors.tags.as_ref(),
            request,
            self.timeout,
            "tags",
            || TagExtractionResult {
                tags: fallback_tags(content),
            },
        )
        .await;
        let mut seen = HashSet::new();
        result
            .tags
            .into_iter()
            .filter(|t| !t.is_empty() && seen.insert(t.clone()))
            .collect()
    }

    // ── retrieval ────────────────────────────────────────────────────────────

    /// Rank every live node against `query` and return the best
    /// `max_results`, sorted by non-increasing score.
    ///
    /// Archived nodes are skipped. When a ready reranker is configured its
    /// factor multiplies each cosine score and the product is clamped to
    /// `>= 0`; if any reranker call fails the plain cosine scores are used.
    /// Every returned node has its access statistics bumped.
    #[instrument(skip(self, query, context))]
    pub async fn retrieve_knowledge(
        &self,
        query: &str,
        max_results: usize,
        context: &HashMap<String, String>,
    ) -> Result<Vec<ScoredNode>, MnemosError> {
        if max_results == 0 {
            return Ok(Vec::new());
        }
        let query_embedding = self.embedder.embed(query).await;

        let snapshot: Vec<KnowledgeNode> = self
            .nodes
            .iter()
            .filter(|n| !n.is_archived())
            .map(|n| n.value().clone())
            .collect();
        let mut scored = rank(snapshot, &query_embedding);
        self.rerank(query, context, &mut scored).await;
        sort_by_score_desc(&mut scored);
        scored.truncate(max_results);

        // Access stats are the only side effect and happen after the last
        // await, so a dropped retrieval leaves the store untouched.
        let now = self.clock.now();
        let results: Vec<ScoredNode> = scored
            .into_iter()
            .map(|(node, score)| {
                let node = match self.nodes.get_mut(&node.id) {
                    Some(mut stored) => {
                        stored.record_access(now);
                        stored.clone()
                    }
                    None => node,
                };
                ScoredNode { node, score }
            })
            .collect();

        debug!(hits = results.len(), "retrieved knowledge");
        Ok(results)
    }

    async fn rerank(
        &self,
        query: &str,
        context: &HashMap<String, String>,
        scored: &mut [(KnowledgeNode, f64)],
    ) {
        let Some(reranker) = self.predictors.reranker.as_ref() else {
            return;
        };
        if !reranker.ready() {
            return;
        }
        let mut factors = Vec::with_capacity(scored.len());
        for (node, score) in scored.iter() {
            let request = RerankRequest {
                query: query.to_string(),
                context: context.clone(),
                content: node.content.clone(),
                score: *score,
            };
            match call_predictor(Some(reranker), request, self.timeout).await {
                Ok(adjustment) => factors.push(adjustment.factor),
                Err(err) => {
                    log_fallback("reranker", &err);
                    return;
                }
            }
        }
        for ((_, score), factor) in scored.iter_mut().zip(factors) {
            *score = (*score * factor).max(0.0);
        }
    }

    // ── accessors ────────────────────────────────────────────────────────────

    pub fn get_node(&self, id: NodeId) -> Result<KnowledgeNode, MnemosError> {
        self.nodes
            .get(&id)
            .map(|n| n.value().clone())
            .ok_or_else(|| MnemosError::node_not_found(id))
    }

    /// Outgoing relations of `id`.
    pub fn relations(&self, id: NodeId) -> Result<Vec<KnowledgeRelation>, MnemosError> {
        self.nodes
            .get(&id)
            .map(|n| n.relations.clone())
            .ok_or_else(|| MnemosError::node_not_found(id))
    }

    /// Move a node through its lifecycle. Archiving is the only way a node
    /// leaves the active graph.
    pub fn set_validation_status(
        &self,
        id: NodeId,
        status: ValidationStatus,
    ) -> Result<KnowledgeNode, MnemosError> {
        let mut node = self
            .nodes
            .get_mut(&id)
            .ok_or_else(|| MnemosError::node_not_found(id))?;
        node.validation_status = status;
        debug!(node = %id, ?status, "validation status changed");
        Ok(node.clone())
    }

    pub fn cluster_of(&self, id: NodeId) -> Option<ConceptCluster> {
        self.clusterer
            .cluster_of(id)
            .and_then(|cid| self.clusterer.cluster(cid))
    }

    pub fn clusters(&self) -> Vec<ConceptCluster> {
        self.clusterer.clusters()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn ensure_content(content: &str) -> Result<(), MnemosError> {
    if content.trim().is_empty() {
        Err(MnemosError::InvalidInput(
            "knowledge content must not be empty".to_string(),
        ))
    } else {
        Ok(())
    }
}

pub(crate) fn clamp01(x: f64) -> f64 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
