//! `mnemos-types` – shared data model for the Mnemos knowledge/memory stack.
//!
//! Every crate in the workspace speaks in these types: knowledge nodes and
//! their relations, concept clusters, memory sessions and their items, and
//! the crate-spanning [`MnemosError`].

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identifier of a [`KnowledgeNode`].
pub type NodeId = Uuid;
/// Identifier of a [`ConceptCluster`].
pub type ClusterId = Uuid;
/// Identifier of a [`MemorySession`].
pub type SessionId = Uuid;
/// Identifier of a [`MemoryItem`].
pub type ItemId = Uuid;

/// Dense embedding vector. All vectors stored by one context share a fixed
/// dimension.
pub type Embedding = Vec<f64>;

// ─────────────────────────────────────────────────────────────────────────────
// Enumerations
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of knowledge a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KnowledgeType {
    Factual,
    Procedural,
    Conceptual,
    Metacognitive,
    /// Produced by consolidating session memory into the graph.
    Experiential,
    Contextual,
    Temporal,
    Causal,
}

impl KnowledgeType {
    pub const ALL: [KnowledgeType; 8] = [
        KnowledgeType::Factual,
        KnowledgeType::Procedural,
        KnowledgeType::Conceptual,
        KnowledgeType::Metacognitive,
        KnowledgeType::Experiential,
        KnowledgeType::Contextual,
        KnowledgeType::Temporal,
        KnowledgeType::Causal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KnowledgeType::Factual => "FACTUAL",
            KnowledgeType::Procedural => "PROCEDURAL",
            KnowledgeType::Conceptual => "CONCEPTUAL",
            KnowledgeType::Metacognitive => "METACOGNITIVE",
            KnowledgeType::Experiential => "EXPERIENTIAL",
            KnowledgeType::Contextual => "CONTEXTUAL",
            KnowledgeType::Temporal => "TEMPORAL",
            KnowledgeType::Causal => "CAUSAL",
        }
    }
}

impl fmt::Display for KnowledgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KnowledgeType {
    type Err = MnemosError;

    /// Case-insensitive parse of the upper-case wire name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        KnowledgeType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| MnemosError::InvalidInput(format!("unknown knowledge type '{s}'")))
    }
}

/// Lifecycle state of a node. Nodes are never deleted; they end as
/// [`ValidationStatus::Archived`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    #[default]
    Pending,
    Validated,
    Disputed,
    Deprecated,
    Archived,
}

/// Semantics of a directed [`KnowledgeRelation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    IsA,
    PartOf,
    Causes,
    Enables,
    SimilarTo,
    OppositeOf,
    DependsOn,
    Precedes,
    Follows,
    Contains,
}

// ─────────────────────────────────────────────────────────────────────────────
// Knowledge graph
// ─────────────────────────────────────────────────────────────────────────────

/// Directed edge `source_id -> target_id`. Immutable once created; the graph
/// may contain cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRelation {
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub relation_type: RelationType,
    /// In `[0, 1]`.
    pub strength: f64,
    /// In `[0, 1]`.
    pub confidence: f64,
}

/// A unit of long-term knowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeNode {
    pub id: NodeId,
    pub content: String,
    pub knowledge_type: KnowledgeType,
    /// Deduplicated tags in first-seen order.
    pub tags: Vec<String>,
    /// Outgoing relations; every entry has `source_id == id`.
    pub relations: Vec<KnowledgeRelation>,
    pub embedding: Embedding,
    /// In `[0, 1]`.
    pub confidence: f64,
    /// In `[0, 1]`.
    pub importance: f64,
    /// Caller-supplied attributes.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    pub validation_status: ValidationStatus,
}

impl KnowledgeNode {
    /// Bump the access statistics after the node was returned by a query.
    pub fn record_access(&mut self, at: DateTime<Utc>) {
        self.last_accessed = at;
        self.access_count += 1;
    }

    pub fn is_archived(&self) -> bool {
        self.validation_status == ValidationStatus::Archived
    }
}

/// A group of nodes whose embeddings sit close to a shared centroid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptCluster {
    pub id: ClusterId,
    pub name: String,
    pub members: BTreeSet<NodeId>,
    /// Arithmetic mean of the members' embeddings.
    pub centroid: Embedding,
    /// Type of the node that founded the cluster.
    pub category: KnowledgeType,
}

// ─────────────────────────────────────────────────────────────────────────────
// Session memory
// ─────────────────────────────────────────────────────────────────────────────

/// A single entry in a session's working or short-term memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: ItemId,
    pub content: String,
    pub embedding: Embedding,
    /// Current (decayed) activation in `[0, 1]`.
    pub activation: f64,
    /// Activation assigned when the item entered working memory.
    pub initial_activation: f64,
    pub retrieval_count: u32,
    /// Creation time; decay and age are measured from here.
    pub timestamp: DateTime<Utc>,
}

impl MemoryItem {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }
}

/// Per-user two-tier memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySession {
    pub id: SessionId,
    pub user_id: String,
    /// Ordered oldest-first and bounded by `capacity`.
    pub working_memory: Vec<MemoryItem>,
    /// Unbounded holding tier for evicted-but-retained items.
    pub short_term_memory: Vec<MemoryItem>,
    pub capacity: usize,
    /// In `[0, 1]`.
    pub attention_focus: f64,
    pub created_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Caller-visible error type for every knowledge and memory operation.
///
/// Predictor failures never show up here; they are absorbed by the fallback
/// heuristics.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MnemosError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    #[error("Operation cancelled")]
    Cancelled,
}

impl MnemosError {
    pub fn node_not_found(id: NodeId) -> Self {
        MnemosError::NotFound {
            kind: "Knowledge node".to_string(),
            id: id.to_string(),
        }
    }

    pub fn session_not_found(id: SessionId) -> Self {
        MnemosError::NotFound {
            kind: "Memory session".to_string(),
            id: id.to_string(),
        }
    }
}
