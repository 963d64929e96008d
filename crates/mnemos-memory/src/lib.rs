//! `mnemos-memory` – The semantic knowledge and memory engine.
//!
//! Holds a graph of embedded knowledge nodes, ranks them against queries,
//! clusters them online, and runs per-user two-tier session memory that
//! consolidates into the graph.
//!
//! # Modules
//!
//! - [`similarity`] – cosine similarity and ranking primitives.
//! - [`embedding`] – [`Embedder`][embedding::Embedder]: pluggable embeddings
//!   with a deterministic, content-seeded fallback.
//! - [`predictor`] – the [`Predictor`][predictor::Predictor] contract shared by
//!   every pluggable model, typed payloads, and timeout-bounded fallback calls.
//! - [`heuristics`] – fallback importance and tag extraction.
//! - [`graph`] – [`KnowledgeGraphStore`][graph::KnowledgeGraphStore]: node
//!   storage, similarity linking, and retrieval.
//! - [`cluster`] – [`ConceptClusterer`][cluster::ConceptClusterer] and the
//!   centroid-scan implementation.
//! - [`session`] – [`MemorySessionManager`][session::MemorySessionManager]:
//!   working/short-term memory, eviction, decay, and consolidation.
//! - [`pool`] – bounded [`WorkerPool`][pool::WorkerPool] with cancellation.
//! - [`context`] – [`MemoryContext`][context::MemoryContext], the object that
//!   wires all of the above together.
//! - [`config`] / [`clock`] – tunables and the time source.

pub mod clock;
pub mod cluster;
pub mod config;
pub mod context;
pub mod embedding;
pub mod graph;
pub mod heuristics;
pub mod pool;
pub mod predictor;
pub mod session;
pub mod similarity;

pub use config::MemoryConfig;
pub use context::{MemoryContext, MemoryContextBuilder};
pub use graph::ScoredNode;
pub use session::{AddOutcome, Eviction, ScoredItem};
