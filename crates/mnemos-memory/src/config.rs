//! Tunables for the knowledge graph, clustering, and session memory.

use std::time::Duration;

use mnemos_types::MnemosError;
use serde::{Deserialize, Serialize};

/// Configuration bundle shared by every component of a
/// [`MemoryContext`][crate::context::MemoryContext].
///
/// Missing fields fall back to [`MemoryConfig::default`] when deserialised,
/// so a config file only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Embedding dimension `D`. Every stored vector has exactly this length.
    pub dimension: usize,
    /// A new node gets a `SIMILAR_TO` edge to every node scoring above this.
    pub link_threshold: f64,
    /// A node joins the best cluster only if its centroid scores above this.
    pub cluster_threshold: f64,
    /// Working-memory capacity of new sessions.
    pub working_capacity: usize,
    /// Attention focus of new sessions.
    pub attention_focus: f64,
    /// Activation multiplier applied when an item arrives with context.
    pub context_boost: f64,
    /// Evicted items above this activation are demoted to short-term memory;
    /// the rest are discarded.
    pub retain_threshold: f64,
    /// Minimum activation (exclusive) for consolidation.
    pub consolidation_activation: f64,
    /// Minimum retrieval count (exclusive) for consolidation.
    pub consolidation_min_retrievals: u32,
    /// Minimum item age in seconds (exclusive) for consolidation.
    pub consolidation_min_age_secs: u64,
    /// Exponential activation decay rate, per hour of wall-clock time.
    pub decay_rate_per_hour: f64,
    /// Confidence assigned to newly stored nodes.
    pub default_confidence: f64,
    /// Upper bound on any single predictor call.
    pub predictor_timeout_ms: u64,
    /// Maximum number of operations the worker pool runs at once.
    pub max_concurrent_tasks: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            dimension: 384,
            link_threshold: 0.7,
            cluster_threshold: 0.6,
            working_capacity: 100,
            attention_focus: 0.5,
            context_boost: 1.2,
            retain_threshold: 0.3,
            consolidation_activation: 0.7,
            consolidation_min_retrievals: 2,
            consolidation_min_age_secs: 3600,
            decay_rate_per_hour: 0.1,
            default_confidence: 0.5,
            predictor_timeout_ms: 2000,
            max_concurrent_tasks: 64,
        }
    }
}

impl MemoryConfig {
    pub fn predictor_timeout(&self) -> Duration {
        Duration::from_millis(self.predictor_timeout_ms)
    }

    /// Decay rate converted to the per-minute unit used by the decay formula.
    pub fn decay_rate_per_minute(&self) -> f64 {
        self.decay_rate_per_hour / 60.0
    }

    /// Reject values that would make the subsystem misbehave.
    pub fn validate(&self) -> Result<(), MnemosError> {
        if self.dimension == 0 {
            return Err(invalid("dimension must be greater than zero"));
        }
        if self.working_capacity == 0 {
            return Err(invalid("working_capacity must be greater than zero"));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(invalid("max_concurrent_tasks must be greater than zero"));
        }
        for (name, value) in [
            ("link_threshold", self.link_threshold),
            ("cluster_threshold", self.cluster_threshold),
            ("attention_focus", self.attention_focus),
            ("retain_threshold", self.retain_threshold),
            ("consolidation_activation", self.consolidation_activation),
            ("default_confidence", self.default_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(&format!("{name} must be within [0, 1], got {value}")));
            }
        }
        if !(self.context_boost.is_finite() && self.context_boost >= 0.0) {
            return Err(invalid("context_boost must be a non-negative number"));
        }
        if !(self.decay_rate_per_hour.is_finite() && self.decay_rate_per_hour >= 0.0) {
            return Err(invalid("decay_rate_per_hour must be a non-negative number"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> MnemosError {
    MnemosError::InvalidInput(msg.to_string())
}
