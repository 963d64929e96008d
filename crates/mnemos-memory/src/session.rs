//! Per-user two-tier session memory.
//!
//! A session holds a capacity-bounded *working memory* and an unbounded
//! *short-term memory*. Items enter working memory with an activation derived
//! from the session's attention focus; capacity pressure evicts the weakest
//! items, demoting strong ones to short-term memory and discarding the rest.
//! Consolidation promotes short-term items that are active, often retrieved,
//! and old enough into the knowledge graph as `EXPERIENTIAL` nodes.
//!
//! ## Decay
//!
//! Activation decays exponentially with wall-clock time measured from the
//! item's creation:
//!
//! ```text
//! activation(t) = initial · exp(−(rate_per_hour / 60) · elapsed_minutes)
//! ```
//!
//! It is recomputed from the initial value (never compounded) immediately
//! before every activation-dependent decision, so refreshing twice at the
//! same instant is a no-op.
//!
//! ## Concurrency
//!
//! Each session sits behind its own `tokio::sync::Mutex`. Operations on one
//! session are serialised; operations on different sessions never wait on
//! each other. Embedding happens before the lock is taken, and every list
//! mutation happens in a synchronous stretch after the last await of that
//! step.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mnemos_types::{MemoryItem, MemorySession, MnemosError, SessionId};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::MemoryConfig;
use crate::embedding::Embedder;
use crate::graph::{KnowledgeGraphStore, clamp01};
use crate::similarity::{rank, sort_by_score_desc};

// ─────────────────────────────────────────────────────────────────────────────
// Outcomes
// ─────────────────────────────────────────────────────────────────────────────

/// What happened to an item pushed out of working memory.
#[derive(Debug, Clone)]
pub enum Eviction {
    /// Moved to short-term memory.
    Demoted(MemoryItem),
    /// Dropped for good.
    Discarded(MemoryItem),
}

impl Eviction {
    pub fn item(&self) -> &MemoryItem {
        match self {
            Eviction::Demoted(item) | Eviction::Discarded(item) => item,
        }
    }
}

/// Result of [`MemorySessionManager::add_to_working_memory`].
#[derive(Debug, Clone)]
pub struct AddOutcome {
    /// The item as it was added.
    pub item: MemoryItem,
    /// Items evicted by the capacity check that followed, in eviction order.
    /// May include `item` itself.
    pub evicted: Vec<Eviction>,
}

/// A memory retrieval hit.
#[derive(Debug, Clone)]
pub struct ScoredItem {
    pub item: MemoryItem,
    pub score: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// MemorySessionManager
// ─────────────────────────────────────────────────────────────────────────────

type SessionHandle = Arc<Mutex<MemorySession>>;

pub struct MemorySessionManager {
    sessions: DashMap<SessionId, SessionHandle>,
    embedder: Embedder,
    graph: Arc<KnowledgeGraphStore>,
    clock: Arc<dyn Clock>,
    config: MemoryConfig,
}

impl MemorySessionManager {
    pub fn new(
        config: MemoryConfig,
        embedder: Embedder,
        graph: Arc<KnowledgeGraphStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            embedder,
            graph,
            clock,
            config,
        }
    }

    fn handle(&self, id: SessionId) -> Result<SessionHandle, MnemosError> {
        self.sessions
            .get(&id)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| MnemosError::session_not_found(id))
    }

    // ── lifecycle ────────────────────────────────────────────────────────────

    /// Open a fresh session with the configured capacity and focus.
    pub fn start_session(&self, user_id: &str) -> MemorySession {
        let session = MemorySession {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            working_memory: Vec::new(),
            short_term_memory: Vec::new(),
            capacity: self.config.working_capacity,
            attention_focus: clamp01(self.config.attention_focus),
            created_at: self.clock.now(),
        };
        info!(session = %session.id, user = %user_id, "memory session started");
        self.sessions
            .insert(session.id, Arc::new(Mutex::new(session.clone())));
        session
    }

    /// Snapshot of a session with activations refreshed to now.
    pub async fn session(&self, id: SessionId) -> Result<MemorySession, MnemosError> {
        let handle = self.handle(id)?;
        let mut session = handle.lock().await;
        self.refresh(&mut session);
        Ok(session.clone())
    }

    /// Remove a session and return its final state. Items still in memory
    /// are dropped; consolidate first to keep them.
    pub async fn end_session(&self, id: SessionId) -> Result<MemorySession, MnemosError> {
        let (_, handle) = self
            .sessions
            .remove(&id)
            .ok_or_else(|| MnemosError::session_not_found(id))?;
        let session = handle.lock().await.clone();
        info!(
            session = %id,
            working = session.working_memory.len(),
            short_term = session.short_term_memory.len(),
            "memory session ended"
        );
        Ok(session)
    }

    pub async fn set_attention_focus(&self, id: SessionId, focus: f64) -> Result<f64, MnemosError> {
        let handle = self.handle(id)?;
        let mut session = handle.lock().await;
        session.attention_focus = clamp01(focus);
        Ok(session.attention_focus)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    // ── working memory ───────────────────────────────────────────────────────

    /// Append `content` to working memory, then enforce capacity.
    ///
    /// Activation is `clamp01(boost · focus)` where `boost` is the configured
    /// context boost when `context` is non-empty and `1.0` otherwise.
    ///
    /// # Errors
    ///
    /// [`MnemosError::NotFound`] for an unknown session,
    /// [`MnemosError::InvalidInput`] for empty content.
    #[instrument(skip(self, content, context))]
    pub async fn add_to_working_memory(
        &self,
        session_id: SessionId,
        content: &str,
        context: &HashMap<String, String>,
    ) -> Result<AddOutcome, MnemosError> {
        let handle = self.handle(session_id)?;
        if content.trim().is_empty() {
            return Err(MnemosError::InvalidInput(
                "memory content must not be empty".to_string(),
            ));
        }
        let embedding = self.embedder.embed(content).await;

        let mut session = handle.lock().await;
        let boost = if context.is_empty() {
            1.0
        } else {
            self.config.context_boost
        };
        let activation = clamp01(boost * session.attention_focus);
        let item = MemoryItem {
            id: Uuid::new_v4(),
            content: content.to_string(),
            embedding,
            activation,
            initial_activation: activation,
            retrieval_count: 0,
            timestamp: self.clock.now(),
        };
        session.working_memory.push(item.clone());
        let evicted = self.enforce_capacity(&mut session);

        debug!(
            item = %item.id,
            activation,
            working = session.working_memory.len(),
            evicted = evicted.len(),
            "added to working memory"
        );
        Ok(AddOutcome { item, evicted })
    }

    /// Evict the `len − capacity` least active working items.
    ///
    /// The sort is stable, so among equal activations the oldest goes first.
    /// Survivors keep their original order.
    fn enforce_capacity(&self, session: &mut MemorySession) -> Vec<Eviction> {
        let len = session.working_memory.len();
        if len <= session.capacity {
            return Vec::new();
        }
        self.refresh(session);

        let overflow = len - session.capacity;
        let mut order: Vec<usize> = (0..len).collect();
        order.sort_by(|&a, &b| {
            session.working_memory[a]
                .activation
                .total_cmp(&session.working_memory[b].activation)
        });

        let mut slots: Vec<Option<MemoryItem>> = std::mem::take(&mut session.working_memory)
            .into_iter()
            .map(Some)
            .collect();
        let mut evicted = Vec::with_capacity(overflow);
        for &idx in &order[..overflow] {
            let Some(item) = slots[idx].take() else {
                continue;
            };
            if item.activation > self.config.retain_threshold {
                session.short_term_memory.push(item.clone());
                evicted.push(Eviction::Demoted(item));
            } else {
                evicted.push(Eviction::Discarded(item));
            }
        }
        session.working_memory = slots.into_iter().flatten().collect();
        evicted
    }

    /// Rank both tiers against `query` and return the top `k`. Every returned
    /// item has its retrieval count bumped.
    pub async fn retrieve_from_memory(
        &self,
        session_id: SessionId,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredItem>, MnemosError> {
        let handle = self.handle(session_id)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_embedding = self.embedder.embed(query).await;

        let mut guard = handle.lock().await;
        let session = &mut *guard;
        self.refresh(session);
        let pool = session
            .working_memory
            .iter()
            .chain(session.short_term_memory.iter())
            .cloned();
        let mut scored = rank(pool, &query_embedding);
        sort_by_score_desc(&mut scored);
        scored.truncate(k);

        let mut hits = Vec::with_capacity(scored.len());
        for (item, score) in scored {
            let stored = session
                .working_memory
                .iter_mut()
                .chain(session.short_term_memory.iter_mut())
                .find(|i| i.id == item.id);
            let item = match stored {
                Some(stored) => {
                    stored.retrieval_count += 1;
                    stored.clone()
                }
                None => item,
            };
            hits.push(ScoredItem { item, score });
        }
        Ok(hits)
    }

    // ── consolidation ────────────────────────────────────────────────────────

    /// Promote every qualifying short-term item into the knowledge graph and
    /// return how many were promoted.
    ///
    /// An item qualifies when its decayed activation, retrieval count, and age
    /// all strictly exceed the configured minimums. Each promotion inserts the
    /// node and removes the item in one step without suspending in between,
    /// so an item is promoted at most once even if the call is cancelled.
    #[instrument(skip(self))]
    pub async fn consolidate_memory(&self, session_id: SessionId) -> Result<usize, MnemosError> {
        let handle = self.handle(session_id)?;
        let mut session = handle.lock().await;
        let now = self.clock.now();
        self.refresh(&mut session);

        let candidates: Vec<MemoryItem> = session
            .short_term_memory
            .iter()
            .filter(|item| self.is_consolidation_eligible(item, now))
            .cloned()
            .collect();

        let mut promoted = 0;
        for item in candidates {
            let draft = match self
                .graph
                .prepare_experience(&item.content, item.embedding.clone(), item.activation)
                .await
            {
                Ok(draft) => draft,
                Err(err) => {
                    warn!(item = %item.id, error = %err, "skipping unconsolidatable item");
                    continue;
                }
            };
            let node = self.graph.commit(draft);
            session.short_term_memory.retain(|i| i.id != item.id);
            promoted += 1;
            debug!(item = %item.id, node = %node.id, "consolidated memory item");
        }

        if promoted > 0 {
            info!(session = %session_id, promoted, "memory consolidated");
        }
        Ok(promoted)
    }

    fn is_consolidation_eligible(&self, item: &MemoryItem, now: DateTime<Utc>) -> bool {
        let min_age_ms = self.config.consolidation_min_age_secs.saturating_mul(1000);
        let age_ms = item.age(now).num_milliseconds();
        item.activation > self.config.consolidation_activation
            && item.retrieval_count > self.config.consolidation_min_retrievals
            && age_ms > 0
            && age_ms as u64 > min_age_ms
    }

    // ── decay ────────────────────────────────────────────────────────────────

    fn refresh(&self, session: &mut MemorySession) {
        let now = self.clock.now();
        let rate = self.config.decay_rate_per_minute();
        for item in session
            .working_memory
            .iter_mut()
            .chain(session.short_term_memory.iter_mut())
        {
            item.activation = decayed_activation(item.initial_activation, item.timestamp, now, rate);
        }
    }
}

/// `initial · exp(−rate_per_minute · elapsed_minutes)`, clamped to `[0, 1]`.
/// Time before `created` counts as zero elapsed.
pub fn decayed_activation(
    initial: f64,
    created: DateTime<Utc>,
    now: DateTime<Utc>,
    rate_per_minute: f64,
) -> f64 {
    let elapsed_minutes = ((now - created).num_milliseconds().max(0) as f64) / 60_000.0;
    clamp01(initial * (-rate_per_minute * elapsed_minutes).exp())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::cluster::CentroidClusterer;
    use crate::predictor::PredictorSet;
    use chrono::Duration;
    use mnemos_types::KnowledgeType;

    const DIM: usize = 16;

    struct Fixture {
        clock: ManualClock,
        graph: Arc<KnowledgeGraphStore>,
        sessions: MemorySessionManager,
    }

    fn fixture(config: MemoryConfig) -> Fixture {
        let clock = ManualClock::new();
        let embedder = Embedder::fallback_only(config.dimension);
        let graph = Arc::new(KnowledgeGraphStore::new(
            &config,
            embedder.clone(),
            PredictorSet::default(),
            Arc::new(CentroidClusterer::new(config.cluster_threshold)),
            Arc::new(clock.clone()),
        ));
        let sessions =
            MemorySessionManager::new(config, embedder, Arc::clone(&graph), Arc::new(clock.clone()));
        Fixture {
            clock,
            graph,
            sessions,
        }
    }

    fn config() -> MemoryConfig {
        MemoryConfig {
            dimension: DIM,
            ..Default::default()
        }
    }

    fn ctx() -> HashMap<String, String> {
        HashMap::from([("topic".to_string(), "testing".to_string())])
    }

    fn none() -> HashMap<String, String> {
        HashMap::new()
    }

    // ── start / activation ───────────────────────────────────────────────────

    #[tokio::test]
    async fn new_session_uses_configured_defaults() {
        let f = fixture(config());
        let s = f.sessions.start_session("ada");
        assert_eq!(s.capacity, 100);
        assert_eq!(s.attention_focus, 0.5);
        assert!(s.working_memory.is_empty());
        assert_eq!(f.sessions.len(), 1);
    }

    #[tokio::test]
    async fn activation_is_focus_times_context_boost() {
        let f = fixture(config());
        let s = f.sessions.start_session("ada");

        let plain = f.sessions.add_to_working_memory(s.id, "plain item", &none()).await.unwrap();
        assert_eq!(plain.item.activation, 0.5);

        let boosted = f.sessions.add_to_working_memory(s.id, "boosted item", &ctx()).await.unwrap();
        assert!((boosted.item.activation - 0.6).abs() < 1e-12);

        f.sessions.set_attention_focus(s.id, 1.0).await.unwrap();
        let clamped = f.sessions.add_to_working_memory(s.id, "clamped item", &ctx()).await.unwrap();
        assert_eq!(clamped.item.activation, 1.0);
        assert_eq!(clamped.item.embedding.len(), DIM);
    }

    #[tokio::test]
    async fn focus_is_clamped() {
        let f = fixture(config());
        let s = f.sessions.start_session("ada");
        assert_eq!(f.sessions.set_attention_focus(s.id, 3.0).await.unwrap(), 1.0);
        assert_eq!(f.sessions.set_attention_focus(s.id, -1.0).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn empty_content_is_rejected() {
        let f = fixture(config());
        let s = f.sessions.start_session("ada");
        let err = f.sessions.add_to_working_memory(s.id, "  ", &none()).await.unwrap_err();
        assert!(matches!(err, MnemosError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let f = fixture(config());
        let id = Uuid::new_v4();
        assert!(matches!(
            f.sessions.add_to_working_memory(id, "x", &none()).await,
            Err(MnemosError::NotFound { .. })
        ));
        assert!(matches!(
            f.sessions.consolidate_memory(id).await,
            Err(MnemosError::NotFound { .. })
        ));
        assert!(matches!(
            f.sessions.retrieve_from_memory(id, "x", 3).await,
            Err(MnemosError::NotFound { .. })
        ));
        assert!(matches!(f.sessions.session(id).await, Err(MnemosError::NotFound { .. })));
        assert!(matches!(f.sessions.end_session(id).await, Err(MnemosError::NotFound { .. })));
    }

    // ── capacity ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn adding_past_capacity_evicts_exactly_one() {
        let f = fixture(MemoryConfig {
            working_capacity: 4,
            ..config()
        });
        let s = f.sessions.start_session("ada");
        let mut outcomes = Vec::new();
        for i in 0..5 {
            outcomes.push(
                f.sessions
                    .add_to_working_memory(s.id, &format!("item number {i}"), &none())
                    .await
                    .unwrap(),
            );
        }
        assert!(outcomes[..4].iter().all(|o| o.evicted.is_empty()));
        assert_eq!(outcomes[4].evicted.len(), 1);

        // Equal activations: the oldest item goes first.
        let evicted = &outcomes[4].evicted[0];
        assert_eq!(evicted.item().id, outcomes[0].item.id);
        assert!(matches!(evicted, Eviction::Demoted(_)));

        let snap = f.sessions.session(s.id).await.unwrap();
        assert_eq!(snap.working_memory.len(), 4);
        let order: Vec<_> = snap.working_memory.iter().map(|i| i.content.clone()).collect();
        assert_eq!(order, ["item number 1", "item number 2", "item number 3", "item number 4"]);
        assert_eq!(snap.short_term_memory.len(), 1);
    }

    #[tokio::test]
    async fn weakest_item_is_evicted_first() {
        let f = fixture(MemoryConfig {
            working_capacity: 2,
            ..config()
        });
        let s = f.sessions.start_session("ada");
        f.sessions.add_to_working_memory(s.id, "strong", &ctx()).await.unwrap();
        f.sessions.set_attention_focus(s.id, 0.4).await.unwrap();
        let weak = f.sessions.add_to_working_memory(s.id, "weak", &none()).await.unwrap();
        f.sessions.set_attention_focus(s.id, 0.5).await.unwrap();
        let third = f.sessions.add_to_working_memory(s.id, "third", &none()).await.unwrap();

        assert_eq!(third.evicted.len(), 1);
        assert_eq!(third.evicted[0].item().id, weak.item.id);
        assert!(matches!(third.evicted[0], Eviction::Demoted(_)));
    }

    #[tokio::test]
    async fn low_activation_evictions_are_discarded() {
        let f = fixture(MemoryConfig {
            working_capacity: 1,
            attention_focus: 0.2,
            ..config()
        });
        let s = f.sessions.start_session("ada");
        let first = f.sessions.add_to_working_memory(s.id, "faint", &none()).await.unwrap();
        let second = f.sessions.add_to_working_memory(s.id, "fainter", &none()).await.unwrap();

        assert!(matches!(second.evicted[0], Eviction::Discarded(_)));
        let snap = f.sessions.session(s.id).await.unwrap();
        assert!(snap.short_term_memory.iter().all(|i| i.id != first.item.id));
        assert!(snap.working_memory.iter().all(|i| i.id != first.item.id));
        assert_eq!(snap.working_memory.len(), 1);
    }

    #[tokio::test]
    async fn activation_at_retain_threshold_is_discarded() {
        let f = fixture(MemoryConfig {
            working_capacity: 1,
            attention_focus: 0.3,
            ..config()
        });
        let s = f.sessions.start_session("ada");
        let first = f.sessions.add_to_working_memory(s.id, "borderline", &none()).await.unwrap();
        assert_eq!(first.item.activation, 0.3);
        let second = f.sessions.add_to_working_memory(s.id, "newer", &none()).await.unwrap();

        assert_eq!(second.evicted.len(), 1);
        assert_eq!(second.evicted[0].item().id, first.item.id);
        assert!(matches!(second.evicted[0], Eviction::Discarded(_)));
        let snap = f.sessions.session(s.id).await.unwrap();
        assert!(snap.short_term_memory.is_empty());
        assert!(snap.working_memory.iter().all(|i| i.id != first.item.id));
    }

    #[tokio::test]
    async fn decay_can_tip_eviction_to_discard() {
        let f = fixture(MemoryConfig {
            working_capacity: 1,
            decay_rate_per_hour: 1.0,
            ..config()
        });
        let s = f.sessions.start_session("ada");
        f.sessions.add_to_working_memory(s.id, "old thought", &none()).await.unwrap();
        // 0.5 · e^-1 ≈ 0.18, below the retain threshold.
        f.clock.advance(Duration::hours(1));
        let second = f.sessions.add_to_working_memory(s.id, "new thought", &none()).await.unwrap();

        let evicted = &second.evicted[0];
        assert_eq!(evicted.item().content, "old thought");
        assert!(matches!(evicted, Eviction::Discarded(_)));
        assert!((evicted.item().activation - 0.5 * (-1.0f64).exp()).abs() < 1e-9);
    }

    // ── decay ────────────────────────────────────────────────────────────────

    #[test]
    fn decay_follows_exponential_curve() {
        let t0 = DateTime::UNIX_EPOCH;
        let rate = 0.1 / 60.0;
        assert_eq!(decayed_activation(0.8, t0, t0, rate), 0.8);
        let after = decayed_activation(0.8, t0, t0 + Duration::minutes(600), rate);
        assert!((after - 0.8 * (-1.0f64).exp()).abs() < 1e-12);
        // A clock before creation does not inflate activation.
        assert_eq!(decayed_activation(0.8, t0, t0 - Duration::minutes(5), rate), 0.8);
    }

    #[tokio::test]
    async fn snapshot_refresh_is_idempotent() {
        let f = fixture(config());
        let s = f.sessions.start_session("ada");
        f.sessions.add_to_working_memory(s.id, "fading", &none()).await.unwrap();
        f.clock.advance(Duration::hours(2));
        let a = f.sessions.session(s.id).await.unwrap();
        let b = f.sessions.session(s.id).await.unwrap();
        assert_eq!(a.working_memory[0].activation, b.working_memory[0].activation);
        assert!(a.working_memory[0].activation < 0.5);
        assert_eq!(a.working_memory[0].initial_activation, 0.5);
    }

    // ── retrieval ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn retrieval_spans_both_tiers_and_counts_hits() {
        let f = fixture(MemoryConfig {
            working_capacity: 1,
            ..config()
        });
        let s = f.sessions.start_session("ada");
        let demoted = f.sessions.add_to_working_memory(s.id, "the blue notebook", &none()).await.unwrap();
        f.sessions.add_to_working_memory(s.id, "a red umbrella", &none()).await.unwrap();

        let hits = f.sessions.retrieve_from_memory(s.id, "the blue notebook", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item.id, demoted.item.id);
        assert_eq!(hits[0].score, 1.0);
        assert_eq!(hits[0].item.retrieval_count, 1);

        let both = f.sessions.retrieve_from_memory(s.id, "anything", 10).await.unwrap();
        assert_eq!(both.len(), 2);
        assert!(both[0].score >= both[1].score);

        let snap = f.sessions.session(s.id).await.unwrap();
        assert_eq!(snap.short_term_memory[0].retrieval_count, 2);
        assert_eq!(snap.working_memory[0].retrieval_count, 1);
        assert!(f.sessions.retrieve_from_memory(s.id, "x", 0).await.unwrap().is_empty());
    }

    // ── consolidation ────────────────────────────────────────────────────────

    /// Puts one fully active item into short-term memory and retrieves it
    /// `retrievals` times.
    async fn demote_strong_item(f: &Fixture, retrievals: usize) -> (SessionId, MemoryItem) {
        let s = f.sessions.start_session("ada");
        f.sessions.set_attention_focus(s.id, 1.0).await.unwrap();
        let strong = f
            .sessions
            .add_to_working_memory(s.id, "met the team at the harbour", &ctx())
            .await
            .unwrap();
        let pushed = f
            .sessions
            .add_to_working_memory(s.id, "another entry", &ctx())
            .await
            .unwrap();
        assert!(matches!(pushed.evicted[0], Eviction::Demoted(_)));
        for _ in 0..retrievals {
            f.sessions
                .retrieve_from_memory(s.id, "met the team at the harbour", 1)
                .await
                .unwrap();
        }
        (s.id, strong.item)
    }

    fn single_slot() -> MemoryConfig {
        MemoryConfig {
            working_capacity: 1,
            ..config()
        }
    }

    #[tokio::test]
    async fn qualifying_item_is_consolidated_exactly_once() {
        let f = fixture(single_slot());
        let (sid, item) = demote_strong_item(&f, 3).await;
        f.clock.advance(Duration::minutes(61));

        assert_eq!(f.sessions.consolidate_memory(sid).await.unwrap(), 1);
        assert_eq!(f.graph.len(), 1);
        assert_eq!(f.sessions.consolidate_memory(sid).await.unwrap(), 0);
        assert_eq!(f.graph.len(), 1);

        let snap = f.sessions.session(sid).await.unwrap();
        assert!(snap.short_term_memory.is_empty());

        let hits = f
            .graph
            .retrieve_knowledge("met the team at the harbour", 1, &HashMap::new())
            .await
            .unwrap();
        let node = &hits[0].node;
        assert_eq!(node.knowledge_type, KnowledgeType::Experiential);
        assert_eq!(node.embedding, item.embedding);
        let expected = (-(0.1 / 60.0) * 61.0f64).exp();
        assert!((node.importance - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn too_few_retrievals_block_consolidation() {
        let f = fixture(single_slot());
        let (sid, _) = demote_strong_item(&f, 2).await;
        f.clock.advance(Duration::minutes(61));
        assert_eq!(f.sessions.consolidate_memory(sid).await.unwrap(), 0);
        assert!(f.graph.is_empty());
    }

    #[tokio::test]
    async fn young_items_are_not_consolidated() {
        let f = fixture(single_slot());
        let (sid, _) = demote_strong_item(&f, 3).await;
        f.clock.advance(Duration::minutes(60));
        assert_eq!(f.sessions.consolidate_memory(sid).await.unwrap(), 0);
        f.clock.advance(Duration::minutes(1));
        assert_eq!(f.sessions.consolidate_memory(sid).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn decayed_items_are_not_consolidated() {
        let f = fixture(single_slot());
        let (sid, _) = demote_strong_item(&f, 3).await;
        // e^(-0.1 · 4) ≈ 0.67, under the 0.7 bar.
        f.clock.advance(Duration::hours(4));
        assert_eq!(f.sessions.consolidate_memory(sid).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn activation_at_consolidation_bar_is_not_enough() {
        let f = fixture(MemoryConfig {
            attention_focus: 0.7,
            decay_rate_per_hour: 0.0,
            ..single_slot()
        });
        let s = f.sessions.start_session("ada");
        let kept = f
            .sessions
            .add_to_working_memory(s.id, "met the team at the harbour", &none())
            .await
            .unwrap();
        let pushed = f.sessions.add_to_working_memory(s.id, "another entry", &none()).await.unwrap();
        assert_eq!(pushed.evicted[0].item().id, kept.item.id);
        assert!(matches!(pushed.evicted[0], Eviction::Demoted(_)));
        for _ in 0..3 {
            f.sessions
                .retrieve_from_memory(s.id, "met the team at the harbour", 1)
                .await
                .unwrap();
        }
        f.clock.advance(Duration::hours(2));

        assert_eq!(f.sessions.consolidate_memory(s.id).await.unwrap(), 0);
        let snap = f.sessions.session(s.id).await.unwrap();
        assert_eq!(snap.short_term_memory[0].activation, 0.7);
        assert_eq!(snap.short_term_memory[0].retrieval_count, 3);
        assert!(f.graph.is_empty());
    }

    #[tokio::test]
    async fn working_memory_items_are_never_consolidated() {
        let f = fixture(config());
        let s = f.sessions.start_session("ada");
        f.sessions.set_attention_focus(s.id, 1.0).await.unwrap();
        f.sessions.add_to_working_memory(s.id, "still working", &ctx()).await.unwrap();
        for _ in 0..5 {
            f.sessions.retrieve_from_memory(s.id, "still working", 1).await.unwrap();
        }
        f.clock.advance(Duration::hours(2));
        assert_eq!(f.sessions.consolidate_memory(s.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn end_session_removes_it() {
        let f = fixture(config());
        let s = f.sessions.start_session("ada");
        f.sessions.add_to_working_memory(s.id, "bye", &none()).await.unwrap();
        let last = f.sessions.end_session(s.id).await.unwrap();
        assert_eq!(last.working_memory.len(), 1);
        assert!(f.sessions.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_to_one_session_lose_nothing() {
        let f = Arc::new(fixture(MemoryConfig {
            working_capacity: 1000,
            ..config()
        }));
        let sid = f.sessions.start_session("ada").id;
        let mut tasks = Vec::new();
        for i in 0..50 {
            let f = Arc::clone(&f);
            tasks.push(tokio::spawn(async move {
                f.sessions
                    .add_to_working_memory(sid, &format!("parallel {i}"), &HashMap::new())
                    .await
                    .unwrap();
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(f.sessions.session(sid).await.unwrap().working_memory.len(), 50);
    }
}
