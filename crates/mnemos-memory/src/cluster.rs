//! Online concept clustering.
//!
//! Each newly stored node is compared against every cluster centroid. If the
//! best centroid scores above the threshold, the node joins that cluster and
//! the centroid is recomputed as the exact arithmetic mean of all member
//! embeddings. Otherwise the node founds a new singleton cluster whose
//! centroid is a copy of its embedding.
//!
//! ## Scaling
//!
//! [`CentroidClusterer`] scans every centroid on insertion, which is
//! `O(#clusters · D)`, and recomputes a centroid in `O(cluster size · D)`.
//! That is fine for small corpora. Larger corpora should implement
//! [`ConceptClusterer`] on top of an approximate-nearest-neighbour index over
//! the centroids; the knowledge graph only talks to the trait.

use std::collections::BTreeSet;

use dashmap::DashMap;
use mnemos_types::{ClusterId, ConceptCluster, Embedding, KnowledgeNode, NodeId};
use tracing::{debug, info};
use uuid::Uuid;

use crate::similarity::{cosine_similarity, mean_vector};

// ─────────────────────────────────────────────────────────────────────────────
// ConceptClusterer
// ─────────────────────────────────────────────────────────────────────────────

/// Incremental clustering of node embeddings.
pub trait ConceptClusterer: Send + Sync {
    /// Place `node` into a cluster and return that cluster's id. Assigning a
    /// node that is already a member returns its current cluster unchanged.
    fn assign(&self, node: &KnowledgeNode) -> ClusterId;

    fn cluster(&self, id: ClusterId) -> Option<ConceptCluster>;

    fn clusters(&self) -> Vec<ConceptCluster>;

    fn cluster_of(&self, node_id: NodeId) -> Option<ClusterId>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CentroidClusterer
// ─────────────────────────────────────────────────────────────────────────────

struct ClusterEntry {
    cluster: ConceptCluster,
    /// Embeddings of every member, kept so the centroid can be recomputed
    /// exactly on each membership change.
    member_embeddings: Vec<Embedding>,
}

impl ClusterEntry {
    fn singleton(node: &KnowledgeNode) -> Self {
        let id = Uuid::new_v4();
        let name = node
            .tags
            .first()
            .cloned()
            .unwrap_or_else(|| format!("concept-{}", &id.simple().to_string()[..8]));
        Self {
            cluster: ConceptCluster {
                id,
                name,
                members: BTreeSet::from([node.id]),
                centroid: node.embedding.clone(),
                category: node.knowledge_type,
            },
            member_embeddings: vec![node.embedding.clone()],
        }
    }

    fn admit(&mut self, node: &KnowledgeNode) {
        self.cluster.members.insert(node.id);
        self.member_embeddings.push(node.embedding.clone());
        if let Some(centroid) = mean_vector(self.member_embeddings.iter().map(Vec::as_slice)) {
            self.cluster.centroid = centroid;
        }
    }
}

/// Linear-scan implementation of [`ConceptClusterer`].
///
/// Clusters are sharded in a [`DashMap`], so concurrent insertions only
/// serialise when they touch the same cluster.
pub struct CentroidClusterer {
    threshold: f64,
    clusters: DashMap<ClusterId, ClusterEntry>,
    membership: DashMap<NodeId, ClusterId>,
}

impl CentroidClusterer {
    /// `threshold` is the similarity a centroid must *exceed* for a node to
    /// join its cluster.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            clusters: DashMap::new(),
            membership: DashMap::new(),
        }
    }

    fn best_match(&self, embedding: &[f64]) -> Option<(ClusterId, f64)> {
        let mut best: Option<(ClusterId, f64)> = None;
        for entry in self.clusters.iter() {
            let score = cosine_similarity(&entry.cluster.centroid, embedding);
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((*entry.key(), score));
            }
        }
        best
    }
}

impl ConceptClusterer for CentroidClusterer {
    fn assign(&self, node: &KnowledgeNode) -> ClusterId {
        if let Some(existing) = self.membership.get(&node.id) {
            return *existing;
        }

        let joined = match self.best_match(&node.embedding) {
            Some((id, score)) if score > self.threshold => {
                self.clusters.get_mut(&id).map(|mut entry| {
                    entry.admit(node);
                    debug!(
                        cluster = %id,
                        node = %node.id,
                        similarity = score,
                        members = entry.cluster.members.len(),
                        "node joined concept cluster"
                    );
                    id
                })
            }
            _ => None,
        };

        let cluster_id = joined.unwrap_or_else(|| {
            let entry = ClusterEntry::singleton(node);
            let id = entry.cluster.id;
            info!(cluster = %id, name = %entry.cluster.name, node = %node.id, "new concept cluster");
            self.clusters.insert(id, entry);
            id
        });

        self.membership.insert(node.id, cluster_id);
        cluster_id
    }

    fn cluster(&self, id: ClusterId) -> Option<ConceptCluster> {
        self.clusters.get(&id).map(|e| e.cluster.clone())
    }

    fn clusters(&self) -> Vec<ConceptCluster> {
        self.clusters.iter().map(|e| e.cluster.clone()).collect()
    }

    fn cluster_of(&self, node_id: NodeId) -> Option<ClusterId> {
        self.membership.get(&node_id).map(|id| *id)
    }

    fn len(&self) -> usize {
        self.clusters.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
