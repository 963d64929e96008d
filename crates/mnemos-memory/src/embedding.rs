//! Text embedding with a deterministic fallback.
//!
//! [`Embedder::embed`] always yields a vector of the configured dimension.
//! When the embedding predictor is absent, not ready, slow, failing, or
//! returns the wrong number of components, the content is embedded by
//! [`fallback_embedding`] instead.
//!
//! ## Fallback algorithm
//!
//! 1. Seed = first 8 bytes (little-endian) of `SHA-256(content)`.
//! 2. Draw `D` samples from a standard normal distribution using
//!    `ChaCha8Rng` seeded with that value, scaling each by `0.1`.
//! 3. L2-normalise.
//!
//! Both SHA-256 and ChaCha8 are specified bit-for-bit, so the same content
//! yields the same vector on every platform and every run.
//!
//! # Example
//!
//! ```rust
//! use mnemos_memory::embedding::fallback_embedding;
//!
//! let a = fallback_embedding("the cat sat on the mat", 16);
//! let b = fallback_embedding("the cat sat on the mat", 16);
//! assert_eq!(a, b);
//! assert_eq!(a.len(), 16);
//! ```

use std::time::Duration;

use mnemos_types::Embedding;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use sha2::{Digest, Sha256};

use crate::predictor::{
    EmbeddingPredictor, EmbeddingRequest, PredictorError, call_predictor, log_fallback,
};
use crate::similarity::l2_normalize;

/// Scale applied to each Gaussian draw before normalisation.
const FALLBACK_SCALE: f64 = 0.1;

/// Deterministic pseudo-embedding of `content` with `dimension` components.
pub fn fallback_embedding(content: &str, dimension: usize) -> Embedding {
    let mut rng = ChaCha8Rng::seed_from_u64(content_seed(content));
    let mut v: Embedding = (0..dimension)
        .map(|_| {
            let sample: f64 = StandardNormal.sample(&mut rng);
            sample * FALLBACK_SCALE
        })
        .collect();
    l2_normalize(&mut v);
    v
}

fn content_seed(content: &str) -> u64 {
    let digest = Sha256::digest(content.as_bytes());
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed)
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedder
// ─────────────────────────────────────────────────────────────────────────────

/// Embedding front-end shared by the knowledge graph and session memory.
#[derive(Clone)]
pub struct Embedder {
    predictor: Option<EmbeddingPredictor>,
    dimension: usize,
    timeout: Duration,
}

impl Embedder {
    /// An embedder that only ever uses [`fallback_embedding`].
    pub fn fallback_only(dimension: usize) -> Self {
        Self {
            predictor: None,
            dimension,
            timeout: Duration::ZERO,
        }
    }

    pub fn new(predictor: Option<EmbeddingPredictor>, dimension: usize, timeout: Duration) -> Self {
        Self {
            predictor,
            dimension,
            timeout,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed `content`, falling back to the deterministic vector on any
    /// predictor problem.
    pub async fn embed(&self, content: &str) -> Embedding {
        let request = EmbeddingRequest {
            text: content.to_string(),
        };
        let result = call_predictor(self.predictor.as_ref(), request, self.timeout)
            .await
            .and_then(|v| {
                if v.len() == self.dimension {
                    Ok(v)
                } else {
                    Err(PredictorError::DimensionMismatch {
                        expected: self.dimension,
                        actual: v.len(),
                    })
                }
            });
        match result {
            Ok(v) => v,
            Err(err) => {
                log_fallback("embedding", &err);
                fallback_embedding(content, self.dimension)
            }
        }
    }
}
