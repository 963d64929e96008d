//! Pluggable predictors and the fallback contract.
//!
//! Every model-backed capability (embedding, importance, tagging, reranking)
//! sits behind the same small interface:
//!
//! * [`Predictor::ready`] – cheap availability check.
//! * [`Predictor::predict`] – typed input to typed output.
//!
//! Callers never see predictor failures. [`predict_with_fallback`] matches on
//! availability, bounds the call with a timeout, and on *not ready*, error, or
//! timeout logs the problem and returns the capability's deterministic
//! heuristic instead.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mnemos_types::Embedding;
use thiserror::Error;
use tracing::{debug, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Why a predictor call did not produce a usable result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictorError {
    #[error("predictor is not ready")]
    NotReady,
    #[error("predictor timed out after {0:?}")]
    Timeout(Duration),
    #[error("predictor failed: {0}")]
    Failed(String),
    #[error("predictor returned {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

// ─────────────────────────────────────────────────────────────────────────────
// Predictor trait
// ─────────────────────────────────────────────────────────────────────────────

/// A model-backed capability that may be unavailable at any moment.
#[async_trait]
pub trait Predictor<I, O>: Send + Sync
where
    I: Send + 'static,
{
    /// `false` makes the caller go straight to the fallback heuristic.
    fn ready(&self) -> bool;

    async fn predict(&self, input: I) -> Result<O, PredictorError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Typed capability payloads
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRequest {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportanceRequest {
    pub content: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImportanceEstimate {
    /// Clamped to `[0, 1]` by the caller.
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagExtractionRequest {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TagExtractionResult {
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RerankRequest {
    pub query: String,
    pub context: HashMap<String, String>,
    pub content: String,
    /// Cosine score before reranking.
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankAdjustment {
    /// Multiplied into the cosine score; the product is clamped to `>= 0`.
    pub factor: f64,
}

pub type EmbeddingPredictor = Arc<dyn Predictor<EmbeddingRequest, Embedding>>;
pub type ImportanceEstimator = Arc<dyn Predictor<ImportanceRequest, ImportanceEstimate>>;
pub type TagExtractor = Arc<dyn Predictor<TagExtractionRequest, TagExtractionResult>>;
pub type ResultReranker = Arc<dyn Predictor<RerankRequest, RerankAdjustment>>;

/// The optional predictors consulted by the knowledge graph.
#[derive(Clone, Default)]
pub struct PredictorSet {
    pub importance: Option<ImportanceEstimator>,
    pub tags: Option<TagExtractor>,
    pub reranker: Option<ResultReranker>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Calling helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Call `predictor` if it is present and ready, bounded by `timeout`.
pub async fn call_predictor<I, O>(
    predictor: Option<&Arc<dyn Predictor<I, O>>>,
    input: I,
    timeout: Duration,
) -> Result<O, PredictorError>
where
    I: Send + 'static,
{
    let predictor = match predictor {
        Some(p) if p.ready() => p,
        _ => return Err(PredictorError::NotReady),
    };
    match tokio::time::timeout(timeout, predictor.predict(input)).await {
        Ok(result) => result,
        Err(_) => Err(PredictorError::Timeout(timeout)),
    }
}

/// Call `predictor`, substituting `fallback()` for any failure.
///
/// A missing or not-ready predictor is routine and logged at `debug`; an
/// error or timeout is logged at `warn`.
pub async fn predict_with_fallback<I, O, F>(
    predictor: Option<&Arc<dyn Predictor<I, O>>>,
    input: I,
    timeout: Duration,
    capability: &'static str,
    fallback: F,
) -> O
where
    I: Send + 'static,
    F: FnOnce() -> O,
{
    match call_predictor(predictor, input, timeout).await {
        Ok(output) => output,
        Err(err) => {
            log_fallback(capability, &err);
            fallback()
        }
    }
}

pub(crate) fn log_fallback(capability: &'static str, err: &PredictorError) {
    match err {
        PredictorError::NotReady => {
            debug!(capability, "predictor unavailable; using fallback heuristic")
        }
        other => warn!(capability, error = %other, "predictor failed; using fallback heuristic"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
