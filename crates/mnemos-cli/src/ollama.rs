//! Ollama integration.
//!
//! [`fetch_models`] pings the server's `/api/tags` endpoint at start-up and
//! [`embedding_dimension`] asks the model for one vector so the engine can be
//! sized to match it. [`OllamaEmbedder`] plugs Ollama's `/api/embeddings`
//! endpoint into the memory engine as its embedding predictor.

use async_trait::async_trait;
use mnemos_memory::predictor::{EmbeddingRequest, Predictor, PredictorError};
use mnemos_types::Embedding;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A single model entry returned by Ollama's `/api/tags` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaModel {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<OllamaModel>,
}

/// Ping the Ollama server and return the list of available models.
///
/// Blocking; call it before entering the async runtime.
pub fn fetch_models(base_url: &str) -> Result<Vec<OllamaModel>, String> {
    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));
    let response =
        reqwest::blocking::get(&url).map_err(|e| format!("Ollama unreachable at {}: {}", url, e))?;

    if !response.status().is_success() {
        return Err(format!("Ollama returned HTTP {}", response.status()));
    }

    let tags: TagsResponse = response
        .json()
        .map_err(|e| format!("Failed to parse Ollama response: {}", e))?;

    Ok(tags.models)
}

/// Whether `model` (with or without a `:tag` suffix) is among `models`.
pub fn has_model(models: &[OllamaModel], model: &str) -> bool {
    models
        .iter()
        .any(|m| m.name == model || m.name.split(':').next() == Some(model))
}

/// Embed a short sample with `model` and return the vector length.
///
/// Blocking; call it before entering the async runtime.
pub fn embedding_dimension(base_url: &str, model: &str) -> Result<usize, String> {
    let url = embeddings_url(base_url);
    let response = reqwest::blocking::Client::new()
        .post(&url)
        .json(&EmbeddingsBody {
            model,
            prompt: "dimension check",
        })
        .send()
        .map_err(|e| format!("Ollama unreachable at {}: {}", url, e))?;

    if !response.status().is_success() {
        return Err(format!("Ollama returned HTTP {}", response.status()));
    }

    let parsed: EmbeddingsResponse = response
        .json()
        .map_err(|e| format!("Failed to parse Ollama response: {}", e))?;
    if parsed.embedding.is_empty() {
        return Err(format!("Model {} returned an empty embedding", model));
    }
    Ok(parsed.embedding.len())
}

fn embeddings_url(base_url: &str) -> String {
    format!("{}/api/embeddings", base_url.trim_end_matches('/'))
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedding predictor
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct EmbeddingsBody<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f64>,
}

/// Embedding predictor backed by a local Ollama model.
///
/// Only built once the start-up check has found the model, so it always
/// reports ready; request failures surface per call and the engine falls
/// back for that call alone.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: embeddings_url(base_url),
            model: model.to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Predictor<EmbeddingRequest, Embedding> for OllamaEmbedder {
    fn ready(&self) -> bool {
        true
    }

    async fn predict(&self, input: EmbeddingRequest) -> Result<Embedding, PredictorError> {
        let body = EmbeddingsBody {
            model: &self.model,
            prompt: &input.text,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PredictorError::Failed(format!("Ollama request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(PredictorError::Failed(format!(
                "Ollama returned HTTP {}",
                response.status()
            )));
        }
        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| PredictorError::Failed(format!("Failed to parse Ollama response: {e}")))?;
        debug!(model = %self.model, dims = parsed.embedding.len(), "ollama embedding");
        Ok(parsed.embedding)
    }
}
