//! Embedding provider implementations.
//!
//! Three backends behind the core [`Embedder`] trait:
//!
//! - **[`DisabledEmbedder`]** — reports itself unavailable; the retriever
//!   then takes the keyword-only path. Used when `[embedding] provider =
//!   "disabled"` (the explicit offline mode).
//! - **[`OpenAiEmbedder`]** — `POST /v1/embeddings`, batched, API key
//!   from `OPENAI_API_KEY`.
//! - **[`OllamaEmbedder`]** — local model server, one
//!   `POST /api/embeddings` per text, availability probed via
//!   `GET /api/tags`.
//!
//! All requests are bounded by the configured timeout. An unreachable or
//! timed-out backend maps to `Error::Unavailable`; the providers never
//! retry — backoff belongs to the calling layer.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result as AnyResult};
use async_trait::async_trait;
use serde_json::json;

use lexrag_core::embedding::Embedder;
use lexrag_core::error::{Error, Result};

use crate::config::EmbeddingConfig;

/// Build the configured embedding provider.
pub fn create_embedder(config: &EmbeddingConfig) -> AnyResult<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

fn reject_empty(texts: &[String]) -> Result<()> {
    if let Some(pos) = texts.iter().position(|t| t.trim().is_empty()) {
        return Err(Error::invalid_input(format!(
            "cannot embed empty text (batch position {pos})"
        )));
    }
    Ok(())
}

fn transport_error(service: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() || err.is_connect() {
        Error::unavailable(service, err.to_string())
    } else {
        Error::embedding(err.to_string())
    }
}

// ============ Disabled ============

/// Offline mode made explicit: never available, never embeds.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn is_available(&self) -> bool {
        false
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(Error::unavailable(
            "embedder",
            "embedding provider is disabled",
        ))
    }
}

// ============ OpenAI ============

/// Embedding provider for the OpenAI embeddings API.
pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    client: reqwest::Client,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> AnyResult<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            client,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn is_available(&self) -> bool {
        let Ok(api_key) = std::env::var("OPENAI_API_KEY") else {
            return false;
        };
        self.client
            .get("https://api.openai.com/v1/models")
            .bearer_auth(api_key)
            .send()
            .await
            .map(|resp| resp.status().is_success())
            .unwrap_or(false)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        reject_empty(texts)?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::unavailable("openai embeddings", "OPENAI_API_KEY not set"))?;

        let response = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .bearer_auth(api_key)
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .map_err(|e| transport_error("openai embeddings", e))?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::unavailable(
                "openai embeddings",
                format!("HTTP {status}: {body}"),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::embedding(format!("HTTP {status}: {body}")));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::embedding(format!("invalid embeddings response: {e}")))?;
        parse_openai_embeddings(&payload, texts.len())
    }
}

/// Extract `data[].embedding` arrays in input order.
fn parse_openai_embeddings(payload: &serde_json::Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let data = payload
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| Error::embedding("embeddings response missing data array"))?;

    if data.len() != expected {
        return Err(Error::embedding(format!(
            "embeddings response holds {} vectors, expected {expected}",
            data.len()
        )));
    }

    let mut vectors = Vec::with_capacity(data.len());
    for item in data {
        let values = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| Error::embedding("embeddings response missing embedding field"))?;
        vectors.push(
            values
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect(),
        );
    }
    Ok(vectors)
}

// ============ Ollama ============

/// Embedding provider for a local Ollama server.
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    dims: usize,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> AnyResult<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model,
            dims,
            client,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map(|resp| resp.status().is_success())
            .unwrap_or(false)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        reject_empty(texts)?;

        // The embeddings endpoint takes one prompt per call; looping in
        // input order keeps batching semantically identical to
        // one-at-a-time embedding.
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            let response = self
                .client
                .post(format!("{}/api/embeddings", self.base_url))
                .json(&json!({ "model": self.model, "prompt": text }))
                .send()
                .await
                .map_err(|e| transport_error("ollama embeddings", e))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::embedding(format!("HTTP {status}: {body}")));
            }

            let payload: serde_json::Value = response
                .json()
                .await
                .map_err(|e| Error::embedding(format!("invalid embeddings response: {e}")))?;
            let values = payload
                .get("embedding")
                .and_then(|e| e.as_array())
                .ok_or_else(|| Error::embedding("embeddings response missing embedding field"))?;
            vectors.push(
                values
                    .iter()
                    .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                    .collect(),
            );
        }
        Ok(vectors)
    }
}
