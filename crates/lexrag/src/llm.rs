//! Language-model provider implementations.
//!
//! Hosted (OpenAI chat completions) and local (Ollama generate) backends
//! behind the core [`LlmProvider`] trait. Requests are bounded by the
//! configured timeout; an unreachable backend maps to
//! `Error::Unavailable` and is never retried here — the generator treats
//! a failed model call as recoverable and leaves retry policy to the
//! caller.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result as AnyResult};
use async_trait::async_trait;
use serde_json::json;

use lexrag_core::error::{Error, Result};
use lexrag_core::generate::LlmProvider;

use crate::config::LlmConfig;

/// Build the configured language-model provider.
pub fn create_llm(config: &LlmConfig) -> AnyResult<Arc<dyn LlmProvider>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiLlm::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaLlm::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

fn transport_error(service: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() || err.is_connect() {
        Error::unavailable(service, err.to_string())
    } else {
        Error::llm(err.to_string())
    }
}

// ============ OpenAI ============

/// Chat-completions client for the OpenAI API.
pub struct OpenAiLlm {
    model: String,
    client: reqwest::Client,
}

impl OpenAiLlm {
    pub fn new(config: &LlmConfig) -> AnyResult<Self> {
        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            client,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiLlm {
    fn model_name(&self) -> &str {
        &self.model
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

    async fn complete(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::unavailable("openai", "OPENAI_API_KEY not set"))?;

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(api_key)
            .json(&json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": prompt }],
                "max_tokens": max_tokens,
                "temperature": temperature,
            }))
            .send()
            .await
            .map_err(|e| transport_error("openai", e))?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::unavailable("openai", format!("HTTP {status}: {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::llm(format!("HTTP {status}: {body}")));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::llm(format!("invalid completion response: {e}")))?;
        payload
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| Error::llm("completion response missing message content"))
    }
}

// ============ Ollama ============

/// Generate-endpoint client for a local Ollama server.
pub struct OllamaLlm {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaLlm {
    pub fn new(config: &LlmConfig) -> AnyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client,
        })
    }
}

#[async_trait]
impl LlmProvider for OllamaLlm {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map(|resp| resp.status().is_success())
            .unwrap_or(false)
    }

    async fn complete(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "stream": false,
                "options": {
                    "temperature": temperature,
                    "num_predict": max_tokens,
                },
            }))
            .send()
            .await
            .map_err(|e| transport_error("ollama", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::llm(format!("HTTP {status}: {body}")));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::llm(format!("invalid generate response: {e}")))?;
        payload
            .get("response")
            .and_then(|r| r.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| Error::llm("generate response missing response field"))
    }
}
