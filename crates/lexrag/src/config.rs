use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use lexrag_core::chunk::ChunkingParams;
use lexrag_core::generate::GenerationParams;
use lexrag_core::retrieve::RetrievalParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.txt".to_string(), "**/*.md".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_boundary_window")]
    pub boundary_window: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            boundary_window: default_boundary_window(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}
fn default_boundary_window() -> usize {
    40
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            semantic_weight: default_semantic_weight(),
            candidate_k: default_candidate_k(),
            top_k: default_top_k(),
            min_similarity: default_min_similarity(),
        }
    }
}

fn default_semantic_weight() -> f64 {
    0.7
}
fn default_candidate_k() -> usize {
    40
}
fn default_top_k() -> usize {
    5
}
fn default_min_similarity() -> f64 {
    0.25
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            timeout_secs: default_embed_timeout_secs(),
            base_url: default_ollama_url(),
        }
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embed_timeout_secs() -> u64 {
    30
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_context_budget")]
    pub context_budget_tokens: usize,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            base_url: default_ollama_url(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            context_budget_tokens: default_context_budget(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_context_budget() -> usize {
    3000
}
fn default_llm_timeout_secs() -> u64 {
    60
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl Config {
    /// Validated core chunking parameters.
    pub fn chunking_params(&self) -> Result<ChunkingParams> {
        Ok(ChunkingParams::new(
            self.chunking.chunk_size,
            self.chunking.overlap,
            self.chunking.boundary_window,
        )?)
    }

    /// Validated core retrieval parameters.
    pub fn retrieval_params(&self) -> Result<RetrievalParams> {
        let params = RetrievalParams {
            semantic_weight: self.retrieval.semantic_weight,
            candidate_k: self.retrieval.candidate_k,
            min_similarity: self.retrieval.min_similarity,
        };
        params.validate()?;
        Ok(params)
    }

    /// Validated core generation parameters.
    pub fn generation_params(&self) -> Result<GenerationParams> {
        let params = GenerationParams {
            max_tokens: self.llm.max_tokens,
            temperature: self.llm.temperature,
            context_budget_tokens: self.llm.context_budget_tokens,
        };
        params.validate()?;
        Ok(params)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Chunking, retrieval, and generation limits are validated by the
    // core parameter constructors so the same checks guard every entry
    // point.
    config.chunking_params()?;
    config.retrieval_params()?;
    config.generation_params()?;

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.candidate_k < config.retrieval.top_k {
        anyhow::bail!("retrieval.candidate_k must be >= retrieval.top_k");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.unwrap_or(0) == 0 {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
    }

    match config.llm.provider.as_str() {
        "openai" | "ollama" => {}
        other => anyhow::bail!("Unknown llm provider: '{}'. Must be openai or ollama.", other),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let f = write_config(
            r#"
            [db]
            path = "./lexrag.db"
            [corpus]
            root = "./corpus"
            "#,
        );
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.overlap, 200);
        assert_eq!(config.retrieval.top_k, 5);
        assert!((config.retrieval.semantic_weight - 0.7).abs() < 1e-9);
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let f = write_config(
            r#"
            [db]
            path = "./lexrag.db"
            [corpus]
            root = "./corpus"
            [chunking]
            chunk_size = 100
            overlap = 100
            "#,
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn semantic_weight_out_of_range_is_rejected() {
        let f = write_config(
            r#"
            [db]
            path = "./lexrag.db"
            [corpus]
            root = "./corpus"
            [retrieval]
            semantic_weight = 1.2
            "#,
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn enabled_embedding_requires_model_and_dims() {
        let f = write_config(
            r#"
            [db]
            path = "./lexrag.db"
            [corpus]
            root = "./corpus"
            [embedding]
            provider = "ollama"
            "#,
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn unknown_providers_are_rejected() {
        let f = write_config(
            r#"
            [db]
            path = "./lexrag.db"
            [corpus]
            root = "./corpus"
            [llm]
            provider = "bard"
            "#,
        );
        assert!(load_config(f.path()).is_err());
    }
}
