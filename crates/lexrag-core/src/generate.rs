//! Citation-grounded answer generation.
//!
//! The generator turns a [`RetrievalResult`] into a grounding prompt,
//! invokes a language model through the [`LlmProvider`] trait, and
//! validates the citations the model emits against the labels it was
//! actually given. Labels outside that set are stripped from the answer
//! and surfaced as grounding violations — reported, never silently kept.
//!
//! Per-request flow:
//!
//! ```text
//! Idle ──▶ Retrieved ──▶ NoEvidence            (zero chunks: fixed answer,
//!                  │                            zero model calls)
//!                  └───▶ Prompted ──▶ Answered
//!                                └──▶ ModelFailed (Unavailable/Llm error;
//!                                      retry is the caller's decision)
//! ```
//!
//! The generator itself never retries and persists nothing; its only
//! side effect is the outbound model invocation.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::citation::sanitize_citations;
use crate::error::{Error, Result};
use crate::retrieve::{RetrievalResult, RetrievedChunk};

/// Rough characters-per-token ratio used for the context budget.
const CHARS_PER_TOKEN: usize = 4;

/// Fixed answer returned when retrieval produced no evidence.
pub const NO_EVIDENCE_ANSWER: &str =
    "No relevant information was found in the indexed documents for this question. \
     Try rephrasing the query or asking about a more specific provision.";

/// Trait for language-model backends.
///
/// Both hosted APIs and local model servers implement this uniformly.
/// Implementations must bound `complete` with the caller-configured
/// timeout and report an unreachable backend as [`Error::Unavailable`];
/// they never retry internally.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Model identifier (e.g. `"gpt-4o"`, `"llama3.2"`).
    fn model_name(&self) -> &str;

    /// Whether the backend can currently be reached.
    async fn is_available(&self) -> bool;

    /// Complete a prompt, returning the raw model text.
    async fn complete(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String>;
}

/// Generation tuning parameters.
#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    /// Completion budget passed to the model.
    pub max_tokens: u32,
    pub temperature: f32,
    /// Hard budget for the assembled context, in (approximate) tokens.
    pub context_budget_tokens: usize,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.1,
            context_budget_tokens: 3000,
        }
    }
}

impl GenerationParams {
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(Error::config("llm.max_tokens must be > 0"));
        }
        if self.context_budget_tokens == 0 {
            return Err(Error::config("llm.context_budget_tokens must be > 0"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::config(format!(
                "llm.temperature must be in [0.0, 2.0], got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

/// A validated reference from the answer to one retrieved chunk.
#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    pub label: usize,
    pub document_id: String,
    pub chunk_index: i64,
    pub start_char: usize,
    pub end_char: usize,
}

/// The generator's output for one request.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedAnswer {
    pub answer: String,
    /// Citations for every known label the answer uses, ascending.
    pub citations: Vec<Citation>,
    /// Labels the model invented and that were stripped from `answer`.
    /// Non-empty means the answer needed repair; it is a quality flag,
    /// not an error.
    pub grounding_violations: Vec<usize>,
    /// Heuristic confidence in `[0.0, 0.9]`.
    pub confidence: f64,
    /// Model that produced the answer; `None` for the no-evidence path.
    pub model: Option<String>,
    /// False when the fixed no-evidence answer was returned.
    pub evidence: bool,
}

/// Builds grounded prompts and validates model output.
pub struct Generator {
    provider: Arc<dyn LlmProvider>,
    params: GenerationParams,
}

impl Generator {
    /// Build a generator, validating parameters up front.
    pub fn new(provider: Arc<dyn LlmProvider>, params: GenerationParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { provider, params })
    }

    /// Generate a grounded answer for `query` from retrieved evidence.
    ///
    /// With zero retrieved chunks the model is never invoked and the
    /// fixed no-evidence answer is returned.
    pub async fn generate(
        &self,
        query: &str,
        retrieval: &RetrievalResult,
    ) -> Result<GeneratedAnswer> {
        if query.trim().is_empty() {
            return Err(Error::invalid_input("query must not be empty"));
        }
        if retrieval.is_empty() {
            return Ok(Self::no_evidence());
        }

        let included = self.fit_to_budget(&retrieval.hits);
        if included.is_empty() {
            // Even the top-ranked chunk overflows the context budget:
            // nothing can be grounded, so the model is not called.
            tracing::warn!(
                budget_tokens = self.params.context_budget_tokens,
                "all retrieved chunks overflow the context budget"
            );
            return Ok(Self::no_evidence());
        }

        let prompt = build_prompt(query, &included);
        let raw = self
            .provider
            .complete(&prompt, self.params.max_tokens, self.params.temperature)
            .await?;

        let known: BTreeSet<usize> = included.iter().map(|h| h.label).collect();
        let sanitized = sanitize_citations(&raw, &known);
        if !sanitized.stripped.is_empty() {
            tracing::warn!(
                labels = ?sanitized.stripped,
                "stripped citations outside the retrieved set"
            );
        }

        let citations = sanitized
            .cited
            .iter()
            .filter_map(|label| {
                included.iter().find(|h| h.label == *label).map(|h| Citation {
                    label: *label,
                    document_id: h.chunk.document_id.clone(),
                    chunk_index: h.chunk.chunk_index,
                    start_char: h.chunk.start_char,
                    end_char: h.chunk.end_char,
                })
            })
            .collect();

        Ok(GeneratedAnswer {
            answer: sanitized.text.trim().to_string(),
            citations,
            grounding_violations: sanitized.stripped,
            confidence: confidence(&retrieval.hits),
            model: Some(self.provider.model_name().to_string()),
            evidence: true,
        })
    }

    /// Select chunks in rank order until the next one would overflow the
    /// character budget. The overflowing chunk is dropped whole — a
    /// chunk is never truncated mid-text — and assembly stops there so
    /// rank order in the prompt is preserved.
    fn fit_to_budget<'a>(&self, hits: &'a [RetrievedChunk]) -> Vec<&'a RetrievedChunk> {
        let budget_chars = self.params.context_budget_tokens * CHARS_PER_TOKEN;
        let mut used = 0usize;
        let mut included = Vec::new();
        for hit in hits {
            let block_chars = source_block(hit).chars().count();
            if used + block_chars > budget_chars {
                break;
            }
            used += block_chars;
            included.push(hit);
        }
        included
    }

    fn no_evidence() -> GeneratedAnswer {
        GeneratedAnswer {
            answer: NO_EVIDENCE_ANSWER.to_string(),
            citations: Vec::new(),
            grounding_violations: Vec::new(),
            confidence: 0.0,
            model: None,
            evidence: false,
        }
    }
}

/// Heuristic answer confidence: grows with evidence count and mean
/// retrieval score, capped at 0.9.
fn confidence(hits: &[RetrievedChunk]) -> f64 {
    if hits.is_empty() {
        return 0.0;
    }
    let mean_score = hits.iter().map(|h| h.score).sum::<f64>() / hits.len() as f64;
    (0.15 * hits.len() as f64 + mean_score).min(0.9)
}

/// One labelled source excerpt in the grounding prompt.
fn source_block(hit: &RetrievedChunk) -> String {
    format!(
        "[{}] {}, chunk {}, chars {}-{}\n{}\n\n",
        hit.label,
        hit.chunk.document_id,
        hit.chunk.chunk_index,
        hit.chunk.start_char,
        hit.chunk.end_char,
        hit.chunk.text
    )
}

/// Assemble the grounding prompt from the budgeted chunks.
fn build_prompt(query: &str, included: &[&RetrievedChunk]) -> String {
    let mut context = String::new();
    for hit in included {
        context.push_str(&source_block(hit));
    }

    format!(
        "You are a legal research assistant. Answer the question using only the \
numbered source excerpts below.\n\
\n\
Rules:\n\
1. Use only information contained in the sources.\n\
2. Mark every factual claim with the label of its supporting source, e.g. [1] or [2].\n\
3. If the sources do not contain the answer, say so plainly.\n\
4. Never cite a label that does not appear in the sources.\n\
\n\
Sources:\n\
{context}\
Question: {query}\n\
\n\
Answer:"
    )
}
