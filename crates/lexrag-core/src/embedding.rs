//! Embedding abstraction and vector utilities.
//!
//! Defines the [`Embedder`] trait that all embedding backends implement,
//! plus pure helper functions for vector serialization and similarity
//! computation. Concrete providers (OpenAI, Ollama, disabled) live in the
//! `lexrag` application crate.
//!
//! Availability is a first-class capability: callers probe
//! [`Embedder::is_available`] *before* choosing the retrieval path, so an
//! offline backend selects keyword-only retrieval up front instead of
//! failing mid-query.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Trait for embedding backends.
///
/// Contract:
/// - Deterministic for a fixed model: identical text yields the identical
///   vector (within the backend's documented floating-point tolerance).
/// - [`embed`](Embedder::embed) is batched; output order matches input
///   order, and batching never changes the produced vectors.
/// - An empty or whitespace-only input text is
///   [`Error::InvalidInput`] (fatal to that call only); an unreachable
///   backend is [`Error::Unavailable`] (recoverable, triggers the
///   keyword-only fallback).
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier persisted alongside each vector
    /// (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Embedding vector dimensionality.
    fn dims(&self) -> usize;

    /// Whether the underlying model/service can currently be reached.
    async fn is_available(&self) -> bool;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query string.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::embedding("empty embedding response"))
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing a
/// BLOB of `vec.len() × 4` bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
///
/// Reverses [`vec_to_blob`]: reads 4-byte little-endian `f32` values from
/// the byte slice.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
