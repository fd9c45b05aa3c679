//! Storage abstraction for chunks and their embeddings.
//!
//! The [`VectorStore`] trait defines every storage operation the
//! retrieval pipeline needs, enabling pluggable backends (SQLite,
//! in-memory). Implementations must be `Send + Sync`; reads may run
//! concurrently, while a document replacement must be applied as a single
//! unit so readers never observe a mix of old and new chunks for the same
//! document.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Chunk, Document, DocumentRevision};

/// A candidate chunk returned from keyword or vector search.
///
/// Carries the raw backend score plus the chunk's insertion sequence
/// number, which the retriever uses as a deterministic tie-breaker.
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub chunk: Chunk,
    /// Raw score from the search backend (cosine similarity or lexical
    /// overlap), before any normalization.
    pub raw_score: f64,
    /// Monotonically increasing insertion order across the whole store.
    pub seq: i64,
}

/// Index-level counts for the `stats` command.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    pub documents: u64,
    pub chunks: u64,
    pub embeddings: u64,
}

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_document`](VectorStore::upsert_document) | Atomically replace a document's chunks and vectors |
/// | [`delete_document`](VectorStore::delete_document) | Remove a document and everything it owns |
/// | [`document_revision`](VectorStore::document_revision) | Revision marker for incremental sync |
/// | [`list_document_ids`](VectorStore::list_document_ids) | Enumerate indexed documents |
/// | [`chunks_missing_embedding`](VectorStore::chunks_missing_embedding) | Chunks needing (re-)embedding for a model |
/// | [`upsert_embedding`](VectorStore::upsert_embedding) | Store one chunk's vector |
/// | [`clear_embeddings`](VectorStore::clear_embeddings) | Drop all vectors (rebuild) |
/// | [`similarity_search`](VectorStore::similarity_search) | Cosine-ranked candidates |
/// | [`keyword_search`](VectorStore::keyword_search) | Lexical-overlap-ranked candidates |
/// | [`stats`](VectorStore::stats) | Index counts |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Atomically replace all chunks (and their vectors) belonging to
    /// `doc`. Stale chunks for the document are purged in the same unit
    /// of work, so a reader never sees old and new chunks mixed and
    /// re-upserting identical content never accumulates duplicates.
    ///
    /// `vectors` must be index-aligned with `chunks`; `None` marks a
    /// chunk whose embedding is still pending. `model` tags every stored
    /// vector.
    async fn upsert_document(
        &self,
        doc: &Document,
        chunks: &[Chunk],
        vectors: &[Option<Vec<f32>>],
        model: &str,
    ) -> Result<()>;

    /// Remove a document with all of its chunks and embeddings.
    async fn delete_document(&self, document_id: &str) -> Result<()>;

    /// Revision marker for a document, if it is indexed.
    async fn document_revision(&self, document_id: &str) -> Result<Option<DocumentRevision>>;

    /// All indexed document ids, sorted.
    async fn list_document_ids(&self) -> Result<Vec<String>>;

    /// Chunks whose embedding is absent or tagged with a model other
    /// than `model`, in insertion order. Drives incremental re-embedding
    /// instead of full reprocessing.
    async fn chunks_missing_embedding(&self, model: &str) -> Result<Vec<Chunk>>;

    /// Store or replace the embedding vector for one chunk.
    async fn upsert_embedding(
        &self,
        chunk_id: &str,
        document_id: &str,
        vector: &[f32],
        model: &str,
    ) -> Result<()>;

    /// Drop every stored embedding (the chunks stay).
    async fn clear_embeddings(&self) -> Result<()>;

    /// Top `limit` chunks by cosine similarity against `query_vec`,
    /// descending, ties broken by insertion order. Only embeddings tagged
    /// with `model` participate; a participating vector whose
    /// dimensionality differs from the query's is storage corruption.
    async fn similarity_search(
        &self,
        query_vec: &[f32],
        model: &str,
        limit: usize,
    ) -> Result<Vec<ChunkCandidate>>;

    /// Top `limit` chunks by lexical overlap with the query tokens,
    /// descending, ties broken by insertion order. Chunks with zero
    /// overlap are omitted.
    async fn keyword_search(&self, query_tokens: &[String], limit: usize)
        -> Result<Vec<ChunkCandidate>>;

    /// Index-level counts.
    async fn stats(&self) -> Result<StoreStats>;
}

/// Order candidates by score (desc) then insertion sequence (asc) and
/// truncate. Shared by store implementations so both backends rank
/// identically.
pub fn rank_candidates(mut candidates: Vec<ChunkCandidate>, limit: usize) -> Vec<ChunkCandidate> {
    candidates.sort_by(|a, b| {
        b.raw_score
            .partial_cmp(&a.raw_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.seq.cmp(&b.seq))
    });
    candidates.truncate(limit);
    candidates
}
