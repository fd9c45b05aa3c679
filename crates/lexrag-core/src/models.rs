//! Core data models flowing through the indexing and retrieval pipeline.

use serde::Serialize;

/// A plain-text document from the corpus.
///
/// Identity is the corpus-relative file path; the document is re-processed
/// whenever its content changes and removed when it disappears from the
/// corpus.
#[derive(Debug, Clone)]
pub struct Document {
    /// Corpus-relative path, e.g. `"tax/закон-о-налогах.txt"`.
    pub id: String,
    /// Human-readable title (filename stem by default).
    pub title: Option<String>,
    /// Full normalized body text.
    pub body: String,
    /// Last-modified marker (unix seconds).
    pub updated_at: i64,
    /// SHA-256 of the body, used to skip unchanged documents on sync.
    pub dedup_hash: String,
}

/// A fixed-size, offset-addressable span of a document's text — the atomic
/// unit of retrieval.
///
/// Identity is `(document_id, chunk_index)`; `id` is a deterministic UUID
/// derived from that pair. Offsets are counted in characters (not bytes)
/// so that citation positions are stable across encodings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    /// First character of the span (inclusive).
    pub start_char: usize,
    /// One past the last character of the span (exclusive).
    pub end_char: usize,
    pub text: String,
    /// SHA-256 of `text`, for embedding staleness detection.
    pub hash: String,
}

/// Lightweight per-document state used to decide whether a corpus file
/// needs re-processing.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRevision {
    pub updated_at: i64,
    pub dedup_hash: String,
}
