//! Character-offset text chunker.
//!
//! Splits document body text into overlapping fixed-size [`Chunk`]s with
//! deterministic character offsets. Splitting is character-based rather
//! than word-based so that re-chunking the same text always reproduces
//! byte-identical boundaries, and so offsets can serve as stable citation
//! addresses.
//!
//! # Algorithm
//!
//! 1. A cursor walks character positions; each chunk nominally ends at
//!    `start + chunk_size`.
//! 2. If that end lands mid-text, the cut prefers the position just after
//!    the nearest whitespace within the trailing `boundary_window`
//!    characters; with no whitespace in the window it falls back to a
//!    hard cut. The bounded lookbehind keeps the pass O(n).
//! 3. The next chunk starts at `end - overlap`, so successive spans
//!    overlap by exactly `overlap` characters regardless of snapping, and
//!    together the spans cover the document with no gaps.
//! 4. Non-empty input yields at least one chunk; empty input yields none.
//!
//! Each chunk receives a deterministic UUID derived from its document ID
//! and index, plus a SHA-256 hash of its text for staleness detection in
//! the embedding pipeline.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::Chunk;

/// Validated chunking parameters.
///
/// Constructed once at startup; invalid combinations are a configuration
/// error, never a per-call failure.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingParams {
    chunk_size: usize,
    overlap: usize,
    boundary_window: usize,
}

impl ChunkingParams {
    /// Validate and build chunking parameters.
    ///
    /// Requirements:
    /// - `chunk_size > 0`
    /// - `overlap < chunk_size`
    /// - `boundary_window < chunk_size - overlap` (guarantees the cursor
    ///   always advances, even after whitespace snapping)
    pub fn new(chunk_size: usize, overlap: usize, boundary_window: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::config("chunking.chunk_size must be > 0"));
        }
        if overlap >= chunk_size {
            return Err(Error::config(format!(
                "chunking.overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        if boundary_window >= chunk_size - overlap {
            return Err(Error::config(format!(
                "chunking.boundary_window ({boundary_window}) must be smaller than chunk_size - overlap ({})",
                chunk_size - overlap
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
            boundary_window,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
            boundary_window: 40,
        }
    }
}

/// Split a document body into overlapping chunks.
///
/// Pure function over the text: persistence is the store's concern.
/// Returns chunks with contiguous indices starting at 0 and half-open
/// character ranges `[start_char, end_char)`.
///
/// # Guarantees
///
/// - Re-chunking identical text with identical parameters reproduces
///   identical boundaries, ids, and hashes.
/// - `chunks[i + 1].start_char == chunks[i].end_char - overlap`.
/// - The union of ranges covers `[0, text.chars().count())`.
/// - Empty input returns an empty Vec.
pub fn chunk_document(document_id: &str, text: &str, params: &ChunkingParams) -> Vec<Chunk> {
    // Byte offset of every char position, so char ranges can be sliced
    // without re-scanning the text per chunk.
    let char_starts: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
    let total = char_starts.len();
    if total == 0 {
        return Vec::new();
    }

    let byte_at = |pos: usize| -> usize {
        if pos >= total {
            text.len()
        } else {
            char_starts[pos]
        }
    };
    let char_at = |pos: usize| -> char { text[char_starts[pos]..].chars().next().unwrap_or(' ') };

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index: i64 = 0;

    loop {
        let hard_end = (start + params.chunk_size).min(total);
        let mut end = hard_end;

        if hard_end < total {
            let floor = hard_end.saturating_sub(params.boundary_window).max(start + 1);
            if let Some(ws) = (floor..hard_end).rev().find(|&p| char_at(p).is_whitespace()) {
                end = ws + 1;
            }
        }

        let span = &text[byte_at(start)..byte_at(end)];
        chunks.push(make_chunk(document_id, index, start, end, span));
        index += 1;

        if end >= total {
            break;
        }
        start = end - params.overlap;
    }

    chunks
}

/// Build a single [`Chunk`] with a deterministic UUID and content hash.
fn make_chunk(document_id: &str, index: i64, start: usize, end: usize, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: chunk_id(document_id, index),
        document_id: document_id.to_string(),
        chunk_index: index,
        start_char: start,
        end_char: end,
        text: text.to_string(),
        hash,
    }
}

/// Deterministic chunk UUID: v5 over `"{document_id}:{index}"`.
pub fn chunk_id(document_id: &str, index: i64) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{document_id}:{index}").as_bytes(),
    )
    .to_string()
}
