//! Corpus ingestion pipeline: scan, chunk, embed, store.
//!
//! Incremental by default: a document whose content hash matches the
//! stored revision is skipped, and documents that disappeared from the
//! corpus directory are deleted from the store. Embedding runs in
//! index-ordered batches during the sync; if the embedder is offline the
//! chunks are stored without vectors and picked up later by
//! `embed pending`.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use lexrag_core::chunk::chunk_document;
use lexrag_core::embedding::Embedder;
use lexrag_core::models::Document;
use lexrag_core::store::VectorStore;

use crate::config::Config;
use crate::corpus::{scan_corpus, CorpusFile};

/// Counters reported after a sync run.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncReport {
    pub scanned: u64,
    pub upserted: u64,
    pub skipped: u64,
    pub deleted: u64,
    pub chunks_written: u64,
    pub chunks_embedded: u64,
    pub chunks_pending: u64,
}

/// Run a full corpus sync against the store.
///
/// With `full`, every document is re-processed regardless of its stored
/// revision.
pub async fn run_sync(
    config: &Config,
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    full: bool,
) -> Result<SyncReport> {
    let params = config.chunking_params()?;
    let files = scan_corpus(&config.corpus)?;
    let mut report = SyncReport {
        scanned: files.len() as u64,
        ..SyncReport::default()
    };

    let embedder_ready = config.embedding.is_enabled() && embedder.is_available().await;
    if config.embedding.is_enabled() && !embedder_ready {
        tracing::warn!(
            model = embedder.model_name(),
            "embedder unreachable, chunks will be stored without vectors"
        );
    }

    for file in &files {
        let dedup_hash = hash_text(&file.body);
        if !full {
            let revision = store
                .document_revision(&file.path)
                .await
                .with_context(|| format!("reading revision of {}", file.path))?;
            if revision.map(|r| r.dedup_hash == dedup_hash).unwrap_or(false) {
                report.skipped += 1;
                continue;
            }
        }

        let doc = Document {
            id: file.path.clone(),
            title: Some(file.title.clone()),
            body: file.body.clone(),
            updated_at: file.updated_at,
            dedup_hash,
        };
        let chunks = chunk_document(&doc.id, &doc.body, &params);

        let vectors = if embedder_ready && !chunks.is_empty() {
            embed_batched(embedder, config.embedding.batch_size, &chunks).await?
        } else {
            vec![None; chunks.len()]
        };

        report.chunks_embedded += vectors.iter().filter(|v| v.is_some()).count() as u64;
        report.chunks_pending += vectors.iter().filter(|v| v.is_none()).count() as u64;
        report.chunks_written += chunks.len() as u64;

        store
            .upsert_document(&doc, &chunks, &vectors, embedder.model_name())
            .await
            .with_context(|| format!("storing {}", file.path))?;
        report.upserted += 1;

        tracing::debug!(document = %file.path, chunks = chunks.len(), "synced");
    }

    report.deleted = delete_vanished(store, &files).await?;
    Ok(report)
}

/// Embed chunk texts in batches, reassembling index-ordered.
///
/// An `Unavailable` error mid-sync downgrades the remaining chunks to
/// pending instead of failing the sync; any other error propagates.
async fn embed_batched(
    embedder: &dyn Embedder,
    batch_size: usize,
    chunks: &[lexrag_core::models::Chunk],
) -> Result<Vec<Option<Vec<f32>>>> {
    let mut vectors: Vec<Option<Vec<f32>>> = Vec::with_capacity(chunks.len());

    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        match embedder.embed(&texts).await {
            Ok(batch_vectors) => {
                vectors.extend(batch_vectors.into_iter().map(Some));
            }
            Err(err) if err.is_unavailable() => {
                tracing::warn!(error = %err, "embedder dropped out mid-sync, leaving remaining chunks pending");
                vectors.resize(chunks.len(), None);
                break;
            }
            Err(err) => return Err(err.into()),
        }
    }

    vectors.resize(chunks.len(), None);
    Ok(vectors)
}

/// Delete stored documents that no longer exist in the corpus.
async fn delete_vanished(store: &dyn VectorStore, files: &[CorpusFile]) -> Result<u64> {
    let present: std::collections::BTreeSet<&str> =
        files.iter().map(|f| f.path.as_str()).collect();
    let mut deleted = 0u64;
    for id in store.list_document_ids().await? {
        if !present.contains(id.as_str()) {
            store.delete_document(&id).await?;
            tracing::info!(document = %id, "removed from corpus, deleting");
            deleted += 1;
        }
    }
    Ok(deleted)
}

pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
