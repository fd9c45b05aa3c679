//! Embedding backfill: `embed pending` and `embed rebuild`.
//!
//! `pending` embeds chunks whose vector is missing or tagged with a
//! different model than the configured one — the incremental path after
//! an offline sync or a model change. `rebuild` drops every stored
//! vector first and regenerates from scratch.

use anyhow::{bail, Result};

use lexrag_core::embedding::Embedder;
use lexrag_core::store::VectorStore;

use crate::config::Config;

/// Counters reported after a backfill run.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbedReport {
    pub pending: u64,
    pub embedded: u64,
    pub failed: u64,
}

/// Embed every chunk missing a current-model vector.
pub async fn run_embed_pending(
    config: &Config,
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
) -> Result<EmbedReport> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let model = embedder.model_name().to_string();
    let pending = store.chunks_missing_embedding(&model).await?;
    let mut report = EmbedReport {
        pending: pending.len() as u64,
        ..EmbedReport::default()
    };

    for batch in pending.chunks(config.embedding.batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        match embedder.embed(&texts).await {
            Ok(vectors) => {
                for (chunk, vector) in batch.iter().zip(vectors.iter()) {
                    store
                        .upsert_embedding(&chunk.id, &chunk.document_id, vector, &model)
                        .await?;
                    report.embedded += 1;
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, batch = batch.len(), "embedding batch failed");
                report.failed += batch.len() as u64;
                if err.is_unavailable() {
                    // The backend is gone; the rest of the queue would
                    // fail the same way.
                    report.failed += (pending.len() as u64)
                        .saturating_sub(report.embedded + report.failed);
                    break;
                }
            }
        }
    }

    Ok(report)
}

/// Drop all vectors and regenerate them.
pub async fn run_embed_rebuild(
    config: &Config,
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
) -> Result<EmbedReport> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }
    store.clear_embeddings().await?;
    run_embed_pending(config, store, embedder).await
}
