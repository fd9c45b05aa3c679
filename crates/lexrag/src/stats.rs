//! Index statistics for `lexrag stats`.
//!
//! A quick summary of what's indexed: document and chunk counts and
//! embedding coverage, to confirm syncs and backfills are working.

use anyhow::Result;

use lexrag_core::store::VectorStore;

use crate::config::Config;

pub async fn run_stats(config: &Config, store: &dyn VectorStore) -> Result<()> {
    let stats = store.stats().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("LexRAG index");
    println!("============");
    println!();
    println!("  Database:   {}", config.db.path.display());
    println!("  Size:       {}", format_bytes(db_size));
    println!();
    println!("  Documents:  {}", stats.documents);
    println!("  Chunks:     {}", stats.chunks);
    println!(
        "  Embedded:   {} / {} ({}%)",
        stats.embeddings,
        stats.chunks,
        if stats.chunks > 0 {
            stats.embeddings * 100 / stats.chunks
        } else {
            0
        }
    );
    println!();

    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
