//! Filesystem corpus enumeration.
//!
//! Walks the configured corpus directory and yields one [`CorpusFile`]
//! per matching plain-text file. The corpus-relative path is the
//! document identity, so moving a file re-indexes it as a new document.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::CorpusConfig;

/// A document candidate read from the corpus directory.
#[derive(Debug, Clone)]
pub struct CorpusFile {
    /// Corpus-relative path (document identity).
    pub path: String,
    /// Filename stem.
    pub title: String,
    /// Whitespace-normalized body text.
    pub body: String,
    /// File mtime, unix seconds.
    pub updated_at: i64,
}

/// Enumerate corpus files, sorted by path for deterministic processing.
pub fn scan_corpus(config: &CorpusConfig) -> Result<Vec<CorpusFile>> {
    let root = &config.root;
    if !root.exists() {
        bail!("Corpus root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;
    let exclude_set = build_globset(&config.exclude_globs)?;

    let mut files = Vec::new();
    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        files.push(read_corpus_file(path, &rel_str)?);
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn read_corpus_file(path: &Path, relative: &str) -> Result<CorpusFile> {
    let metadata = std::fs::metadata(path)?;
    let modified = metadata
        .modified()
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
    let updated_at = modified
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;

    let raw = std::fs::read_to_string(path).unwrap_or_default();

    let title = path
        .file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| relative.to_string());

    Ok(CorpusFile {
        path: relative.to_string(),
        title,
        body: normalize_text(&raw),
        updated_at,
    })
}

/// Collapse whitespace runs into single spaces.
///
/// Chunk offsets address the normalized body, so normalization happens
/// exactly once, before chunking, and the normalized text is what gets
/// persisted.
pub fn normalize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_whitespace = false;
    for c in raw.chars() {
        if c.is_whitespace() {
            in_whitespace = true;
            continue;
        }
        if in_whitespace && !out.is_empty() {
            out.push(' ');
        }
        in_whitespace = false;
        out.push(c);
    }
    out
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
