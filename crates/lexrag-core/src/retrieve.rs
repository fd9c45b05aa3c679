//! Hybrid retrieval: semantic similarity blended with lexical overlap,
//! with a keyword-only fallback when no embedding backend is reachable.
//!
//! # Algorithm
//!
//! 1. Tokenize the query (lowercasing, light tokenization that preserves
//!    legal citation tokens).
//! 2. Pick the strategy with an up-front capability check: hybrid when
//!    the embedder reports availability, keyword-only otherwise. The
//!    choice is an explicit [`RetrievalStrategy`] variant, never
//!    discovered mid-query.
//! 3. Hybrid: fetch `candidate_k` semantic and keyword candidates,
//!    min-max normalize each list to `[0, 1]`, then combine
//!    `score = w × semantic + (1 − w) × keyword`. The weighted sum is
//!    monotonic in each component, so improving either sub-score never
//!    lowers the combined rank.
//! 4. Deduplicate by chunk identity, truncate to `top_k`; exact ties
//!    keep ascending insertion order.
//! 5. Label the survivors `[1]`, `[2]`, … in rank order for the
//!    generator's grounding contract.
//!
//! "No results" is an empty result, never an error. An embedder that
//! turns out to be unreachable mid-query downgrades the request to
//! keyword-only; storage errors propagate.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::Serialize;

use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::models::Chunk;
use crate::store::{ChunkCandidate, VectorStore};
use crate::tokenize::tokenize;

/// Retrieval tuning parameters.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalParams {
    /// Weight of the semantic component: `score = w·semantic + (1−w)·keyword`.
    pub semantic_weight: f64,
    /// Candidates fetched per signal before merging.
    pub candidate_k: usize,
    /// Semantic candidates below this cosine similarity are discarded
    /// before blending.
    pub min_similarity: f64,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            semantic_weight: 0.7,
            candidate_k: 40,
            min_similarity: 0.25,
        }
    }
}

impl RetrievalParams {
    /// Validate at startup; invalid values are configuration errors.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.semantic_weight) {
            return Err(Error::config(format!(
                "retrieval.semantic_weight must be in [0.0, 1.0], got {}",
                self.semantic_weight
            )));
        }
        if self.candidate_k == 0 {
            return Err(Error::config("retrieval.candidate_k must be > 0"));
        }
        if !(-1.0..=1.0).contains(&self.min_similarity) {
            return Err(Error::config(format!(
                "retrieval.min_similarity must be in [-1.0, 1.0], got {}",
                self.min_similarity
            )));
        }
        Ok(())
    }
}

/// How a retrieval request was actually served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    /// Semantic similarity blended with lexical overlap.
    Hybrid,
    /// Lexical overlap only (embedding backend unavailable or disabled).
    KeywordOnly,
}

/// One ranked, citation-labelled chunk.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    /// Combined score used for ranking.
    pub score: f64,
    /// Normalized semantic component (0.0 in keyword-only mode).
    pub semantic_score: f64,
    /// Keyword component (raw overlap in keyword-only mode, normalized
    /// in hybrid mode).
    pub keyword_score: f64,
    /// Per-request citation ordinal, starting at 1.
    pub label: usize,
    #[serde(skip)]
    pub(crate) seq: i64,
}

/// Ranked, deduplicated retrieval output for one query.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub strategy: RetrievalStrategy,
    pub hits: Vec<RetrievedChunk>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// The set of citation labels handed to the generator.
    pub fn labels(&self) -> BTreeSet<usize> {
        self.hits.iter().map(|h| h.label).collect()
    }
}

/// Query-side entry point over a [`VectorStore`] and an [`Embedder`].
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    params: RetrievalParams,
}

impl Retriever {
    /// Build a retriever, validating parameters up front.
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        params: RetrievalParams,
    ) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            store,
            embedder,
            params,
        })
    }

    /// Retrieve the `top_k` most relevant chunks for `query`.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<RetrievalResult> {
        if top_k == 0 {
            return Err(Error::invalid_input("top_k must be > 0"));
        }
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Err(Error::invalid_input("query contains no searchable tokens"));
        }

        if !self.embedder.is_available().await {
            return self.keyword_only(&tokens, top_k).await;
        }

        let query_vec = match self.embedder.embed_query(query).await {
            Ok(v) => v,
            Err(err) if err.is_unavailable() => {
                tracing::warn!(error = %err, "embedder dropped out, falling back to keyword-only retrieval");
                return self.keyword_only(&tokens, top_k).await;
            }
            Err(err) => return Err(err),
        };

        let semantic = self
            .store
            .similarity_search(&query_vec, self.embedder.model_name(), self.params.candidate_k)
            .await?;
        let semantic: Vec<ChunkCandidate> = semantic
            .into_iter()
            .filter(|c| c.raw_score >= self.params.min_similarity)
            .collect();
        let keyword = self
            .store
            .keyword_search(&tokens, self.params.candidate_k)
            .await?;

        let semantic_norm = normalize_scores(&semantic);
        let keyword_norm = normalize_scores(&keyword);

        struct Merged {
            chunk: Chunk,
            seq: i64,
            semantic: f64,
            keyword: f64,
        }

        let mut merged: HashMap<String, Merged> = HashMap::new();
        for (cand, norm) in semantic.iter().zip(semantic_norm.iter()) {
            merged
                .entry(cand.chunk.id.clone())
                .or_insert_with(|| Merged {
                    chunk: cand.chunk.clone(),
                    seq: cand.seq,
                    semantic: 0.0,
                    keyword: 0.0,
                })
                .semantic = *norm;
        }
        for (cand, norm) in keyword.iter().zip(keyword_norm.iter()) {
            merged
                .entry(cand.chunk.id.clone())
                .or_insert_with(|| Merged {
                    chunk: cand.chunk.clone(),
                    seq: cand.seq,
                    semantic: 0.0,
                    keyword: 0.0,
                })
                .keyword = *norm;
        }

        let w = self.params.semantic_weight;
        let hits: Vec<RetrievedChunk> = merged
            .into_values()
            .map(|m| RetrievedChunk {
                score: w * m.semantic + (1.0 - w) * m.keyword,
                semantic_score: m.semantic,
                keyword_score: m.keyword,
                chunk: m.chunk,
                label: 0,
                seq: m.seq,
            })
            .collect();

        Ok(finish(RetrievalStrategy::Hybrid, hits, top_k))
    }

    /// Keyword-only path: raw overlap scores pass through unchanged, so
    /// the ranking is identical to calling the store's keyword search
    /// directly.
    async fn keyword_only(&self, tokens: &[String], top_k: usize) -> Result<RetrievalResult> {
        let candidates = self.store.keyword_search(tokens, top_k).await?;
        let hits = candidates
            .into_iter()
            .map(|c| RetrievedChunk {
                score: c.raw_score,
                semantic_score: 0.0,
                keyword_score: c.raw_score,
                chunk: c.chunk,
                label: 0,
                seq: c.seq,
            })
            .collect();
        Ok(finish(RetrievalStrategy::KeywordOnly, hits, top_k))
    }
}

/// Sort, truncate, and assign citation labels.
fn finish(
    strategy: RetrievalStrategy,
    mut hits: Vec<RetrievedChunk>,
    top_k: usize,
) -> RetrievalResult {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.seq.cmp(&b.seq))
    });
    hits.truncate(top_k);
    for (i, hit) in hits.iter_mut().enumerate() {
        hit.label = i + 1;
    }
    RetrievalResult { strategy, hits }
}

/// Min-max normalize raw scores to `[0.0, 1.0]`, parallel to the input.
///
/// If all scores are equal they normalize to `1.0`.
fn normalize_scores(candidates: &[ChunkCandidate]) -> Vec<f64> {
    if candidates.is_empty() {
        return Vec::new();
    }
    let min = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::INFINITY, f64::min);
    let max = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::NEG_INFINITY, f64::max);

    candidates
        .iter()
        .map(|c| {
            if (max - min).abs() < f64::EPSILON {
                1.0
            } else {
                (c.raw_score - min) / (max - min)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{chunk_document, ChunkingParams};
    use crate::models::Document;
    use crate::store::memory::MemoryStore;
    use async_trait::async_trait;

    /// Deterministic test embedder: hashes tokens into a small vector.
    /// Identical text always produces the identical vector.
    struct StubEmbedder {
        available: bool,
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        fn model_name(&self) -> &str {
            "stub-v1"
        }
        fn dims(&self) -> usize {
            8
        }
        async fn is_available(&self) -> bool {
            self.available
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if !self.available {
                return Err(Error::unavailable("stub embedder", "offline"));
            }
            texts
                .iter()
                .map(|t| {
                    if t.trim().is_empty() {
                        return Err(Error::invalid_input("cannot embed empty text"));
                    }
                    let mut v = vec![0.0f32; 8];
                    for token in tokenize(t) {
                        let mut h: u32 = 2166136261;
                        for b in token.bytes() {
                            h = (h ^ b as u32).wrapping_mul(16777619);
                        }
                        v[(h % 8) as usize] += 1.0;
                    }
                    Ok(v)
                })
                .collect()
        }
    }

    async fn seeded_store(embedder: &StubEmbedder) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let bodies = [
            ("nalog.txt", "Налог на имущество физических лиц исчисляется ежегодно."),
            ("sud.txt", "Судебное разбирательство проводится открыто."),
            ("trud.txt", "Трудовой договор заключается в письменной форме."),
        ];
        for (id, body) in bodies {
            let doc = Document {
                id: id.to_string(),
                title: Some(id.to_string()),
                body: body.to_string(),
                updated_at: 1,
                dedup_hash: id.to_string(),
            };
            let chunks = chunk_document(id, body, &ChunkingParams::default());
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            let vectors: Vec<Option<Vec<f32>>> = if embedder.available {
                embedder
                    .embed(&texts)
                    .await
                    .unwrap()
                    .into_iter()
                    .map(Some)
                    .collect()
            } else {
                vec![None; chunks.len()]
            };
            store
                .upsert_document(&doc, &chunks, &vectors, "stub-v1")
                .await
                .unwrap();
        }
        store
    }

    fn retriever(store: Arc<MemoryStore>, available: bool) -> Retriever {
        Retriever::new(
            store,
            Arc::new(StubEmbedder { available }),
            RetrievalParams {
                min_similarity: -1.0,
                ..RetrievalParams::default()
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn empty_query_is_invalid_input() {
        let store = seeded_store(&StubEmbedder { available: true }).await;
        let r = retriever(store, true);
        assert!(matches!(
            r.retrieve("  ...  ", 5).await.unwrap_err(),
            Error::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn hybrid_ranks_matching_document_first() {
        let store = seeded_store(&StubEmbedder { available: true }).await;
        let r = retriever(store, true);
        let result = r.retrieve("налог на имущество", 5).await.unwrap();
        assert_eq!(result.strategy, RetrievalStrategy::Hybrid);
        assert!(!result.is_empty());
        assert_eq!(result.hits[0].chunk.document_id, "nalog.txt");
    }

    #[tokio::test]
    async fn unavailable_embedder_matches_keyword_search_exactly() {
        let store = seeded_store(&StubEmbedder { available: false }).await;
        let r = retriever(store.clone(), false);
        let result = r.retrieve("налоги имущество", 5).await.unwrap();
        assert_eq!(result.strategy, RetrievalStrategy::KeywordOnly);

        let direct = store
            .keyword_search(&tokenize("налоги имущество"), 5)
            .await
            .unwrap();
        assert_eq!(result.hits.len(), direct.len());
        for (hit, cand) in result.hits.iter().zip(direct.iter()) {
            assert_eq!(hit.chunk.id, cand.chunk.id);
            assert_eq!(hit.score, cand.raw_score);
        }
    }

    #[tokio::test]
    async fn respects_top_k_and_deduplicates() {
        let store = seeded_store(&StubEmbedder { available: true }).await;
        let r = retriever(store, true);
        for k in 1..=3 {
            let result = r.retrieve("договор налог суд", k).await.unwrap();
            assert!(result.hits.len() <= k);
            let ids: BTreeSet<&str> =
                result.hits.iter().map(|h| h.chunk.id.as_str()).collect();
            assert_eq!(ids.len(), result.hits.len(), "duplicate chunk in result");
        }
    }

    #[tokio::test]
    async fn labels_are_consecutive_ordinals() {
        let store = seeded_store(&StubEmbedder { available: true }).await;
        let r = retriever(store, true);
        let result = r.retrieve("договор налог суд", 3).await.unwrap();
        for (i, hit) in result.hits.iter().enumerate() {
            assert_eq!(hit.label, i + 1);
        }
    }

    #[tokio::test]
    async fn no_match_returns_empty_not_error() {
        let store = seeded_store(&StubEmbedder { available: false }).await;
        let r = retriever(store, false);
        let result = r.retrieve("кадастровый регистр", 5).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn keyword_boost_is_monotonic() {
        // Same semantic score for both chunks; the one whose keyword
        // score rises must never rank below the unchanged one.
        let w = 0.7;
        let combine = |s: f64, k: f64| w * s + (1.0 - w) * k;
        let unchanged = combine(0.5, 0.4);
        for boost in [0.4, 0.5, 0.7, 1.0] {
            assert!(combine(0.5, boost) >= unchanged);
        }
    }

    #[test]
    fn rejects_invalid_params() {
        let bad = RetrievalParams {
            semantic_weight: 1.5,
            ..RetrievalParams::default()
        };
        assert!(bad.validate().is_err());
        let bad = RetrievalParams {
            candidate_k: 0,
            ..RetrievalParams::default()
        };
        assert!(bad.validate().is_err());
    }
}
