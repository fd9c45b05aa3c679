//! In-memory [`VectorStore`] implementation.
//!
//! Uses a single `RwLock` over the whole index: reads run concurrently,
//! and a document replacement holds the write guard for the entire
//! purge-and-insert, so readers never observe a half-replaced document
//! and concurrent upserts of the same document serialize. Vector search
//! is brute-force cosine similarity over all stored vectors.
//!
//! Used by tests and embedded callers; the production backend is the
//! SQLite store in the application crate.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};
use crate::models::{Chunk, Document, DocumentRevision};
use crate::tokenize::keyword_overlap_score;

use super::{rank_candidates, ChunkCandidate, StoreStats, VectorStore};

struct StoredEmbedding {
    model: String,
    vector: Vec<f32>,
}

struct StoredChunk {
    chunk: Chunk,
    seq: i64,
    embedding: Option<StoredEmbedding>,
}

#[derive(Default)]
struct Inner {
    docs: HashMap<String, DocumentRevision>,
    chunks: Vec<StoredChunk>,
    next_seq: i64,
}

/// In-memory store.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn upsert_document(
        &self,
        doc: &Document,
        chunks: &[Chunk],
        vectors: &[Option<Vec<f32>>],
        model: &str,
    ) -> Result<()> {
        if chunks.len() != vectors.len() {
            return Err(Error::invalid_input(format!(
                "document {}: {} chunks but {} vectors",
                doc.id,
                chunks.len(),
                vectors.len()
            )));
        }

        let mut inner = self.inner.write().unwrap();
        inner.docs.insert(
            doc.id.clone(),
            DocumentRevision {
                updated_at: doc.updated_at,
                dedup_hash: doc.dedup_hash.clone(),
            },
        );
        inner.chunks.retain(|sc| sc.chunk.document_id != doc.id);
        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.chunks.push(StoredChunk {
                chunk: chunk.clone(),
                seq,
                embedding: vector.as_ref().map(|v| StoredEmbedding {
                    model: model.to_string(),
                    vector: v.clone(),
                }),
            });
        }
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.docs.remove(document_id);
        inner.chunks.retain(|sc| sc.chunk.document_id != document_id);
        Ok(())
    }

    async fn document_revision(&self, document_id: &str) -> Result<Option<DocumentRevision>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.docs.get(document_id).cloned())
    }

    async fn list_document_ids(&self) -> Result<Vec<String>> {
        let inner = self.inner.read().unwrap();
        let ids: BTreeSet<String> = inner.docs.keys().cloned().collect();
        Ok(ids.into_iter().collect())
    }

    async fn chunks_missing_embedding(&self, model: &str) -> Result<Vec<Chunk>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .chunks
            .iter()
            .filter(|sc| match &sc.embedding {
                None => true,
                Some(e) => e.model != model,
            })
            .map(|sc| sc.chunk.clone())
            .collect())
    }

    async fn upsert_embedding(
        &self,
        chunk_id: &str,
        _document_id: &str,
        vector: &[f32],
        model: &str,
    ) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let stored = inner
            .chunks
            .iter_mut()
            .find(|sc| sc.chunk.id == chunk_id)
            .ok_or_else(|| {
                Error::corruption(format!("embedding references missing chunk {chunk_id}"))
            })?;
        stored.embedding = Some(StoredEmbedding {
            model: model.to_string(),
            vector: vector.to_vec(),
        });
        Ok(())
    }

    async fn clear_embeddings(&self) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        for sc in inner.chunks.iter_mut() {
            sc.embedding = None;
        }
        Ok(())
    }

    async fn similarity_search(
        &self,
        query_vec: &[f32],
        model: &str,
        limit: usize,
    ) -> Result<Vec<ChunkCandidate>> {
        let inner = self.inner.read().unwrap();
        let mut candidates = Vec::new();
        for sc in &inner.chunks {
            let Some(embedding) = &sc.embedding else {
                continue;
            };
            if embedding.model != model {
                continue;
            }
            if embedding.vector.len() != query_vec.len() {
                return Err(Error::corruption(format!(
                    "chunk {} has a {}-dim vector, query has {} dims",
                    sc.chunk.id,
                    embedding.vector.len(),
                    query_vec.len()
                )));
            }
            candidates.push(ChunkCandidate {
                chunk: sc.chunk.clone(),
                raw_score: cosine_similarity(query_vec, &embedding.vector) as f64,
                seq: sc.seq,
            });
        }
        Ok(rank_candidates(candidates, limit))
    }

    async fn keyword_search(
        &self,
        query_tokens: &[String],
        limit: usize,
    ) -> Result<Vec<ChunkCandidate>> {
        let token_set: BTreeSet<String> = query_tokens.iter().cloned().collect();
        let inner = self.inner.read().unwrap();
        let candidates: Vec<ChunkCandidate> = inner
            .chunks
            .iter()
            .filter_map(|sc| {
                let score = keyword_overlap_score(&token_set, &sc.chunk.text);
                (score > 0.0).then(|| ChunkCandidate {
                    chunk: sc.chunk.clone(),
                    raw_score: score,
                    seq: sc.seq,
                })
            })
            .collect();
        Ok(rank_candidates(candidates, limit))
    }

    async fn stats(&self) -> Result<StoreStats> {
        let inner = self.inner.read().unwrap();
        Ok(StoreStats {
            documents: inner.docs.len() as u64,
            chunks: inner.chunks.len() as u64,
            embeddings: inner
                .chunks
                .iter()
                .filter(|sc| sc.embedding.is_some())
                .count() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{chunk_document, ChunkingParams};

    fn doc(id: &str, body: &str) -> Document {
        Document {
            id: id.to_string(),
            title: Some(id.to_string()),
            body: body.to_string(),
            updated_at: 1,
            dedup_hash: format!("hash-{id}"),
        }
    }

    fn chunks_for(d: &Document) -> Vec<Chunk> {
        chunk_document(&d.id, &d.body, &ChunkingParams::default())
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let store = MemoryStore::new();
        let d = doc("a.txt", "налог на имущество физических лиц");
        let chunks = chunks_for(&d);
        let vectors = vec![None; chunks.len()];

        store.upsert_document(&d, &chunks, &vectors, "m").await.unwrap();
        store.upsert_document(&d, &chunks, &vectors, "m").await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.chunks, chunks.len() as u64);
    }

    #[tokio::test]
    async fn replacement_purges_stale_chunks() {
        let store = MemoryStore::new();
        let d1 = doc("a.txt", "старый текст закона о налогах");
        let c1 = chunks_for(&d1);
        store
            .upsert_document(&d1, &c1, &vec![None; c1.len()], "m")
            .await
            .unwrap();

        let d2 = doc("a.txt", "новый текст");
        let c2 = chunks_for(&d2);
        store
            .upsert_document(&d2, &c2, &vec![None; c2.len()], "m")
            .await
            .unwrap();

        let hits = store
            .keyword_search(&["старый".to_string()], 10)
            .await
            .unwrap();
        assert!(hits.is_empty());
        assert_eq!(store.stats().await.unwrap().chunks, c2.len() as u64);
    }

    #[tokio::test]
    async fn stale_model_embeddings_count_as_missing() {
        let store = MemoryStore::new();
        let d = doc("a.txt", "облагаемый доход и облагаемый импорт");
        let chunks = chunks_for(&d);
        let vectors: Vec<Option<Vec<f32>>> = chunks.iter().map(|_| Some(vec![1.0, 0.0])).collect();
        store.upsert_document(&d, &chunks, &vectors, "model-v1").await.unwrap();

        assert!(store
            .chunks_missing_embedding("model-v1")
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            store.chunks_missing_embedding("model-v2").await.unwrap().len(),
            chunks.len()
        );
        // Stale-model vectors never participate in similarity search.
        assert!(store
            .similarity_search(&[1.0, 0.0], "model-v2", 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn dimension_mismatch_is_corruption() {
        let store = MemoryStore::new();
        let d = doc("a.txt", "ставка устанавливается в размере");
        let chunks = chunks_for(&d);
        let vectors: Vec<Option<Vec<f32>>> =
            chunks.iter().map(|_| Some(vec![1.0, 0.0, 0.0])).collect();
        store.upsert_document(&d, &chunks, &vectors, "m").await.unwrap();

        let err = store
            .similarity_search(&[1.0, 0.0], "m", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StorageCorruption(_)));
    }

    #[tokio::test]
    async fn similarity_ties_break_by_insertion_order() {
        let store = MemoryStore::new();
        let d1 = doc("a.txt", "первый документ");
        let d2 = doc("b.txt", "второй документ");
        let c1 = chunks_for(&d1);
        let c2 = chunks_for(&d2);
        let v = vec![Some(vec![1.0f32, 0.0])];
        store.upsert_document(&d1, &c1, &v, "m").await.unwrap();
        store.upsert_document(&d2, &c2, &v, "m").await.unwrap();

        let hits = store.similarity_search(&[1.0, 0.0], "m", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.document_id, "a.txt");
        assert_eq!(hits[1].chunk.document_id, "b.txt");
    }

    #[tokio::test]
    async fn embedding_for_unknown_chunk_is_corruption() {
        let store = MemoryStore::new();
        let err = store
            .upsert_embedding("no-such-chunk", "a.txt", &[1.0], "m")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StorageCorruption(_)));
    }

    #[tokio::test]
    async fn concurrent_upserts_never_interleave() {
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        let d1 = doc("same.txt", "вариант один: налог на транспортные средства");
        let d2 = doc("same.txt", "вариант два: плата за пользование");
        let c1 = chunks_for(&d1);
        let c2 = chunks_for(&d2);

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let (s, d1, c1) = (store.clone(), d1.clone(), c1.clone());
            tasks.push(tokio::spawn(async move {
                let v = vec![None; c1.len()];
                s.upsert_document(&d1, &c1, &v, "m").await.unwrap();
            }));
            let (s, d2, c2) = (store.clone(), d2.clone(), c2.clone());
            tasks.push(tokio::spawn(async move {
                let v = vec![None; c2.len()];
                s.upsert_document(&d2, &c2, &v, "m").await.unwrap();
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        // The final chunk set must match exactly one of the two inputs.
        let one = store
            .keyword_search(&["один".to_string()], 10)
            .await
            .unwrap();
        let two = store.keyword_search(&["два".to_string()], 10).await.unwrap();
        assert!(
            (one.is_empty() && !two.is_empty()) || (!one.is_empty() && two.is_empty()),
            "store holds a mix of two replacements"
        );
    }
}
