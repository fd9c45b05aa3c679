//! In-process tests for the SQLite store and the retrieval/generation
//! pipeline running on top of it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use lexrag::db;
use lexrag::migrate;
use lexrag::sqlite_store::SqliteStore;

use lexrag_core::chunk::{chunk_document, ChunkingParams};
use lexrag_core::embedding::Embedder;
use lexrag_core::error::{Error, Result as CoreResult};
use lexrag_core::generate::{Generator, GenerationParams, LlmProvider, NO_EVIDENCE_ANSWER};
use lexrag_core::models::Document;
use lexrag_core::retrieve::{RetrievalParams, RetrievalStrategy, Retriever};
use lexrag_core::store::VectorStore;
use lexrag_core::tokenize::tokenize;

async fn open_store() -> (TempDir, Arc<SqliteStore>) {
    let tmp = TempDir::new().unwrap();
    let pool = db::connect(&tmp.path().join("lexrag.db")).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    (tmp, Arc::new(SqliteStore::new(pool)))
}

fn document(id: &str, body: &str) -> Document {
    Document {
        id: id.to_string(),
        title: Some(id.trim_end_matches(".txt").to_string()),
        body: body.to_string(),
        updated_at: 100,
        dedup_hash: format!("hash-of-{id}"),
    }
}

async fn index(store: &SqliteStore, embedder: &StubEmbedder, id: &str, body: &str) {
    let doc = document(id, body);
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
        .upsert_document(&doc, &chunks, &vectors, embedder.model_name())
        .await
        .unwrap();
}

/// Deterministic token-hash embedder, identical across calls and batch
/// sizes.
struct StubEmbedder {
    available: bool,
}

#[async_trait]
impl Embedder for StubEmbedder {
    fn model_name(&self) -> &str {
        "stub-v1"
    }
    fn dims(&self) -> usize {
        16
    }
    async fn is_available(&self) -> bool {
        self.available
    }
    async fn embed(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        if !self.available {
            return Err(Error::unavailable("stub embedder", "offline"));
        }
        texts
            .iter()
            .map(|t| {
                if t.trim().is_empty() {
                    return Err(Error::invalid_input("cannot embed empty text"));
                }
                let mut v = vec![0.0f32; 16];
                for token in tokenize(t) {
                    let mut h: u32 = 2166136261;
                    for b in token.bytes() {
                        h = (h ^ b as u32).wrapping_mul(16777619);
                    }
                    v[(h % 16) as usize] += 1.0;
                }
                Ok(v)
            })
            .collect()
    }
}

/// Scripted model that records how often it was called.
struct ScriptedLlm {
    response: String,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    fn new(response: &str) -> Arc<Self> {
        Arc::new(Self {
            response: response.to_string(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }
    async fn is_available(&self) -> bool {
        true
    }
    async fn complete(&self, _prompt: &str, _max_tokens: u32, _temperature: f32) -> CoreResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

const NALOG: &str = "Налог на имущество физических лиц исчисляется ежегодно исходя из \
                     стоимости объектов налогообложения.";
const TRUD: &str = "Трудовой договор заключается в письменной форме и составляется в двух \
                    экземплярах.";

#[tokio::test]
async fn upsert_is_idempotent_in_sqlite() {
    let (_tmp, store) = open_store().await;
    let embedder = StubEmbedder { available: true };

    index(&store, &embedder, "nalog.txt", NALOG).await;
    let before = store.stats().await.unwrap();
    index(&store, &embedder, "nalog.txt", NALOG).await;
    let after = store.stats().await.unwrap();

    assert_eq!(before.documents, after.documents);
    assert_eq!(before.chunks, after.chunks);
    assert_eq!(before.embeddings, after.embeddings);
}

#[tokio::test]
async fn replacement_is_atomic_per_document() {
    let (_tmp, store) = open_store().await;
    let embedder = StubEmbedder { available: false };

    index(&store, &embedder, "doc.txt", "старая редакция закона").await;
    index(&store, &embedder, "doc.txt", "новая редакция закона").await;

    let stale = store
        .keyword_search(&tokenize("старая"), 10)
        .await
        .unwrap();
    let fresh = store
        .keyword_search(&tokenize("новая"), 10)
        .await
        .unwrap();
    assert!(stale.is_empty());
    assert_eq!(fresh.len(), 1);
}

#[tokio::test]
async fn delete_document_removes_chunks_and_embeddings() {
    let (_tmp, store) = open_store().await;
    let embedder = StubEmbedder { available: true };

    index(&store, &embedder, "nalog.txt", NALOG).await;
    store.delete_document("nalog.txt").await.unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.documents, 0);
    assert_eq!(stats.chunks, 0);
    assert_eq!(stats.embeddings, 0);
}

#[tokio::test]
async fn stale_model_drives_incremental_reembedding() {
    let (_tmp, store) = open_store().await;
    let embedder = StubEmbedder { available: true };

    index(&store, &embedder, "nalog.txt", NALOG).await;
    assert!(store
        .chunks_missing_embedding("stub-v1")
        .await
        .unwrap()
        .is_empty());

    let pending = store.chunks_missing_embedding("stub-v2").await.unwrap();
    assert!(!pending.is_empty());

    // Re-tagging every pending chunk with the new model empties the queue.
    for chunk in &pending {
        store
            .upsert_embedding(&chunk.id, &chunk.document_id, &vec![0.5f32; 16], "stub-v2")
            .await
            .unwrap();
    }
    assert!(store
        .chunks_missing_embedding("stub-v2")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn dimension_mismatch_surfaces_as_corruption() {
    let (_tmp, store) = open_store().await;
    let embedder = StubEmbedder { available: true };

    index(&store, &embedder, "nalog.txt", NALOG).await;
    let err = store
        .similarity_search(&vec![0.0f32; 4], "stub-v1", 10)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StorageCorruption(_)));
}

#[tokio::test]
async fn embedding_for_missing_chunk_is_corruption() {
    let (_tmp, store) = open_store().await;
    let err = store
        .upsert_embedding("ghost-chunk", "doc.txt", &[1.0], "stub-v1")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StorageCorruption(_)));
}

#[tokio::test]
async fn hybrid_pipeline_answers_with_citations() {
    let (_tmp, store) = open_store().await;
    let embedder = StubEmbedder { available: true };
    index(&store, &embedder, "nalog.txt", NALOG).await;
    index(&store, &embedder, "trud.txt", TRUD).await;

    let retriever = Retriever::new(
        store.clone(),
        Arc::new(StubEmbedder { available: true }),
        RetrievalParams {
            min_similarity: -1.0,
            ..RetrievalParams::default()
        },
    )
    .unwrap();

    let retrieval = retriever.retrieve("налог на имущество", 3).await.unwrap();
    assert_eq!(retrieval.strategy, RetrievalStrategy::Hybrid);
    assert_eq!(retrieval.hits[0].chunk.document_id, "nalog.txt");

    let llm = ScriptedLlm::new("Налог исчисляется ежегодно [1]. Выдумка [8].");
    let generator = Generator::new(llm.clone(), GenerationParams::default()).unwrap();
    let answer = generator
        .generate("налог на имущество", &retrieval)
        .await
        .unwrap();

    assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    assert!(answer.evidence);
    assert_eq!(answer.citations.len(), 1);
    assert_eq!(answer.citations[0].document_id, "nalog.txt");
    assert_eq!(answer.grounding_violations, vec![8]);
    assert!(!answer.answer.contains("[8]"));
}

#[tokio::test]
async fn offline_pipeline_falls_back_and_short_circuits() {
    let (_tmp, store) = open_store().await;
    let embedder = StubEmbedder { available: false };
    index(&store, &embedder, "nalog.txt", NALOG).await;

    let retriever = Retriever::new(
        store.clone(),
        Arc::new(StubEmbedder { available: false }),
        RetrievalParams::default(),
    )
    .unwrap();

    let found = retriever.retrieve("налог на имущество", 3).await.unwrap();
    assert_eq!(found.strategy, RetrievalStrategy::KeywordOnly);
    assert!(!found.is_empty());

    let missing = retriever.retrieve("кадастровые регистры", 3).await.unwrap();
    assert!(missing.is_empty());

    let llm = ScriptedLlm::new("unused");
    let generator = Generator::new(llm.clone(), GenerationParams::default()).unwrap();
    let answer = generator
        .generate("кадастровые регистры", &missing)
        .await
        .unwrap();
    assert_eq!(answer.answer, NO_EVIDENCE_ANSWER);
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn reads_stay_consistent_during_replacement() {
    let (_tmp, store) = open_store().await;
    let embedder = StubEmbedder { available: false };
    index(&store, &embedder, "doc.txt", "редакция номер один закона").await;

    // Interleave replacements with searches: every read must see a
    // complete revision, never chunks from two of them.
    for round in 0..10u32 {
        let body = if round % 2 == 0 {
            "редакция номер два закона"
        } else {
            "редакция номер один закона"
        };
        index(&store, &embedder, "doc.txt", body).await;

        let one = store.keyword_search(&tokenize("один"), 10).await.unwrap();
        let two = store.keyword_search(&tokenize("два"), 10).await.unwrap();
        assert!(
            one.is_empty() != two.is_empty(),
            "observed a mix of document revisions"
        );
    }
}
