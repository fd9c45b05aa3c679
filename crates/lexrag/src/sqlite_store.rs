//! SQLite-backed [`VectorStore`] implementation.
//!
//! Chunk replacement runs inside a single transaction, so SQLite's
//! single-writer discipline serializes concurrent upserts of the same
//! document and WAL readers never observe a half-replaced document.
//! Vector search is brute-force cosine similarity computed in Rust over
//! the stored BLOBs; keyword search scores lexical overlap the same way
//! the in-memory store does, so both backends rank identically.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use lexrag_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use lexrag_core::error::{Error, Result};
use lexrag_core::models::{Chunk, Document, DocumentRevision};
use lexrag_core::store::{rank_candidates, ChunkCandidate, StoreStats, VectorStore};
use lexrag_core::tokenize::keyword_overlap_score;

/// SQLite implementation of the [`VectorStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn store_err(err: sqlx::Error) -> Error {
    Error::store(err.to_string())
}

fn chunk_from_row(row: &sqlx::sqlite::SqliteRow) -> Chunk {
    Chunk {
        id: row.get("id"),
        document_id: row.get("document_id"),
        chunk_index: row.get("chunk_index"),
        start_char: row.get::<i64, _>("start_char") as usize,
        end_char: row.get::<i64, _>("end_char") as usize,
        text: row.get("text"),
        hash: row.get("hash"),
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
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

        let mut tx = self.pool.begin().await.map_err(store_err)?;

        sqlx::query("DELETE FROM embeddings WHERE document_id = ?")
            .bind(&doc.id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(&doc.id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, title, updated_at, dedup_hash, body)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                updated_at = excluded.updated_at,
                dedup_hash = excluded.dedup_hash,
                body = excluded.body
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.title)
        .bind(doc.updated_at)
        .bind(&doc.dedup_hash)
        .bind(&doc.body)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        let now = chrono::Utc::now().timestamp();
        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_index, start_char, end_char, text, hash)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(chunk.start_char as i64)
            .bind(chunk.end_char as i64)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

            if let Some(vec) = vector {
                sqlx::query(
                    r#"
                    INSERT INTO embeddings (chunk_id, document_id, model, dims, vector, created_at)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&chunk.id)
                .bind(&doc.id)
                .bind(model)
                .bind(vec.len() as i64)
                .bind(vec_to_blob(vec))
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(store_err)?;
            }
        }

        tx.commit().await.map_err(store_err)
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        sqlx::query("DELETE FROM embeddings WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        tx.commit().await.map_err(store_err)
    }

    async fn document_revision(&self, document_id: &str) -> Result<Option<DocumentRevision>> {
        let row = sqlx::query("SELECT updated_at, dedup_hash FROM documents WHERE id = ?")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        Ok(row.map(|r| DocumentRevision {
            updated_at: r.get("updated_at"),
            dedup_hash: r.get("dedup_hash"),
        }))
    }

    async fn list_document_ids(&self) -> Result<Vec<String>> {
        let rows = sqlx::query_scalar::<_, String>("SELECT id FROM documents ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(rows)
    }

    async fn chunks_missing_embedding(&self, model: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.document_id, c.chunk_index, c.start_char, c.end_char, c.text, c.hash
            FROM chunks c
            LEFT JOIN embeddings e ON e.chunk_id = c.id
            WHERE e.chunk_id IS NULL OR e.model != ?
            ORDER BY c.rowid ASC
            "#,
        )
        .bind(model)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(rows.iter().map(chunk_from_row).collect())
    }

    async fn upsert_embedding(
        &self,
        chunk_id: &str,
        document_id: &str,
        vector: &[f32],
        model: &str,
    ) -> Result<()> {
        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM chunks WHERE id = ?")
            .bind(chunk_id)
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        if !exists {
            return Err(Error::corruption(format!(
                "embedding references missing chunk {chunk_id}"
            )));
        }

        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO embeddings (chunk_id, document_id, model, dims, vector, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                document_id = excluded.document_id,
                model = excluded.model,
                dims = excluded.dims,
                vector = excluded.vector,
                created_at = excluded.created_at
            "#,
        )
        .bind(chunk_id)
        .bind(document_id)
        .bind(model)
        .bind(vector.len() as i64)
        .bind(vec_to_blob(vector))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn clear_embeddings(&self) -> Result<()> {
        sqlx::query("DELETE FROM embeddings")
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn similarity_search(
        &self,
        query_vec: &[f32],
        model: &str,
        limit: usize,
    ) -> Result<Vec<ChunkCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.document_id, c.chunk_index, c.start_char, c.end_char, c.text, c.hash,
                   c.rowid AS seq, e.dims, e.vector
            FROM embeddings e
            JOIN chunks c ON c.id = e.chunk_id
            WHERE e.model = ?
            "#,
        )
        .bind(model)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let dims: i64 = row.get("dims");
            if dims as usize != query_vec.len() {
                let chunk_id: String = row.get("id");
                return Err(Error::corruption(format!(
                    "chunk {chunk_id} has a {dims}-dim vector, query has {} dims",
                    query_vec.len()
                )));
            }
            let blob: Vec<u8> = row.get("vector");
            let vector = blob_to_vec(&blob);
            if vector.len() != dims as usize {
                let chunk_id: String = row.get("id");
                return Err(Error::corruption(format!(
                    "chunk {chunk_id}: stored blob holds {} floats, dims column says {dims}",
                    vector.len()
                )));
            }
            candidates.push(ChunkCandidate {
                chunk: chunk_from_row(row),
                raw_score: cosine_similarity(query_vec, &vector) as f64,
                seq: row.get("seq"),
            });
        }

        Ok(rank_candidates(candidates, limit))
    }

    async fn keyword_search(
        &self,
        query_tokens: &[String],
        limit: usize,
    ) -> Result<Vec<ChunkCandidate>> {
        let token_set: std::collections::BTreeSet<String> =
            query_tokens.iter().cloned().collect();

        let rows = sqlx::query(
            r#"
            SELECT id, document_id, chunk_index, start_char, end_char, text, hash, rowid AS seq
            FROM chunks
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let candidates: Vec<ChunkCandidate> = rows
            .iter()
            .filter_map(|row| {
                let text: String = row.get("text");
                let score = keyword_overlap_score(&token_set, &text);
                (score > 0.0).then(|| ChunkCandidate {
                    chunk: chunk_from_row(row),
                    raw_score: score,
                    seq: row.get("seq"),
                })
            })
            .collect();

        Ok(rank_candidates(candidates, limit))
    }

    async fn stats(&self) -> Result<StoreStats> {
        let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        let embeddings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;

        Ok(StoreStats {
            documents: documents as u64,
            chunks: chunks as u64,
            embeddings: embeddings as u64,
        })
    }
}
