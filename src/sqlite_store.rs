//! SQLite-backed storage ports.
//!
//! | Type | Port | Table |
//! |------|------|-------|
//! | [`SqliteDocumentRepository`] | `DocumentRepository` | `documents` |
//! | [`SqliteChunkRepository`] | `ChunkRepository` | `chunks` |
//! | [`SqliteVectorIndex`] | `VectorIndex` | `vectors` |
//!
//! All three share one [`SqlitePool`]. Deleting a document cascades to its
//! chunks through the foreign key; vectors are keyed independently and are
//! removed by the orchestrator.
//!
//! Vector search is brute-force cosine similarity over every stored BLOB,
//! read in `seq` order so ties keep first-insertion order.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use lexrag_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use lexrag_core::index::{check_batch, check_filters, matches_filters, rank_hits, VectorIndex};
use lexrag_core::store::{ChunkRepository, DocumentRepository};
use lexrag_core::{
    Chunk, Document, DocumentStatus, Filters, Metadata, Port, RagError, Result, SearchHit,
};

/// Map a database error onto the taxonomy for `port`.
fn db_error(port: Port) -> impl Fn(sqlx::Error) -> RagError {
    move |err| {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return RagError::Input(format!("{port} constraint violated: {}", db.message()));
            }
            if db.is_foreign_key_violation() {
                return RagError::NotFound(format!("{port} reference: {}", db.message()));
            }
        }
        RagError::unavailable(port, err)
    }
}

/// `?, ?, ?` for an `IN (...)` clause of `n` values.
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

pub struct SqliteDocumentRepository {
    pool: SqlitePool,
}

impl SqliteDocumentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_document(row: &SqliteRow) -> Result<Document> {
    let status: String = row.get("status");
    let status: DocumentStatus = status
        .parse()
        .map_err(|e| RagError::unavailable(Port::DocumentStore, e))?;
    Ok(Document {
        id: Some(row.get("id")),
        title: row.get("title"),
        source_ref: row.get("source_ref"),
        uploaded_at: millis_to_datetime(row.get("uploaded_at")),
        status,
        status_changed_at: millis_to_datetime(row.get("status_changed_at")),
        error: row.get("error"),
    })
}

#[async_trait]
impl DocumentRepository for SqliteDocumentRepository {
    async fn add(&self, mut document: Document) -> Result<Document> {
        if let Some(id) = &document.id {
            return Err(RagError::Input(format!("document {id} is already persisted")));
        }
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO documents
                (id, title, source_ref, uploaded_at, status, status_changed_at, error)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&document.title)
        .bind(&document.source_ref)
        .bind(document.uploaded_at.timestamp_millis())
        .bind(document.status.as_str())
        .bind(document.status_changed_at.timestamp_millis())
        .bind(&document.error)
        .execute(&self.pool)
        .await
        .map_err(db_error(Port::DocumentStore))?;

        document.id = Some(id);
        Ok(document)
    }

    async fn get(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, title, source_ref, uploaded_at, status, status_changed_at, error FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error(Port::DocumentStore))?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn list(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT id, title, source_ref, uploaded_at, status, status_changed_at, error FROM documents ORDER BY uploaded_at ASC, rowid ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error(Port::DocumentStore))?;

        rows.iter().map(row_to_document).collect()
    }

    async fn update(&self, document: &Document) -> Result<()> {
        let id = document
            .id
            .as_deref()
            .ok_or_else(|| RagError::Input("cannot update a document without an id".into()))?;
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET title = ?, source_ref = ?, uploaded_at = ?, status = ?, status_changed_at = ?,
                error = ?
            WHERE id = ?
            "#,
        )
        .bind(&document.title)
        .bind(&document.source_ref)
        .bind(document.uploaded_at.timestamp_millis())
        .bind(document.status.as_str())
        .bind(document.status_changed_at.timestamp_millis())
        .bind(&document.error)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_error(Port::DocumentStore))?;

        if result.rows_affected() == 0 {
            return Err(RagError::NotFound(format!("document {id}")));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error(Port::DocumentStore))?;
        Ok(result.rows_affected() > 0)
    }
}

pub struct SqliteChunkRepository {
    pool: SqlitePool,
}

impl SqliteChunkRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_chunk(row: &SqliteRow) -> Chunk {
    let position: i64 = row.get("position");
    let embedding: Option<Vec<u8>> = row.get("embedding");
    Chunk {
        id: Some(row.get("id")),
        document_id: row.get("document_id"),
        position: position as usize,
        text: row.get("text"),
        hash: row.get("hash"),
        embedding: embedding.map(|blob| blob_to_vec(&blob)),
    }
}

#[async_trait]
impl ChunkRepository for SqliteChunkRepository {
    async fn add_many(&self, chunks: Vec<Chunk>) -> Result<Vec<Chunk>> {
        let err = db_error(Port::ChunkStore);
        let mut tx = self.pool.begin().await.map_err(&err)?;

        let mut added = Vec::with_capacity(chunks.len());
        for mut chunk in chunks {
            let id = Uuid::new_v4().to_string();
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, position, text, hash, embedding)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(&chunk.document_id)
            .bind(chunk.position as i64)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(chunk.embedding.as_deref().map(vec_to_blob))
            .execute(&mut *tx)
            .await
            .map_err(&err)?;

            chunk.id = Some(id);
            added.push(chunk);
        }

        // Dropping `tx` on an early return rolls the batch back.
        tx.commit().await.map_err(&err)?;
        Ok(added)
    }

    async fn list_by_document(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT id, document_id, position, text, hash, embedding FROM chunks WHERE document_id = ? ORDER BY position ASC",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error(Port::ChunkStore))?;

        Ok(rows.iter().map(row_to_chunk).collect())
    }

    async fn list_by_ids(&self, ids: &[String]) -> Result<Vec<Chunk>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id, document_id, position, text, hash, embedding FROM chunks WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(db_error(Port::ChunkStore))?;

        Ok(rows.iter().map(row_to_chunk).collect())
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(db_error(Port::ChunkStore))?;
        Ok(result.rows_affected() as usize)
    }
}

pub struct SqliteVectorIndex {
    pool: SqlitePool,
}

impl SqliteVectorIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn add_vectors(
        &self,
        vectors: &[Vec<f32>],
        metadatas: &[Metadata],
        ids: &[String],
    ) -> Result<()> {
        let Some(dims) = check_batch(vectors, metadatas, ids)? else {
            return Ok(());
        };

        let err = db_error(Port::VectorIndex);
        // Take the write lock before reading `dims`; a deferred read
        // snapshot cannot be upgraded once another writer has committed.
        let mut tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(&err)?;

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT dims FROM vectors ORDER BY seq ASC LIMIT 1")
                .fetch_optional(&mut *tx)
                .await
                .map_err(&err)?;
        if let Some(expected) = existing {
            if expected as usize != dims {
                return Err(RagError::DimensionMismatch {
                    expected: expected as usize,
                    actual: dims,
                });
            }
        }

        for ((vector, metadata), id) in vectors.iter().zip(metadatas).zip(ids) {
            let metadata_json = serde_json::to_string(metadata)
                .map_err(|e| RagError::unavailable(Port::VectorIndex, e))?;
            sqlx::query(
                r#"
                INSERT INTO vectors (id, dims, embedding, metadata_json)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    dims = excluded.dims,
                    embedding = excluded.embedding,
                    metadata_json = excluded.metadata_json
                "#,
            )
            .bind(id)
            .bind(dims as i64)
            .bind(vec_to_blob(vector))
            .bind(metadata_json)
            .execute(&mut *tx)
            .await
            .map_err(&err)?;
        }

        tx.commit().await.map_err(&err)?;
        Ok(())
    }

    async fn similarity_search(
        &self,
        vector: &[f32],
        top_k: usize,
        filters: &Filters,
    ) -> Result<Vec<SearchHit>> {
        check_filters(filters)?;
        let rows = sqlx::query("SELECT id, embedding, metadata_json FROM vectors ORDER BY seq ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error(Port::VectorIndex))?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let metadata_json: String = row.get("metadata_json");
            let metadata: Metadata = serde_json::from_str(&metadata_json).map_err(|e| {
                RagError::unavailable(
                    Port::VectorIndex,
                    anyhow!("corrupt metadata for vector {}: {e}", row.get::<String, _>("id")),
                )
            })?;
            if !matches_filters(&metadata, filters) {
                continue;
            }
            let blob: Vec<u8> = row.get("embedding");
            hits.push(SearchHit {
                id: row.get("id"),
                score: cosine_similarity(vector, &blob_to_vec(&blob)) as f64,
                metadata,
            });
        }

        Ok(rank_hits(hits, top_k))
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!("DELETE FROM vectors WHERE id IN ({})", placeholders(ids.len()));
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let result = query
            .execute(&self.pool)
            .await
            .map_err(db_error(Port::VectorIndex))?;
        Ok(result.rows_affected() as usize)
    }

    async fn dimension(&self) -> Result<Option<usize>> {
        let dims: Option<i64> =
            sqlx::query_scalar("SELECT dims FROM vectors ORDER BY seq ASC LIMIT 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error(Port::VectorIndex))?;
        Ok(dims.map(|d| d as usize))
    }

    async fn len(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vectors")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error(Port::VectorIndex))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }

    #[test]
    fn test_millis_roundtrip() {
        let now = Utc::now();
        let restored = millis_to_datetime(now.timestamp_millis());
        assert_eq!(restored.timestamp_millis(), now.timestamp_millis());
    }
}
