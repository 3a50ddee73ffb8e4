//! Chunk and document repository ports.
//!
//! [`ChunkRepository`] and [`DocumentRepository`] define the persistence
//! operations the orchestrator needs. Both assign ids on insert; callers
//! hand in entities with `id: None` and get the stored copy back.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//! Cascade deletion of a document's chunks is the backend's concern: the
//! SQLite backend uses a foreign key, the in-memory one does not cascade.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Chunk, Document};

/// Persistence for [`Chunk`]s.
#[async_trait]
pub trait ChunkRepository: Send + Sync {
    /// Persist a batch atomically and return it with ids assigned.
    ///
    /// Either every chunk becomes visible or none does. A `(document_id,
    /// position)` pair that already exists, or repeats inside the batch,
    /// fails the whole batch.
    async fn add_many(&self, chunks: Vec<Chunk>) -> Result<Vec<Chunk>>;

    /// All chunks of a document in ascending position order.
    async fn list_by_document(&self, document_id: &str) -> Result<Vec<Chunk>>;

    /// One entry per found id, in no particular order. Unknown ids are omitted.
    async fn list_by_ids(&self, ids: &[String]) -> Result<Vec<Chunk>>;

    /// Remove every chunk of a document and return how many were removed.
    async fn delete_by_document(&self, document_id: &str) -> Result<usize>;
}

/// Persistence for [`Document`] records.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Insert a new document and return it with its id assigned.
    async fn add(&self, document: Document) -> Result<Document>;

    async fn get(&self, id: &str) -> Result<Option<Document>>;

    /// Every document, oldest upload first.
    async fn list(&self) -> Result<Vec<Document>>;

    /// Overwrite a stored document. Unknown ids are `NotFound`.
    async fn update(&self, document: &Document) -> Result<()>;

    /// Returns `false` when the id was not stored.
    async fn delete(&self, id: &str) -> Result<bool>;
}
