//! In-memory repositories for testing and single-process use.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use anyhow::anyhow;
use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{Port, RagError, Result};
use crate::models::{Chunk, Document};

use super::{ChunkRepository, DocumentRepository};

fn poisoned(port: Port) -> RagError {
    RagError::unavailable(port, anyhow!("{port} lock poisoned"))
}

/// In-memory [`ChunkRepository`].
pub struct InMemoryChunkRepository {
    chunks: RwLock<Vec<Chunk>>,
}

impl InMemoryChunkRepository {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryChunkRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkRepository for InMemoryChunkRepository {
    async fn add_many(&self, chunks: Vec<Chunk>) -> Result<Vec<Chunk>> {
        let mut stored = self
            .chunks
            .write()
            .map_err(|_| poisoned(Port::ChunkStore))?;

        // Validate the whole batch before touching the store.
        let mut taken: HashSet<(String, usize)> = stored
            .iter()
            .map(|c| (c.document_id.clone(), c.position))
            .collect();
        for chunk in &chunks {
            if !taken.insert((chunk.document_id.clone(), chunk.position)) {
                return Err(RagError::Input(format!(
                    "duplicate chunk position {} for document {}",
                    chunk.position, chunk.document_id
                )));
            }
        }

        let added: Vec<Chunk> = chunks
            .into_iter()
            .map(|mut chunk| {
                chunk.id = Some(Uuid::new_v4().to_string());
                chunk
            })
            .collect();
        stored.extend(added.iter().cloned());
        Ok(added)
    }

    async fn list_by_document(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let stored = self.chunks.read().map_err(|_| poisoned(Port::ChunkStore))?;
        let mut chunks: Vec<Chunk> = stored
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.position);
        Ok(chunks)
    }

    async fn list_by_ids(&self, ids: &[String]) -> Result<Vec<Chunk>> {
        let stored = self.chunks.read().map_err(|_| poisoned(Port::ChunkStore))?;
        Ok(stored
            .iter()
            .filter(|c| c.id.as_ref().is_some_and(|id| ids.contains(id)))
            .cloned()
            .collect())
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<usize> {
        let mut stored = self
            .chunks
            .write()
            .map_err(|_| poisoned(Port::ChunkStore))?;
        let before = stored.len();
        stored.retain(|c| c.document_id != document_id);
        Ok(before - stored.len())
    }
}

/// In-memory [`DocumentRepository`].
pub struct InMemoryDocumentRepository {
    docs: RwLock<HashMap<String, Document>>,
}

impl InMemoryDocumentRepository {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryDocumentRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn add(&self, mut document: Document) -> Result<Document> {
        if let Some(id) = &document.id {
            return Err(RagError::Input(format!("document {id} is already persisted")));
        }
        let id = Uuid::new_v4().to_string();
        document.id = Some(id.clone());
        self.docs
            .write()
            .map_err(|_| poisoned(Port::DocumentStore))?
            .insert(id, document.clone());
        Ok(document)
    }

    async fn get(&self, id: &str) -> Result<Option<Document>> {
        let docs = self
            .docs
            .read()
            .map_err(|_| poisoned(Port::DocumentStore))?;
        Ok(docs.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Document>> {
        let docs = self
            .docs
            .read()
            .map_err(|_| poisoned(Port::DocumentStore))?;
        let mut all: Vec<Document> = docs.values().cloned().collect();
        all.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn update(&self, document: &Document) -> Result<()> {
        let id = document
            .id
            .as_deref()
            .ok_or_else(|| RagError::Input("cannot update a document without an id".into()))?;
        let mut docs = self
            .docs
            .write()
            .map_err(|_| poisoned(Port::DocumentStore))?;
        match docs.get_mut(id) {
            Some(slot) => {
                *slot = document.clone();
                Ok(())
            }
            None => Err(RagError::NotFound(format!("document {id}"))),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut docs = self
            .docs
            .write()
            .map_err(|_| poisoned(Port::DocumentStore))?;
        Ok(docs.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentStatus;

    #[tokio::test]
    async fn test_add_many_assigns_ids_and_orders_by_position() {
        let repo = InMemoryChunkRepository::new();
        let added = repo
            .add_many(vec![
                Chunk::new("d1", 1, "second"),
                Chunk::new("d1", 0, "first"),
                Chunk::new("d2", 0, "other"),
            ])
            .await
            .unwrap();
        assert!(added.iter().all(|c| c.id.is_some()));

        let listed = repo.list_by_document("d1").await.unwrap();
        let texts: Vec<&str> = listed.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_add_many_is_atomic() {
        let repo = InMemoryChunkRepository::new();
        repo.add_many(vec![Chunk::new("d1", 0, "a")]).await.unwrap();

        let err = repo
            .add_many(vec![Chunk::new("d1", 1, "b"), Chunk::new("d1", 0, "dup")])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Input(_)));
        assert_eq!(repo.list_by_document("d1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_by_ids_omits_unknown() {
        let repo = InMemoryChunkRepository::new();
        let added = repo
            .add_many(vec![Chunk::new("d", 0, "a"), Chunk::new("d", 1, "b")])
            .await
            .unwrap();
        let wanted = vec![added[1].id.clone().unwrap(), "missing".to_string()];
        let found = repo.list_by_ids(&wanted).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "b");
    }

    #[tokio::test]
    async fn test_delete_by_document() {
        let repo = InMemoryChunkRepository::new();
        repo.add_many(vec![Chunk::new("d", 0, "a"), Chunk::new("e", 0, "b")])
            .await
            .unwrap();
        assert_eq!(repo.delete_by_document("d").await.unwrap(), 1);
        assert!(repo.list_by_document("d").await.unwrap().is_empty());
        assert_eq!(repo.list_by_document("e").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_document_add_get_update_delete() {
        let repo = InMemoryDocumentRepository::new();
        let mut doc = repo.add(Document::new("Lease", "lease.txt")).await.unwrap();
        let id = doc.id.clone().unwrap();

        doc.transition(DocumentStatus::Processing).unwrap();
        repo.update(&doc).await.unwrap();
        let fetched = repo.get(&id).await.unwrap().unwrap();
        assert_eq!(fetched.status, DocumentStatus::Processing);

        assert!(repo.delete(&id).await.unwrap());
        assert!(!repo.delete(&id).await.unwrap());
        assert_eq!(repo.get(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_document_add_rejects_persisted() {
        let repo = InMemoryDocumentRepository::new();
        let doc = repo.add(Document::new("Lease", "lease.txt")).await.unwrap();
        assert!(matches!(repo.add(doc).await, Err(RagError::Input(_))));
    }

    #[tokio::test]
    async fn test_update_unknown_is_not_found() {
        let repo = InMemoryDocumentRepository::new();
        let mut doc = Document::new("Lease", "lease.txt");
        doc.id = Some("ghost".into());
        assert!(matches!(
            repo.update(&doc).await,
            Err(RagError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_oldest_first() {
        let repo = InMemoryDocumentRepository::new();
        let mut older = Document::new("Old", "old.txt");
        older.uploaded_at -= chrono::Duration::hours(1);
        repo.add(Document::new("New", "new.txt")).await.unwrap();
        repo.add(older).await.unwrap();
        let titles: Vec<String> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.title)
            .collect();
        assert_eq!(titles, vec!["Old", "New"]);
    }
}
