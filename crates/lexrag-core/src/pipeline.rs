//! RAG orchestrator: ingestion, search, and chat over injected ports.
//!
//! [`RagPipeline`] owns no state of its own. Everything it reads or writes
//! lives behind the [`Ports`] handed to [`RagPipeline::new`], so the same
//! pipeline runs against in-memory fakes in tests and SQLite plus HTTP
//! adapters in the application.
//!
//! # Ingestion
//!
//! 1. Split the text and embed every part in one batch. Vector count and
//!    dimensionality are checked against the embedder and the index.
//! 2. Persist the [`Document`] (`pending`), then move it to `processing`.
//! 3. Persist the chunks, then upsert one vector per chunk under
//!    `"{document_id}_{position}"`. The vector metadata records the chunk
//!    store id under [`CHUNK_ID_KEY`].
//! 4. Move the document to `complete`.
//!
//! Any failure after step 2 marks the document `failed` with the error text
//! before the error is returned. A vector write that fails after the chunk
//! write landed surfaces as [`RagError::PartialIngestion`].
//!
//! # Chat
//!
//! Search with `chat_top_k`, translate each hit to its chunk through the
//! indexed `chunk_id`, fetch the chunks, and hand them to the generator in
//! rank order. Citations follow the same order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::embedding::Embedder;
use crate::error::{IngestStage, Port, RagError, Result};
use crate::generate::AnswerGenerator;
use crate::index::{check_filters, VectorIndex, CHUNK_ID_KEY};
use crate::models::{
    Answer, Chunk, Citation, Document, DocumentStatus, Metadata, SearchHit, SearchQuery,
};
use crate::split::TextSplitter;
use crate::store::{ChunkRepository, DocumentRepository};

/// Retrieval breadth used by [`RagPipeline::chat`] unless configured.
pub const DEFAULT_CHAT_TOP_K: usize = 3;

/// The collaborators a [`RagPipeline`] is composed from.
#[derive(Clone)]
pub struct Ports {
    pub splitter: Arc<dyn TextSplitter>,
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub chunks: Arc<dyn ChunkRepository>,
    pub documents: Arc<dyn DocumentRepository>,
    pub generator: Arc<dyn AnswerGenerator>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Number of chunks retrieved as context for each chat question.
    pub chat_top_k: usize,
    /// Deadline for the write phase of one ingestion. `None` waits forever.
    pub ingest_timeout: Option<Duration>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chat_top_k: DEFAULT_CHAT_TOP_K,
            ingest_timeout: None,
        }
    }
}

/// Split parts and their vectors, ready to be written.
struct Prepared {
    parts: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

pub struct RagPipeline {
    ports: Ports,
    settings: PipelineSettings,
}

impl RagPipeline {
    pub fn new(ports: Ports, settings: PipelineSettings) -> Self {
        Self { ports, settings }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Split, embed, and persist a document. Returns it with its final id
    /// and `complete` status.
    #[instrument(skip(self, text), fields(len = text.len()))]
    pub async fn ingest_document(
        &self,
        title: &str,
        source_ref: &str,
        text: &str,
    ) -> Result<Document> {
        let prepared = self.prepare(text).await?;
        let document = self
            .ports
            .documents
            .add(Document::new(title, source_ref))
            .await?;
        self.run_ingestion(document, prepared).await
    }

    /// Embed the query and return the nearest indexed chunks, best first.
    #[instrument(skip(self, query), fields(top_k = query.top_k))]
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>> {
        query.validate()?;
        check_filters(&query.filters)?;

        let vector = self.ports.embedder.embed_query(&query.text).await?;
        self.check_index_dimension(vector.len()).await?;
        let hits = self
            .ports
            .index
            .similarity_search(&vector, query.top_k, &query.filters)
            .await?;
        debug!(hits = hits.len(), "similarity search complete");
        Ok(hits)
    }

    /// Answer a question from the most similar chunks, with citations in
    /// rank order.
    #[instrument(skip(self))]
    pub async fn chat(&self, question: &str) -> Result<Answer> {
        if question.trim().is_empty() {
            return Err(RagError::Input("question must not be empty".to_string()));
        }

        let query = SearchQuery::new(question).with_top_k(self.settings.chat_top_k);
        let hits = self.search(&query).await?;
        let chunk_ids = hits
            .iter()
            .map(chunk_id_of)
            .collect::<Result<Vec<String>>>()?;
        let context = self.chunks_in_order(&chunk_ids).await?;

        let text = self
            .ports
            .generator
            .generate_answer(question, &context)
            .await?;
        if text.trim().is_empty() {
            return Err(RagError::unavailable(
                Port::Generator,
                anyhow!("generator returned an empty answer"),
            ));
        }

        let citations: Vec<Citation> = hits
            .into_iter()
            .zip(chunk_ids)
            .zip(&context)
            .map(|((hit, chunk_id), chunk)| Citation {
                vector_id: hit.id,
                chunk_id,
                document_id: chunk.document_id.clone(),
                score: hit.score,
            })
            .collect();
        info!(citations = citations.len(), "answered question");
        Ok(Answer { text, citations })
    }

    /// Re-run a `failed` ingestion from scratch with the document's text.
    ///
    /// Previous chunks and vectors are purged and the document moves back
    /// to `pending` before the write phase runs again.
    #[instrument(skip(self, text))]
    pub async fn retry_ingestion(&self, document_id: &str, text: &str) -> Result<Document> {
        let mut document = self.require_document(document_id).await?;
        if document.status != DocumentStatus::Failed {
            return Err(RagError::InvalidTransition {
                from: document.status,
                to: DocumentStatus::Pending,
            });
        }

        let prepared = self.prepare(text).await?;
        self.purge(document_id).await?;
        document.transition(DocumentStatus::Pending)?;
        self.ports.documents.update(&document).await?;
        info!("retrying ingestion");
        self.run_ingestion(document, prepared).await
    }

    /// Remove a document with its vectors and chunks. Returns `false` when
    /// the document does not exist.
    #[instrument(skip(self))]
    pub async fn delete_document(&self, document_id: &str) -> Result<bool> {
        if self.ports.documents.get(document_id).await?.is_none() {
            return Ok(false);
        }
        self.purge(document_id).await?;
        let removed = self.ports.documents.delete(document_id).await?;
        info!(removed, "document deleted");
        Ok(removed)
    }

    /// Mark documents that have sat in `pending` or `processing` for longer
    /// than `max_age` (measured from their last status change) as `failed`. Returns the documents that were changed.
    #[instrument(skip(self))]
    pub async fn fail_stale_documents(&self, max_age: Duration) -> Result<Vec<Document>> {
        let max_age_delta = chrono::Duration::from_std(max_age)
            .map_err(|e| RagError::Input(format!("max_age out of range: {e}")))?;
        let cutoff = Utc::now() - max_age_delta;

        let mut failed = Vec::new();
        for mut document in self.ports.documents.list().await? {
            if document.is_settled() || document.status_changed_at > cutoff {
                continue;
            }
            document.fail(format!(
                "ingestion did not finish within {}s",
                max_age.as_secs()
            ))?;
            self.ports.documents.update(&document).await?;
            warn!(document_id = ?document.id, "stale ingestion marked failed");
            failed.push(document);
        }
        Ok(failed)
    }

    pub async fn get_document(&self, document_id: &str) -> Result<Option<Document>> {
        self.ports.documents.get(document_id).await
    }

    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        self.ports.documents.list().await
    }

    /// Chunks of a document in position order.
    pub async fn document_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        self.ports.chunks.list_by_document(document_id).await
    }

    async fn prepare(&self, text: &str) -> Result<Prepared> {
        let parts = self.ports.splitter.split(text);
        if parts.is_empty() {
            debug!("splitter produced no parts");
            return Ok(Prepared {
                parts,
                vectors: Vec::new(),
            });
        }

        let vectors = self.ports.embedder.embed_documents(&parts).await?;
        if vectors.len() != parts.len() {
            return Err(RagError::unavailable(
                Port::Embedder,
                anyhow!(
                    "embedder returned {} vectors for {} texts",
                    vectors.len(),
                    parts.len()
                ),
            ));
        }
        let dims = self.ports.embedder.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(RagError::DimensionMismatch {
                expected: dims,
                actual: bad.len(),
            });
        }
        self.check_index_dimension(dims).await?;
        debug!(parts = parts.len(), dims, "parts embedded");
        Ok(Prepared { parts, vectors })
    }

    async fn check_index_dimension(&self, dims: usize) -> Result<()> {
        match self.ports.index.dimension().await? {
            Some(expected) if expected != dims => Err(RagError::DimensionMismatch {
                expected,
                actual: dims,
            }),
            _ => Ok(()),
        }
    }

    /// Drive a persisted `pending` document to `complete`, or record the
    /// failure on it.
    async fn run_ingestion(&self, mut document: Document, prepared: Prepared) -> Result<Document> {
        let document_id = document.id.clone().ok_or_else(|| {
            RagError::unavailable(
                Port::DocumentStore,
                anyhow!("document store returned a document without an id"),
            )
        })?;

        match self.process(&mut document, &document_id, prepared).await {
            Ok(chunks) => {
                info!(%document_id, chunks, "document ingested");
                Ok(document)
            }
            Err(err) => {
                self.record_failure(&mut document, &err).await;
                Err(err)
            }
        }
    }

    async fn process(
        &self,
        document: &mut Document,
        document_id: &str,
        prepared: Prepared,
    ) -> Result<usize> {
        document.transition(DocumentStatus::Processing)?;
        self.ports.documents.update(document).await?;

        let write = self.write_chunks(document, document_id, prepared);
        let written = match self.settings.ingest_timeout {
            Some(after) => tokio::time::timeout(after, write)
                .await
                .map_err(|_| RagError::Timeout {
                    document_id: document_id.to_string(),
                    after,
                })??,
            None => write.await?,
        };

        let mut done = document.clone();
        done.transition(DocumentStatus::Complete)?;
        self.ports.documents.update(&done).await?;
        *document = done;
        Ok(written)
    }

    async fn write_chunks(
        &self,
        document: &Document,
        document_id: &str,
        prepared: Prepared,
    ) -> Result<usize> {
        let Prepared { parts, vectors } = prepared;
        if parts.is_empty() {
            return Ok(0);
        }

        let chunks: Vec<Chunk> = parts
            .into_iter()
            .zip(&vectors)
            .enumerate()
            .map(|(position, (text, vector))| {
                Chunk::new(document_id, position, text).with_embedding(vector.clone())
            })
            .collect();
        let stored = self.ports.chunks.add_many(chunks).await?;
        if stored.len() != vectors.len() {
            return Err(RagError::unavailable(
                Port::ChunkStore,
                anyhow!("stored {} chunks, expected {}", stored.len(), vectors.len()),
            ));
        }
        debug!(count = stored.len(), "chunks persisted");

        let mut ids = Vec::with_capacity(stored.len());
        let mut metadatas = Vec::with_capacity(stored.len());
        for chunk in &stored {
            let chunk_id = chunk.id.clone().ok_or_else(|| {
                RagError::unavailable(
                    Port::ChunkStore,
                    anyhow!("chunk store returned a chunk without an id"),
                )
            })?;
            ids.push(chunk.vector_id());
            metadatas.push(chunk_metadata(document, chunk, chunk_id));
        }

        self.ports
            .index
            .add_vectors(&vectors, &metadatas, &ids)
            .await
            .map_err(|source| RagError::PartialIngestion {
                document_id: document_id.to_string(),
                stage: IngestStage::VectorIndex,
                source: Box::new(source),
            })?;
        debug!(count = ids.len(), "vectors indexed");
        Ok(stored.len())
    }

    async fn record_failure(&self, document: &mut Document, err: &RagError) {
        warn!(document_id = ?document.id, error = %err, "ingestion failed");
        if let Err(e) = document.fail(err.to_string()) {
            warn!(error = %e, "could not mark document failed");
            return;
        }
        if let Err(e) = self.ports.documents.update(document).await {
            warn!(error = %e, "could not persist ingestion failure");
        }
    }

    /// Delete the vectors and chunks of a document.
    async fn purge(&self, document_id: &str) -> Result<()> {
        let chunks = self.ports.chunks.list_by_document(document_id).await?;
        if chunks.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = chunks.iter().map(Chunk::vector_id).collect();
        let vectors = self.ports.index.delete(&ids).await?;
        let removed = self.ports.chunks.delete_by_document(document_id).await?;
        debug!(vectors, chunks = removed, "previous ingestion purged");
        Ok(())
    }

    async fn require_document(&self, document_id: &str) -> Result<Document> {
        self.ports
            .documents
            .get(document_id)
            .await?
            .ok_or_else(|| RagError::NotFound(format!("document {document_id}")))
    }

    /// Fetch chunks by id and return them in the order of `ids`.
    async fn chunks_in_order(&self, ids: &[String]) -> Result<Vec<Chunk>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let by_id: HashMap<String, Chunk> = self
            .ports
            .chunks
            .list_by_ids(ids)
            .await?
            .into_iter()
            .filter_map(|chunk| chunk.id.clone().map(|id| (id, chunk)))
            .collect();
        ids.iter()
            .map(|id| {
                by_id
                    .get(id)
                    .cloned()
                    .ok_or_else(|| RagError::NotFound(format!("chunk {id}")))
            })
            .collect()
    }
}

fn chunk_metadata(document: &Document, chunk: &Chunk, chunk_id: String) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(CHUNK_ID_KEY.to_string(), Value::String(chunk_id));
    metadata.insert(
        "document_id".to_string(),
        Value::String(chunk.document_id.clone()),
    );
    metadata.insert("position".to_string(), Value::from(chunk.position));
    metadata.insert("title".to_string(), Value::String(document.title.clone()));
    metadata.insert(
        "source_ref".to_string(),
        Value::String(document.source_ref.clone()),
    );
    metadata.insert("content_hash".to_string(), Value::String(chunk.hash.clone()));
    metadata
}

/// Chunk store id recorded for a hit at write time.
fn chunk_id_of(hit: &SearchHit) -> Result<String> {
    hit.metadata
        .get(CHUNK_ID_KEY)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RagError::NotFound(format!("no chunk mapping for vector {}", hit.id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chunk_id_comes_from_metadata_not_vector_id() {
        let mut metadata = Metadata::new();
        metadata.insert(CHUNK_ID_KEY.into(), json!("c-42"));
        let hit = SearchHit {
            id: "doc_7".into(),
            score: 0.9,
            metadata,
        };
        assert_eq!(chunk_id_of(&hit).unwrap(), "c-42");

        let unmapped = SearchHit {
            id: "doc_7".into(),
            score: 0.9,
            metadata: Metadata::new(),
        };
        assert!(matches!(chunk_id_of(&unmapped), Err(RagError::NotFound(_))));
    }

    #[test]
    fn test_chunk_metadata_keys_are_filterable() {
        let mut document = Document::new("Lease", "lease.txt");
        document.id = Some("d1".into());
        let chunk = Chunk::new("d1", 2, "Rent is due monthly.");
        let metadata = chunk_metadata(&document, &chunk, "c1".into());
        assert_eq!(metadata["position"], json!(2));
        assert_eq!(metadata["title"], json!("Lease"));
        for key in crate::index::FILTERABLE_KEYS {
            assert!(metadata.contains_key(*key), "missing {key}");
        }
    }

    #[test]
    fn test_default_settings() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.chat_top_k, 3);
        assert_eq!(settings.ingest_timeout, None);
    }
}
