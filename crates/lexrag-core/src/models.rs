//! Core data models used throughout lexrag.
//!
//! These types represent the documents, chunks, queries, and answers that
//! flow through the ingestion and chat pipeline. Ownership is one-way: a
//! [`Chunk`] references its parent [`Document`] by id, documents never hold
//! their chunks.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::embedding::content_hash;
use crate::error::{RagError, Result};

/// Metadata stored next to each vector in the index.
pub type Metadata = serde_json::Map<String, Value>;

/// Equality filters applied to index metadata before ranking.
pub type Filters = BTreeMap<String, Value>;

/// Number of results returned by [`SearchQuery`] when none is specified.
pub const DEFAULT_TOP_K: usize = 5;

/// Processing state of a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Complete,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Complete => "complete",
            DocumentStatus::Failed => "failed",
        }
    }

    /// Whether a document may move from `self` to `next`.
    ///
    /// The lifecycle only moves forward. The single way back is
    /// `failed → pending`, which starts a whole retry.
    pub fn can_transition_to(&self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Processing, Complete)
                | (Processing, Failed)
                | (Failed, Pending)
        )
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(DocumentStatus::Pending),
            "processing" => Ok(DocumentStatus::Processing),
            "complete" => Ok(DocumentStatus::Complete),
            "failed" => Ok(DocumentStatus::Failed),
            other => Err(RagError::Input(format!("unknown document status: {other}"))),
        }
    }
}

/// An uploaded document record. Content lives in its chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Assigned by the document store on first persistence.
    pub id: Option<String>,
    pub title: String,
    /// Where the original file lives (path, URL, object key).
    pub source_ref: String,
    pub uploaded_at: DateTime<Utc>,
    pub status: DocumentStatus,
    /// When `status` last changed. Stale-ingestion sweeps measure from here.
    pub status_changed_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl Document {
    /// A new, unpersisted document in `pending` state.
    pub fn new(title: impl Into<String>, source_ref: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            title: title.into(),
            source_ref: source_ref.into(),
            uploaded_at: now,
            status: DocumentStatus::Pending,
            status_changed_at: now,
            error: None,
        }
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn transition(&mut self, next: DocumentStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(RagError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.status_changed_at = Utc::now();
        if next != DocumentStatus::Failed {
            self.error = None;
        }
        Ok(())
    }

    /// Mark the document `failed` with a human-readable reason.
    ///
    /// Allowed from `pending` and `processing`; a document that already
    /// failed keeps its state and takes the newer message.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        if self.status != DocumentStatus::Failed {
            self.transition(DocumentStatus::Failed)?;
        }
        self.error = Some(message.into());
        Ok(())
    }

    /// `true` once the document reached `complete` or `failed`.
    pub fn is_settled(&self) -> bool {
        matches!(
            self.status,
            DocumentStatus::Complete | DocumentStatus::Failed
        )
    }
}

/// A contiguous slice of a document's text.
///
/// Chunks are immutable once stored; reprocessing a document replaces its
/// chunks instead of editing them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Assigned by the chunk store.
    pub id: Option<String>,
    pub document_id: String,
    /// Zero-based reconstruction order within the document.
    pub position: usize,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    pub fn new(document_id: impl Into<String>, position: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id: None,
            document_id: document_id.into(),
            position,
            hash: content_hash(&text),
            text,
            embedding: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Key of this chunk's vector in the index.
    pub fn vector_id(&self) -> String {
        vector_id(&self.document_id, self.position)
    }
}

/// Deterministic vector index key for the chunk at `position` of a document.
pub fn vector_id(document_id: &str, position: usize) -> String {
    format!("{document_id}_{position}")
}

/// A similarity search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    #[serde(default)]
    pub filters: Filters,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            filters: Filters::new(),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_k < 1 {
            return Err(RagError::Input("top_k must be >= 1".to_string()));
        }
        if self.text.trim().is_empty() {
            return Err(RagError::Input("query text must not be empty".to_string()));
        }
        Ok(())
    }
}

/// One ranked result from the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Vector index key, `"{document_id}_{position}"` for ingested chunks.
    pub id: String,
    /// Higher is more similar.
    pub score: f64,
    pub metadata: Metadata,
}

/// A reference from an answer back to the chunk that informed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub vector_id: String,
    pub chunk_id: String,
    pub document_id: String,
    pub score: f64,
}

/// Generated text plus citations in retrieval rank order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_document_is_pending_without_id() {
        let doc = Document::new("Lease", "uploads/lease.txt");
        assert_eq!(doc.id, None);
        assert_eq!(doc.status, DocumentStatus::Pending);
        assert!(!doc.is_settled());
    }

    #[test]
    fn test_forward_transitions() {
        let mut doc = Document::new("Lease", "lease.txt");
        doc.transition(DocumentStatus::Processing).unwrap();
        doc.transition(DocumentStatus::Complete).unwrap();
        assert!(doc.is_settled());
    }

    #[test]
    fn test_complete_is_terminal() {
        let mut doc = Document::new("Lease", "lease.txt");
        doc.transition(DocumentStatus::Processing).unwrap();
        doc.transition(DocumentStatus::Complete).unwrap();
        let err = doc.transition(DocumentStatus::Pending).unwrap_err();
        assert!(matches!(err, RagError::InvalidTransition { .. }));
        assert!(doc.fail("late").is_err());
    }

    #[test]
    fn test_failed_can_only_retry_whole() {
        let mut doc = Document::new("Lease", "lease.txt");
        doc.transition(DocumentStatus::Processing).unwrap();
        doc.fail("index down").unwrap();
        assert_eq!(doc.error.as_deref(), Some("index down"));
        assert!(doc.transition(DocumentStatus::Processing).is_err());
        doc.transition(DocumentStatus::Pending).unwrap();
        assert_eq!(doc.error, None);
    }

    #[test]
    fn test_transition_refreshes_status_changed_at() {
        let mut doc = Document::new("Lease", "lease.txt");
        doc.uploaded_at -= chrono::Duration::hours(3);
        doc.status_changed_at -= chrono::Duration::hours(3);
        doc.transition(DocumentStatus::Processing).unwrap();
        assert!(doc.status_changed_at > doc.uploaded_at + chrono::Duration::hours(2));
    }

    #[test]
    fn test_status_roundtrip_str() {
        for status in [
            DocumentStatus::Pending,
            DocumentStatus::Processing,
            DocumentStatus::Complete,
            DocumentStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<DocumentStatus>().unwrap(), status);
        }
        assert!("done".parse::<DocumentStatus>().is_err());
    }

    #[test]
    fn test_vector_id_format() {
        let chunk = Chunk::new("doc-9", 4, "text");
        assert_eq!(chunk.vector_id(), "doc-9_4");
        assert_eq!(vector_id("a_b", 0), "a_b_0");
    }

    #[test]
    fn test_chunk_hash_is_content_hash() {
        let a = Chunk::new("d", 0, "same text");
        let b = Chunk::new("e", 3, "same text");
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.hash.len(), 64);
    }

    #[test]
    fn test_search_query_validation() {
        assert!(SearchQuery::new("breach").validate().is_ok());
        assert!(matches!(
            SearchQuery::new("breach").with_top_k(0).validate(),
            Err(RagError::Input(_))
        ));
        assert!(matches!(
            SearchQuery::new("   ").validate(),
            Err(RagError::Input(_))
        ));
    }

    #[test]
    fn test_search_query_defaults() {
        let q: SearchQuery = serde_json::from_str(r#"{"text": "notice period"}"#).unwrap();
        assert_eq!(q.top_k, DEFAULT_TOP_K);
        assert!(q.filters.is_empty());
    }
}
