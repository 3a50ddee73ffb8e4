//! Error taxonomy for the RAG core.
//!
//! Every port returns [`RagError`] so the orchestrator can propagate
//! failures without losing which collaborator produced them. Adapters
//! wrap their backend errors with [`RagError::unavailable`].

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::models::DocumentStatus;

/// Result alias used by every port and by the orchestrator.
pub type Result<T> = std::result::Result<T, RagError>;

/// The collaborator a failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    Embedder,
    VectorIndex,
    ChunkStore,
    DocumentStore,
    Generator,
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Port::Embedder => "embedder",
            Port::VectorIndex => "vector index",
            Port::ChunkStore => "chunk store",
            Port::DocumentStore => "document store",
            Port::Generator => "answer generator",
        };
        f.write_str(name)
    }
}

/// The ingestion write that failed after an earlier write succeeded.
///
/// Chunks are always persisted before vectors, so only the vector write
/// can fail with the chunk write already committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    VectorIndex,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestStage::VectorIndex => f.write_str("vector index write"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RagError {
    /// Malformed request, rejected before any port is called.
    #[error("invalid input: {0}")]
    Input(String),

    /// A port's backing resource (model, index, store) failed.
    #[error("{port} unavailable: {source:#}")]
    Unavailable {
        port: Port,
        #[source]
        source: anyhow::Error,
    },

    /// One ingestion write landed and the other did not.
    #[error("partial ingestion of document {document_id}: {stage} failed: {source}")]
    PartialIngestion {
        document_id: String,
        stage: IngestStage,
        #[source]
        source: Box<RagError>,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid document status transition: {from} -> {to}")]
    InvalidTransition {
        from: DocumentStatus,
        to: DocumentStatus,
    },

    #[error("ingestion of document {document_id} timed out after {after:?}")]
    Timeout {
        document_id: String,
        after: Duration,
    },
}

impl RagError {
    /// Wrap a backend failure as [`RagError::Unavailable`] for `port`.
    pub fn unavailable(port: Port, source: impl Into<anyhow::Error>) -> Self {
        RagError::Unavailable {
            port,
            source: source.into(),
        }
    }

    /// The port that failed, when the error came from a collaborator.
    pub fn port(&self) -> Option<Port> {
        match self {
            RagError::Unavailable { port, .. } => Some(*port),
            RagError::PartialIngestion { source, .. } => source.port(),
            _ => None,
        }
    }
}
