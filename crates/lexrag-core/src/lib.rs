//! # lexrag core
//!
//! Retrieval-augmented generation core for the lexrag legal-document
//! assistant: data models, the error taxonomy, the six port traits with
//! in-memory or deterministic implementations, and the orchestrator that
//! composes them.
//!
//! | Module | Port / role |
//! |--------|-------------|
//! | [`split`] | [`TextSplitter`](split::TextSplitter) |
//! | [`embedding`] | [`Embedder`](embedding::Embedder) |
//! | [`index`] | [`VectorIndex`](index::VectorIndex) |
//! | [`store`] | [`ChunkRepository`](store::ChunkRepository), [`DocumentRepository`](store::DocumentRepository) |
//! | [`generate`] | [`AnswerGenerator`](generate::AnswerGenerator) |
//! | [`pipeline`] | [`RagPipeline`](pipeline::RagPipeline) |
//!
//! This crate contains no database, HTTP, or filesystem I/O.

pub mod embedding;
pub mod error;
pub mod generate;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod split;
pub mod store;

pub use error::{IngestStage, Port, RagError, Result};
pub use models::{
    Answer, Chunk, Citation, Document, DocumentStatus, Filters, Metadata, SearchHit, SearchQuery,
};
pub use pipeline::{PipelineSettings, Ports, RagPipeline};
