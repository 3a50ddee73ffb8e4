//! Composition root: wires configured adapters into a [`RagPipeline`].

use anyhow::{bail, Result};
use sqlx::SqlitePool;
use std::sync::Arc;

use lexrag_core::split::{PackedSplitter, ParagraphSplitter, TextSplitter};
use lexrag_core::{PipelineSettings, Ports, RagPipeline};

use crate::config::{ChunkingConfig, Config};
use crate::embedding::create_embedder;
use crate::generation::create_generator;
use crate::sqlite_store::{SqliteChunkRepository, SqliteDocumentRepository, SqliteVectorIndex};

pub fn create_splitter(config: &ChunkingConfig) -> Result<Arc<dyn TextSplitter>> {
    match config.strategy.as_str() {
        "paragraph" => Ok(Arc::new(ParagraphSplitter::new(config.max_tokens))),
        "packed" => Ok(Arc::new(PackedSplitter::new(config.max_tokens))),
        other => bail!("Unknown chunking strategy: {}", other),
    }
}

/// Build the pipeline over SQLite storage and the configured model backends.
///
/// The pool must already be migrated.
pub fn build_pipeline(config: &Config, pool: SqlitePool) -> Result<RagPipeline> {
    let ports = Ports {
        splitter: create_splitter(&config.chunking)?,
        embedder: create_embedder(&config.embedding)?,
        index: Arc::new(SqliteVectorIndex::new(pool.clone())),
        chunks: Arc::new(SqliteChunkRepository::new(pool.clone())),
        documents: Arc::new(SqliteDocumentRepository::new(pool)),
        generator: create_generator(&config.generation)?,
    };

    let settings = PipelineSettings {
        chat_top_k: config.retrieval.chat_top_k,
        ingest_timeout: config.ingest.timeout(),
    };
    Ok(RagPipeline::new(ports, settings))
}
