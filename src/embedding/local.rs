//! On-device embeddings via fastembed.
//!
//! Models are downloaded on first use from Hugging Face and cached. After
//! that no network calls are made. Inference is blocking and runs on the
//! tokio blocking pool.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use lexrag_core::embedding::{Embedder, LazyEmbedder};
use lexrag_core::{Port, RagError};

use crate::config::EmbeddingConfig;

const DEFAULT_MODEL: &str = "all-minilm-l6-v2";

pub struct LocalEmbedder {
    model: Arc<Mutex<fastembed::TextEmbedding>>,
    model_name: String,
    dims: usize,
    batch_size: usize,
}

impl LocalEmbedder {
    /// Download (if needed) and load the model. Blocks a pool thread.
    pub async fn load(model_name: &str, dims: usize, batch_size: usize) -> Result<Self> {
        let fastembed_model = config_to_fastembed_model(model_name)?;
        let model = tokio::task::spawn_blocking(move || {
            fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
            )
            .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))
        })
        .await
        .context("joining local model initialisation task")??;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            model_name: model_name.to_string(),
            dims,
            batch_size,
        })
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dims
    }

    async fn embed_documents(&self, texts: &[String]) -> lexrag_core::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.model.clone();
        let texts = texts.to_vec();
        let batch_size = self.batch_size;

        tokio::task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|_| anyhow!("local embedding model lock poisoned"))?;
            guard
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow!("Local embedding failed: {}", e))
        })
        .await
        .map_err(|e| RagError::unavailable(Port::Embedder, e))?
        .map_err(|e| RagError::unavailable(Port::Embedder, e))
    }
}

/// Model name and dimensionality for `config`, falling back to known model sizes.
fn resolve_local_model(config: &EmbeddingConfig) -> (String, usize) {
    let model_name = config
        .model
        .clone()
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let dims = config.dims.unwrap_or(match model_name.as_str() {
        "all-minilm-l6-v2" => 384,
        "bge-small-en-v1.5" => 384,
        "bge-base-en-v1.5" => 768,
        "bge-large-en-v1.5" => 1024,
        "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
        "multilingual-e5-small" => 384,
        "multilingual-e5-base" => 768,
        "multilingual-e5-large" => 1024,
        _ => 384,
    });

    (model_name, dims)
}

fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => bail!("Unknown local embedding model: '{}'", other),
    }
}

/// A [`LazyEmbedder`] that loads the configured local model on first use.
pub fn lazy_local_embedder(config: &EmbeddingConfig) -> Result<LazyEmbedder<LocalEmbedder>> {
    let (model_name, dims) = resolve_local_model(config);
    // Reject unknown names now rather than on the first request.
    config_to_fastembed_model(&model_name)?;
    let batch_size = config.batch_size.max(1);

    let name = model_name.clone();
    Ok(LazyEmbedder::new(model_name, dims, move || {
        let name = name.clone();
        async move {
            LocalEmbedder::load(&name, dims, batch_size)
                .await
                .map_err(|e| RagError::unavailable(Port::Embedder, e))
        }
    }))
}
