//! TOML configuration for the lexrag application.
//!
//! Every section except `[db]` is optional and falls back to the defaults
//! below. [`load_config`] parses and validates the file; nothing else in
//! the crate reads configuration from the environment except API keys.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// `paragraph` (one chunk per paragraph) or `packed`.
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_strategy() -> String {
    "paragraph".to_string()
}
fn default_max_tokens() -> usize {
    700
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_chat_top_k")]
    pub chat_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            chat_top_k: default_chat_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    lexrag_core::models::DEFAULT_TOP_K
}
fn default_chat_top_k() -> usize {
    lexrag_core::pipeline::DEFAULT_CHAT_TOP_K
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Deadline for one ingestion's writes. `0` disables it.
    #[serde(default = "default_ingest_timeout_secs")]
    pub timeout_secs: u64,
    /// Age after which `sweep` fails unfinished documents.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    /// File extensions picked up when ingesting a directory.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_ingest_timeout_secs(),
            stale_after_secs: default_stale_after_secs(),
            extensions: default_extensions(),
        }
    }
}

impl IngestConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

fn default_ingest_timeout_secs() -> u64 {
    120
}
fn default_stale_after_secs() -> u64 {
    3600
}
fn default_extensions() -> Vec<String> {
    vec!["txt".to_string(), "md".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `hashed`, `openai`, `ollama`, or `local`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL; defaults per provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: Some(DEFAULT_HASHED_DIMS),
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_embedding_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

/// Vector width of the `hashed` provider when `dims` is omitted.
pub const DEFAULT_HASHED_DIMS: usize = 256;

fn default_embedding_provider() -> String {
    "hashed".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `extractive`, `openai`, or `ollama`.
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            url: None,
            temperature: 0.0,
            max_retries: default_generation_retries(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn default_generation_provider() -> String {
    "extractive".to_string()
}
fn default_generation_retries() -> u32 {
    3
}
fn default_generation_timeout_secs() -> u64 {
    60
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate a configuration document.
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.max_tokens == 0 {
        bail!("chunking.max_tokens must be > 0");
    }
    match config.chunking.strategy.as_str() {
        "paragraph" | "packed" => {}
        other => bail!(
            "Unknown chunking strategy: '{}'. Must be paragraph or packed.",
            other
        ),
    }

    // Validate retrieval
    if config.retrieval.default_top_k < 1 {
        bail!("retrieval.default_top_k must be >= 1");
    }
    if config.retrieval.chat_top_k < 1 {
        bail!("retrieval.chat_top_k must be >= 1");
    }

    // Validate embedding
    if config.embedding.provider == "hashed" && config.embedding.dims.is_none() {
        config.embedding.dims = Some(DEFAULT_HASHED_DIMS);
    }
    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "hashed" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be hashed, openai, ollama, or local.",
            other
        ),
    }
    if embedding.provider != "local" && matches!(embedding.dims, None | Some(0)) {
        bail!(
            "embedding.dims must be > 0 when provider is '{}'",
            embedding.provider
        );
    }
    if matches!(embedding.provider.as_str(), "openai" | "ollama") && embedding.model.is_none() {
        bail!(
            "embedding.model must be specified when provider is '{}'",
            embedding.provider
        );
    }
    if embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    // Validate generation
    let generation = &config.generation;
    match generation.provider.as_str() {
        "extractive" => {}
        "openai" | "ollama" => {
            if generation.model.is_none() {
                bail!(
                    "generation.model must be specified when provider is '{}'",
                    generation.provider
                );
            }
        }
        other => bail!(
            "Unknown generation provider: '{}'. Must be extractive, openai, or ollama.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&generation.temperature) {
        bail!("generation.temperature must be in [0.0, 2.0]");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config("[db]\npath = \"./data/lexrag.sqlite\"\n").unwrap();
        assert_eq!(config.chunking.strategy, "paragraph");
        assert_eq!(config.chunking.max_tokens, 700);
        assert_eq!(config.retrieval.default_top_k, 5);
        assert_eq!(config.retrieval.chat_top_k, 3);
        assert_eq!(config.ingest.timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.embedding.provider, "hashed");
        assert_eq!(config.embedding.dims, Some(256));
        assert_eq!(config.generation.provider, "extractive");
    }

    #[test]
    fn test_partial_embedding_section_keeps_hashed_dims() {
        let config =
            parse_config("[db]\npath = \"x\"\n[embedding]\nbatch_size = 32\n").unwrap();
        assert_eq!(config.embedding.provider, "hashed");
        assert_eq!(config.embedding.dims, Some(DEFAULT_HASHED_DIMS));
        assert_eq!(config.embedding.batch_size, 32);

        let err = parse_config("[db]\npath = \"x\"\n[embedding]\ndims = 0\n").unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn test_zero_timeout_disables_deadline() {
        let config =
            parse_config("[db]\npath = \"x.sqlite\"\n[ingest]\ntimeout_secs = 0\n").unwrap();
        assert_eq!(config.ingest.timeout(), None);
    }

    #[test]
    fn test_rejects_unknown_strategy() {
        let err = parse_config("[db]\npath = \"x\"\n[chunking]\nstrategy = \"sentence\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("chunking strategy"));
    }

    #[test]
    fn test_rejects_zero_chat_top_k() {
        assert!(parse_config("[db]\npath = \"x\"\n[retrieval]\nchat_top_k = 0\n").is_err());
    }

    #[test]
    fn test_remote_embedding_requires_model() {
        let err = parse_config(
            "[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\ndims = 1536\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn test_remote_generation_requires_model() {
        assert!(parse_config("[db]\npath = \"x\"\n[generation]\nprovider = \"ollama\"\n").is_err());
        assert!(parse_config(
            "[db]\npath = \"x\"\n[generation]\nprovider = \"ollama\"\nmodel = \"llama3.1\"\n"
        )
        .is_ok());
    }

    #[test]
    fn test_local_embedding_needs_no_dims() {
        let config = parse_config(
            "[db]\npath = \"x\"\n[embedding]\nprovider = \"local\"\n",
        )
        .unwrap();
        assert_eq!(config.embedding.provider, "local");
    }
}
