//! In-memory [`VectorIndex`] for tests and single-process use.
//!
//! Entries live in a `Vec` behind `std::sync::RwLock`, in insertion order.
//! Search is brute-force cosine similarity over all stored vectors.

use std::sync::RwLock;

use anyhow::anyhow;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{Port, RagError, Result};
use crate::models::{Filters, Metadata, SearchHit};

use super::{check_batch, check_filters, matches_filters, rank_hits, VectorIndex};

struct StoredVector {
    id: String,
    vector: Vec<f32>,
    metadata: Metadata,
}

/// In-memory vector index.
pub struct InMemoryVectorIndex {
    entries: RwLock<Vec<StoredVector>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> RagError {
    RagError::unavailable(Port::VectorIndex, anyhow!("index lock poisoned"))
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn add_vectors(
        &self,
        vectors: &[Vec<f32>],
        metadatas: &[Metadata],
        ids: &[String],
    ) -> Result<()> {
        let Some(dims) = check_batch(vectors, metadatas, ids)? else {
            return Ok(());
        };

        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        if let Some(existing) = entries.first() {
            if existing.vector.len() != dims {
                return Err(RagError::DimensionMismatch {
                    expected: existing.vector.len(),
                    actual: dims,
                });
            }
        }

        for ((vector, metadata), id) in vectors.iter().zip(metadatas).zip(ids) {
            match entries.iter_mut().find(|e| &e.id == id) {
                Some(entry) => {
                    entry.vector = vector.clone();
                    entry.metadata = metadata.clone();
                }
                None => entries.push(StoredVector {
                    id: id.clone(),
                    vector: vector.clone(),
                    metadata: metadata.clone(),
                }),
            }
        }
        Ok(())
    }

    async fn similarity_search(
        &self,
        vector: &[f32],
        top_k: usize,
        filters: &Filters,
    ) -> Result<Vec<SearchHit>> {
        check_filters(filters)?;
        let entries = self.entries.read().map_err(|_| poisoned())?;
        let hits = entries
            .iter()
            .filter(|e| matches_filters(&e.metadata, filters))
            .map(|e| SearchHit {
                id: e.id.clone(),
                score: cosine_similarity(vector, &e.vector) as f64,
                metadata: e.metadata.clone(),
            })
            .collect();
        Ok(rank_hits(hits, top_k))
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let before = entries.len();
        entries.retain(|e| !ids.contains(&e.id));
        Ok(before - entries.len())
    }

    async fn dimension(&self) -> Result<Option<usize>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.first().map(|e| e.vector.len()))
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.read().map_err(|_| poisoned())?.len())
    }
}
