//! Vector index port.
//!
//! The [`VectorIndex`] trait stores vectors keyed by an opaque id together
//! with [`Metadata`], and answers nearest-neighbour queries. The helpers in
//! this module hold the behaviour every backend must share: which filter
//! keys are supported, how filters match, and how candidates are ranked.
//!
//! # Ranking
//!
//! Results are ordered by descending score. Ties keep insertion order
//! (first-inserted wins), so backends must hand candidates to
//! [`rank_hits`] in insertion order.

pub mod memory;

use std::cmp::Ordering;

use async_trait::async_trait;

use crate::error::{RagError, Result};
use crate::models::{Filters, Metadata, SearchHit};

/// Metadata key carrying the chunk store id of an indexed chunk.
pub const CHUNK_ID_KEY: &str = "chunk_id";

/// Metadata keys that may appear in a search filter.
pub const FILTERABLE_KEYS: &[&str] = &["document_id", "chunk_id", "position", "title", "source_ref"];

/// Abstract nearest-neighbour index.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add_vectors`](VectorIndex::add_vectors) | Upsert vectors by id |
/// | [`similarity_search`](VectorIndex::similarity_search) | Top-k by cosine similarity |
/// | [`delete`](VectorIndex::delete) | Remove vectors by id |
/// | [`dimension`](VectorIndex::dimension) | Dimensionality fixed by the first write |
/// | [`len`](VectorIndex::len) | Number of stored vectors |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Upsert: an existing id has its vector and metadata replaced.
    ///
    /// `vectors`, `metadatas`, and `ids` are parallel slices.
    async fn add_vectors(
        &self,
        vectors: &[Vec<f32>],
        metadatas: &[Metadata],
        ids: &[String],
    ) -> Result<()>;

    /// At most `top_k` hits, best first. An empty index yields no hits.
    async fn similarity_search(
        &self,
        vector: &[f32],
        top_k: usize,
        filters: &Filters,
    ) -> Result<Vec<SearchHit>>;

    /// Remove the given ids; unknown ids are ignored. Returns how many were removed.
    async fn delete(&self, ids: &[String]) -> Result<usize>;

    /// Dimensionality of stored vectors, `None` while empty.
    async fn dimension(&self) -> Result<Option<usize>>;

    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Reject filters on keys the index does not support.
pub fn check_filters(filters: &Filters) -> Result<()> {
    match filters
        .keys()
        .find(|key| !FILTERABLE_KEYS.contains(&key.as_str()))
    {
        Some(key) => Err(RagError::Input(format!(
            "unsupported filter key: '{key}'. Supported: {}",
            FILTERABLE_KEYS.join(", ")
        ))),
        None => Ok(()),
    }
}

/// `true` when every filter equals the corresponding metadata value.
pub fn matches_filters(metadata: &Metadata, filters: &Filters) -> bool {
    filters
        .iter()
        .all(|(key, value)| metadata.get(key) == Some(value))
}

/// Validate the parallel slices passed to [`VectorIndex::add_vectors`] and
/// return their common dimension.
pub fn check_batch(
    vectors: &[Vec<f32>],
    metadatas: &[Metadata],
    ids: &[String],
) -> Result<Option<usize>> {
    if vectors.len() != ids.len() || metadatas.len() != ids.len() {
        return Err(RagError::Input(format!(
            "add_vectors expects parallel slices, got {} vectors, {} metadatas, {} ids",
            vectors.len(),
            metadatas.len(),
            ids.len()
        )));
    }
    let Some(first) = vectors.first() else {
        return Ok(None);
    };
    if first.is_empty() {
        return Err(RagError::Input("vectors must not be empty".to_string()));
    }
    for v in vectors {
        if v.len() != first.len() {
            return Err(RagError::DimensionMismatch {
                expected: first.len(),
                actual: v.len(),
            });
        }
    }
    Ok(Some(first.len()))
}

/// Stable sort by descending score, then truncate to `top_k`.
pub fn rank_hits(mut hits: Vec<SearchHit>, top_k: usize) -> Vec<SearchHit> {
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    hits.truncate(top_k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hit(id: &str, score: f64) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            score,
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn test_rank_descending_with_stable_ties() {
        let hits = vec![hit("a", 0.5), hit("b", 0.9), hit("c", 0.5), hit("d", 0.1)];
        let ranked: Vec<String> = rank_hits(hits, 3).into_iter().map(|h| h.id).collect();
        assert_eq!(ranked, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_check_filters_rejects_unknown_key() {
        let mut filters = Filters::new();
        filters.insert("document_id".into(), json!("d1"));
        assert!(check_filters(&filters).is_ok());
        filters.insert("jurisdiction".into(), json!("NY"));
        let err = check_filters(&filters).unwrap_err();
        assert!(err.to_string().contains("jurisdiction"));
    }

    #[test]
    fn test_matches_filters() {
        let mut metadata = Metadata::new();
        metadata.insert("document_id".into(), json!("d1"));
        metadata.insert("position".into(), json!(2));

        let mut filters = Filters::new();
        assert!(matches_filters(&metadata, &filters));
        filters.insert("position".into(), json!(2));
        assert!(matches_filters(&metadata, &filters));
        filters.insert("document_id".into(), json!("d2"));
        assert!(!matches_filters(&metadata, &filters));
    }

    #[test]
    fn test_check_batch() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let metas = vec![Metadata::new(), Metadata::new()];
        assert_eq!(
            check_batch(&[vec![1.0, 0.0], vec![0.0, 1.0]], &metas, &ids).unwrap(),
            Some(2)
        );
        assert!(matches!(
            check_batch(&[vec![1.0, 0.0]], &metas, &ids),
            Err(RagError::Input(_))
        ));
        assert!(matches!(
            check_batch(&[vec![1.0, 0.0], vec![1.0]], &metas, &ids),
            Err(RagError::DimensionMismatch { .. })
        ));
        assert_eq!(check_batch(&[], &[], &[]).unwrap(), None);
    }
}
