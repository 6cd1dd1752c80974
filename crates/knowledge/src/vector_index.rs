//! Vector index abstraction.
//!
//! A backend owns its embedding provider, so callers search with plain query
//! text and receive documents with distances normalized to `[0, 1]`.

use crate::document::{Document, ScoredDocument};
use crate::embeddings::{create_provider, EmbeddingProvider};
use crate::memory_index::MemoryIndex;
use crate::sqlite_index::SqliteIndex;
use chrono::{DateTime, Utc};
use ragchart_core::{AppConfig, AppResult, VectorBackend};
use serde::Serialize;
use std::sync::Arc;

/// Summary of a collection for `knowledge stats`.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub backend: String,
    pub collection: String,
    pub documents: usize,
    pub embedding_model: String,
    pub dimensions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_loaded_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// Trait for vector index backends.
///
/// Implementations must be safe for concurrent reads from independent
/// requests. `search` returns candidates sorted by ascending distance, ties
/// in insertion order.
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or update documents, keyed by [`Document::id`].
    async fn upsert(&self, documents: &[Document]) -> AppResult<usize>;

    /// Return the `k` nearest documents to the query text.
    async fn search(&self, query_text: &str, k: usize) -> AppResult<Vec<ScoredDocument>>;

    /// Number of documents in the collection.
    async fn count(&self) -> AppResult<usize>;

    /// Drop every document in the collection.
    async fn reset(&self) -> AppResult<()>;

    /// Collection summary.
    async fn stats(&self) -> AppResult<IndexStats>;
}

/// Cosine distance clamped to `[0, 1]`.
///
/// Negative similarity counts as unrelated; vectors of different width or
/// zero length are maximally distant.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 1.0;
    }

    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    let cosine = (dot / (norm_a * norm_b)).clamp(-1.0, 1.0);
    1.0 - cosine.max(0.0)
}

/// Open the collection selected by `retrieval.backend`.
pub fn open_index(config: &AppConfig) -> AppResult<Arc<dyn VectorIndex>> {
    let settings = &config.retrieval;
    let embedder: Arc<dyn EmbeddingProvider> = create_provider(&settings.embedding)?;

    match settings.backend {
        VectorBackend::Sqlite => {
            let path = config.index_path();
            tracing::debug!(path = ?path, collection = %settings.collection, "Opening SQLite index");
            Ok(Arc::new(SqliteIndex::open(
                &path,
                &settings.collection,
                embedder,
            )?))
        }
        VectorBackend::Memory => {
            tracing::debug!(collection = %settings.collection, "Using in-memory index");
            Ok(Arc::new(MemoryIndex::new(&settings.collection, embedder)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vectors_have_zero_distance() {
        let v = [0.6, 0.8, 0.0];
        assert!(cosine_distance(&v, &v).abs() < 1e-9);
    }

    #[test]
    fn test_orthogonal_and_opposite_are_one() {
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-9);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_vectors() {
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine_distance(&[1.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn test_memory_backend_from_config() {
        let mut config = AppConfig::default();
        config.retrieval.backend = VectorBackend::Memory;
        assert!(open_index(&config).is_ok());
    }
}
