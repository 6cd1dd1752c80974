//! Process-local vector collection.

use crate::document::{Document, ScoredDocument};
use crate::embeddings::EmbeddingProvider;
use crate::vector_index::{cosine_distance, IndexStats, VectorIndex};
use chrono::{DateTime, Utc};
use ragchart_core::{AppError, AppResult};
use std::sync::{Arc, RwLock};

struct Entry {
    id: String,
    document: Document,
    embedding: Vec<f32>,
}

#[derive(Default)]
struct State {
    entries: Vec<Entry>,
    last_loaded_at: Option<DateTime<Utc>>,
}

/// In-memory collection, lost when the process exits.
pub struct MemoryIndex {
    collection: String,
    embedder: Arc<dyn EmbeddingProvider>,
    state: RwLock<State>,
}

impl MemoryIndex {
    pub fn new(collection: &str, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            collection: collection.to_string(),
            embedder,
            state: RwLock::new(State::default()),
        }
    }

    fn poisoned<T>(_: T) -> AppError {
        AppError::Knowledge("Memory index lock poisoned".to_string())
    }
}

#[async_trait::async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, documents: &[Document]) -> AppResult<usize> {
        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let mut state = self.state.write().map_err(Self::poisoned)?;
        for (document, embedding) in documents.iter().zip(embeddings) {
            let id = document.id();
            match state.entries.iter_mut().find(|e| e.id == id) {
                Some(entry) => {
                    entry.document = document.clone();
                    entry.embedding = embedding;
                }
                None => state.entries.push(Entry {
                    id,
                    document: document.clone(),
                    embedding,
                }),
            }
        }
        if !documents.is_empty() {
            state.last_loaded_at = Some(Utc::now());
        }

        Ok(documents.len())
    }

    async fn search(&self, query_text: &str, k: usize) -> AppResult<Vec<ScoredDocument>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query = self.embedder.embed(query_text).await?;
        let state = self.state.read().map_err(Self::poisoned)?;

        let mut results: Vec<ScoredDocument> = state
            .entries
            .iter()
            .map(|e| ScoredDocument {
                document: e.document.clone(),
                distance: cosine_distance(&query, &e.embedding),
            })
            .collect();

        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        results.truncate(k);
        Ok(results)
    }

    async fn count(&self) -> AppResult<usize> {
        Ok(self.state.read().map_err(Self::poisoned)?.entries.len())
    }

    async fn reset(&self) -> AppResult<()> {
        let mut state = self.state.write().map_err(Self::poisoned)?;
        *state = State::default();
        Ok(())
    }

    async fn stats(&self) -> AppResult<IndexStats> {
        let state = self.state.read().map_err(Self::poisoned)?;
        Ok(IndexStats {
            backend: "memory".to_string(),
            collection: self.collection.clone(),
            documents: state.entries.len(),
            embedding_model: self.embedder.model_name().to_string(),
            dimensions: self.embedder.dimensions(),
            last_loaded_at: state.last_loaded_at,
            size_bytes: None,
        })
    }
}
