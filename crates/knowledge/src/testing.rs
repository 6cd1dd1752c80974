//! Test doubles shared by unit and scenario tests.

use crate::document::{Document, ScoredDocument};
use crate::vector_index::{IndexStats, VectorIndex};
use ragchart_core::{AppError, AppResult};
use ragchart_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Model double that returns a canned reply and counts calls.
pub struct ScriptedLlm {
    reply: Result<String, String>,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl ScriptedLlm {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn failing(cause: &str) -> Self {
        Self {
            reply: Err(cause.to_string()),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(request.prompt.clone());

        match &self.reply {
            Ok(text) => Ok(LlmResponse {
                content: text.clone(),
                model: request.model.clone(),
                usage: LlmUsage::new(10, 5),
            }),
            Err(cause) => Err(AppError::Llm(cause.clone())),
        }
    }
}

/// Index double that returns fixed candidates regardless of the query.
pub struct FixedIndex {
    candidates: Vec<ScoredDocument>,
}

impl FixedIndex {
    pub fn new(candidates: Vec<(Document, f64)>) -> Self {
        Self {
            candidates: candidates
                .into_iter()
                .map(|(document, distance)| ScoredDocument { document, distance })
                .collect(),
        }
    }

    /// Candidates with bare text content.
    pub fn texts(candidates: &[(&str, f64)]) -> Self {
        Self::new(
            candidates
                .iter()
                .map(|(content, distance)| (Document::from_text(*content), *distance))
                .collect(),
        )
    }
}

#[async_trait::async_trait]
impl VectorIndex for FixedIndex {
    async fn upsert(&self, documents: &[Document]) -> AppResult<usize> {
        Ok(documents.len())
    }

    async fn search(&self, _query_text: &str, k: usize) -> AppResult<Vec<ScoredDocument>> {
        Ok(self.candidates.iter().take(k).cloned().collect())
    }

    async fn count(&self) -> AppResult<usize> {
        Ok(self.candidates.len())
    }

    async fn reset(&self) -> AppResult<()> {
        Ok(())
    }

    async fn stats(&self) -> AppResult<IndexStats> {
        Err(AppError::Knowledge("fixed index has no stats".to_string()))
    }
}
