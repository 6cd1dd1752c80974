//! Grounded answer synthesis.

use crate::context::truncate_chars;
use ragchart_core::Sentinel;
use ragchart_llm::LlmClient;
use ragchart_prompt::{ids, PromptLibrary};
use serde::Serialize;
use std::sync::Arc;

/// Outcome of one synthesis attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Answer {
    /// Text written by the model
    Synthesized(String),
    /// Fixed refusal, no model call made
    Refused(Sentinel),
    /// The model call failed
    Failed(String),
}

impl Answer {
    /// Whether the text is a refusal, either fixed or written by the model.
    pub fn is_refusal(&self) -> bool {
        match self {
            Self::Refused(_) => true,
            Self::Synthesized(text) => text.starts_with(Sentinel::REFUSAL_PREFIX),
            Self::Failed(_) => false,
        }
    }

    /// Plain-text rendering used at the output boundary.
    pub fn into_text(self) -> String {
        match self {
            Self::Synthesized(text) => text,
            Self::Refused(sentinel) => sentinel.text().to_string(),
            Self::Failed(cause) => format!("Error generating response: {}", cause),
        }
    }
}

/// Fills the grounding prompt and calls the model once.
#[derive(Clone)]
pub struct AnswerSynthesizer {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
    model: String,
    max_chars: usize,
}

impl AnswerSynthesizer {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptLibrary>,
        model: impl Into<String>,
        max_chars: usize,
    ) -> Self {
        Self {
            llm,
            prompts,
            model: model.into(),
            max_chars,
        }
    }

    /// Answer `query` from `context`.
    ///
    /// Blank context is refused without calling the model. Failures are
    /// returned as [`Answer::Failed`] and never propagate.
    pub async fn synthesize(&self, query: &str, context: &str) -> Answer {
        if context.trim().is_empty() {
            tracing::debug!("Empty context, refusing without a model call");
            return Answer::Refused(Sentinel::InsufficientInformation);
        }

        let context = truncate_chars(context, self.max_chars);

        let prompt = match self.prompts.render(
            ids::ANSWER_GROUNDED,
            &[("context", context), ("question", query)],
        ) {
            Ok(prompt) => prompt,
            Err(e) => return Answer::Failed(e.to_string()),
        };

        match self.llm.complete(&prompt.into_request(self.model.as_str())).await {
            Ok(response) => {
                tracing::debug!(
                    chars = response.content.len(),
                    tokens = response.usage.total_tokens,
                    "Synthesized answer"
                );
                Answer::Synthesized(response.content.trim().to_string())
            }
            Err(e) => {
                tracing::warn!("Answer synthesis failed: {}", e);
                Answer::Failed(e.to_string())
            }
        }
    }
}
