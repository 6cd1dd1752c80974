//! Plotting code generation from a tabular answer.

use ragchart_core::AppResult;
use ragchart_llm::LlmClient;
use ragchart_prompt::{ids, PromptLibrary};
use std::sync::Arc;

/// Asks the model for label/value extraction and plotting code.
#[derive(Clone)]
pub struct ChartCodeGenerator {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
    model: String,
}

impl ChartCodeGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>, model: impl Into<String>) -> Self {
        Self {
            llm,
            prompts,
            model: model.into(),
        }
    }

    /// Raw model output: a fenced code block or a prose refusal.
    pub async fn generate(&self, tabular_answer: &str) -> AppResult<String> {
        let prompt = self
            .prompts
            .render(ids::CHART_CODE, &[("tabular_answer", tabular_answer)])?;
        let response = self.llm.complete(&prompt.into_request(self.model.as_str())).await?;

        tracing::debug!(
            chars = response.content.len(),
            tokens = response.usage.total_tokens,
            "Generated chart code"
        );
        Ok(response.content)
    }
}
