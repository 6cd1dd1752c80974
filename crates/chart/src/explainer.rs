//! Narrative for a rendered chart.

use ragchart_llm::LlmClient;
use ragchart_prompt::{ids, PromptLibrary};
use serde::Serialize;
use std::sync::Arc;

const PLOTTING_PREFIXES: [&str; 4] = ["import ", "from ", "plt", "sns"];

/// Drop blank lines and lines that look like plotting code.
pub fn strip_plotting_lines(text: &str) -> String {
    text.lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !PLOTTING_PREFIXES.iter().any(|p| trimmed.starts_with(p))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Outcome of one explanation attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Explanation {
    Narrative(String),
    Failed(String),
}

impl Explanation {
    pub fn into_text(self) -> String {
        match self {
            Self::Narrative(text) => text,
            Self::Failed(cause) => format!("Error generating response: {}", cause),
        }
    }
}

#[derive(Clone)]
pub struct ChartExplainer {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
    model: String,
}

impl ChartExplainer {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>, model: impl Into<String>) -> Self {
        Self {
            llm,
            prompts,
            model: model.into(),
        }
    }

    /// Describe the relationship in `tabular_text`. Never fails outright.
    pub async fn explain(&self, tabular_text: &str) -> Explanation {
        let summary = strip_plotting_lines(tabular_text);

        let prompt = match self.prompts.render(ids::CHART_EXPLAIN, &[("summary", &summary)]) {
            Ok(prompt) => prompt,
            Err(e) => return Explanation::Failed(e.to_string()),
        };

        match self.llm.complete(&prompt.into_request(self.model.as_str())).await {
            Ok(response) => Explanation::Narrative(response.content.trim().to_string()),
            Err(e) => {
                tracing::warn!("Chart explanation failed: {}", e);
                Explanation::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLlm;

    fn explainer(llm: Arc<ScriptedLlm>) -> ChartExplainer {
        ChartExplainer::new(llm, Arc::new(PromptLibrary::builtin().unwrap()), "test-model")
    }

    #[test]
    fn test_strip_plotting_lines() {
        let text = "Sales by region:\n\nimport matplotlib.pyplot as plt\n  plt.bar(x, y)\nsns.set()\nfrom numpy import array\nNorth: 120\n   \nSouth: 80";
        assert_eq!(strip_plotting_lines(text), "Sales by region:\nNorth: 120\nSouth: 80");
    }

    #[test]
    fn test_prefix_match_is_textual() {
        // Any line starting with "plt" goes, even prose.
        assert_eq!(strip_plotting_lines("pltfoo bar\nkeep"), "keep");
    }

    #[tokio::test]
    async fn test_narrative_from_stripped_text() {
        let llm = Arc::new(ScriptedLlm::replying(&["Title:\nRegional sales\n"]));
        let explanation = explainer(llm.clone())
            .explain("North: 120\nplt.show()\nSouth: 80")
            .await;

        assert_eq!(explanation, Explanation::Narrative("Title:\nRegional sales".to_string()));
        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("North: 120\nSouth: 80"));
        assert!(!prompt.contains("plt.show"));
    }

    #[tokio::test]
    async fn test_failure_renders_legacy_text() {
        let llm = Arc::new(ScriptedLlm::new(vec![Err("timeout")]));
        let explanation = explainer(llm).explain("North: 120").await;

        assert!(matches!(explanation, Explanation::Failed(_)));
        assert_eq!(
            explanation.into_text(),
            "Error generating response: LLM error: timeout"
        );
    }
}
