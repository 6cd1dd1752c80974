//! Question to chart: agent, code generation, render, explanation.

use crate::agent::{TabularAgent, TabularAnswer};
use crate::explainer::ChartExplainer;
use crate::generator::ChartCodeGenerator;
use crate::sandbox::{RenderOutcome, SandboxRenderer};
use ragchart_core::AppResult;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// A chart narrative and image, present together or not at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartArtifact {
    #[serde(skip_serializing_if = "Option::is_none")]
    narrative: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
}

impl ChartArtifact {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn rendered(narrative: String, image_base64: String) -> Self {
        Self {
            narrative: Some(narrative),
            image: Some(image_base64),
        }
    }

    pub fn narrative(&self) -> Option<&str> {
        self.narrative.as_deref()
    }

    /// Base64 PNG.
    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_none()
    }

    pub fn into_parts(self) -> (Option<String>, Option<String>) {
        (self.narrative, self.image)
    }
}

pub struct ChartPipeline {
    agent: Arc<dyn TabularAgent>,
    generator: ChartCodeGenerator,
    renderer: SandboxRenderer,
    explainer: ChartExplainer,
}

impl ChartPipeline {
    pub fn new(
        agent: Arc<dyn TabularAgent>,
        generator: ChartCodeGenerator,
        renderer: SandboxRenderer,
        explainer: ChartExplainer,
    ) -> Self {
        Self {
            agent,
            generator,
            renderer,
            explainer,
        }
    }

    /// Chart for `question`, or an empty artifact when none can be drawn.
    ///
    /// The explainer only runs once an image exists; its failure text still
    /// fills the narrative.
    pub async fn run(&self, question: &str) -> ChartArtifact {
        let start = Instant::now();

        let (answer, image) = match self.render(question).await {
            Ok(Some(rendered)) => rendered,
            Ok(None) => {
                tracing::info!("No numeric relationship to chart");
                return ChartArtifact::empty();
            }
            Err(e) => {
                tracing::warn!("Chart pipeline aborted: {}", e);
                return ChartArtifact::empty();
            }
        };

        let narrative = self.explainer.explain(&answer.output).await.into_text();
        tracing::info!(
            duration_ms = start.elapsed().as_millis() as u64,
            "Chart ready"
        );
        ChartArtifact::rendered(narrative, image)
    }

    async fn render(&self, question: &str) -> AppResult<Option<(TabularAnswer, String)>> {
        let answer = self.agent.invoke(question).await?;
        let generated = self.generator.generate(&answer.output).await?;

        match self.renderer.render(&generated).await? {
            RenderOutcome::NoCode => Ok(None),
            RenderOutcome::Rendered { image_base64, .. } => Ok(Some((answer, image_base64))),
        }
    }
}
