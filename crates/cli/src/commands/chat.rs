//! Chat command handler.
//!
//! Prints the same JSON body the `/chat` endpoint returns: the text answer
//! and, when charts are configured, the chart narrative and image.

use crate::context::AppContext;
use clap::Args;
use ragchart_chart::ChartArtifact;
use ragchart_core::AppResult;
use ragchart_knowledge::Answer;
use serde::Serialize;

/// Answer a question and chart it, printing one JSON object
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// The question to answer
    pub question: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponse {
    pub question: String,
    pub response: Option<String>,
    /// Absent when the chart pipeline is not configured
    #[serde(flatten)]
    pub chart: Option<ChartFields>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartFields {
    pub graph_summary: Option<String>,
    pub graph_img: Option<String>,
}

impl From<ChartArtifact> for ChartFields {
    fn from(artifact: ChartArtifact) -> Self {
        let (graph_summary, graph_img) = artifact.into_parts();
        Self {
            graph_summary,
            graph_img,
        }
    }
}

impl ChatCommand {
    /// Best effort: failures become fields of the response, never an exit code.
    pub async fn execute(&self, ctx: &AppContext) -> AppResult<()> {
        tracing::info!("Executing chat command");

        let response = match ctx.answer_pipeline() {
            Ok(pipeline) => pipeline.answer(&self.question).await,
            Err(e) => Err(e),
        }
        .unwrap_or_else(|e| {
            tracing::error!("Answering failed: {}", e);
            Some(Answer::Failed(e.to_string()).into_text())
        });

        let chart = match ctx.chart_pipeline() {
            Ok(Some(pipeline)) => Some(pipeline.run(&self.question).await.into()),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Chart pipeline unavailable: {}", e);
                Some(ChartFields::default())
            }
        };

        let body = ChatResponse {
            question: self.question.clone(),
            response,
            chart,
        };
        println!("{}", serde_json::to_string_pretty(&body)?);
        Ok(())
    }
}
