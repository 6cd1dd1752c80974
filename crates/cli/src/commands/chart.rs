//! Chart command handler.

use crate::context::AppContext;
use base64::Engine;
use clap::Args;
use ragchart_core::{AppError, AppResult};
use std::path::PathBuf;

/// Chart the numbers behind a question about the tabular database
#[derive(Args, Debug)]
pub struct ChartCommand {
    /// The question to chart
    pub question: String,

    /// Write the PNG to this path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output the narrative and base64 image as JSON
    #[arg(long)]
    pub json: bool,
}

impl ChartCommand {
    pub async fn execute(&self, ctx: &AppContext) -> AppResult<()> {
        tracing::info!("Executing chart command");

        let pipeline = ctx.chart_pipeline()?.ok_or_else(|| {
            AppError::Config(
                "charts need chart.enabled and a database (database.path or RAGCHART_DATABASE)"
                    .to_string(),
            )
        })?;

        let artifact = pipeline.run(&self.question).await;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&artifact)?);
            return Ok(());
        }

        let (Some(narrative), Some(image)) = (artifact.narrative(), artifact.image()) else {
            println!("No chart: no numeric relationship detected.");
            return Ok(());
        };

        println!("{}", narrative);

        if let Some(ref path) = self.output {
            let png = base64::engine::general_purpose::STANDARD
                .decode(image)
                .map_err(|e| AppError::Chart(format!("invalid image encoding: {}", e)))?;
            std::fs::write(path, png)?;
            println!();
            println!("Chart written to {}", path.display());
        }

        Ok(())
    }
}
