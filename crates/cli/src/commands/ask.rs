//! Ask command handler.
//!
//! Answers a question from the vector collection with a grounded prompt.

use crate::context::AppContext;
use clap::Args;
use ragchart_core::{AppError, AppResult};

/// Answer a question from the loaded documents
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to answer
    pub question: String,

    /// Number of candidates requested from the index
    #[arg(short = 'k', long = "top-k")]
    pub k: Option<usize>,

    /// Minimum similarity score in percent (0-100)
    #[arg(short, long)]
    pub threshold: Option<f64>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, ctx: &AppContext) -> AppResult<()> {
        tracing::info!("Executing ask command");

        let mut pipeline = ctx.answer_pipeline()?;
        if let Some(k) = self.k {
            pipeline = pipeline.with_k(k);
        }
        if let Some(threshold) = self.threshold {
            if !(0.0..=100.0).contains(&threshold) {
                return Err(AppError::Config(format!(
                    "threshold must be within [0, 100], got {}",
                    threshold
                )));
            }
            pipeline = pipeline.with_threshold(threshold);
        }

        let outcome = pipeline.ask(&self.question).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            return Ok(());
        }

        match outcome.answer {
            Some(ref answer) => println!("{}", answer),
            None => tracing::info!("Refusal suppressed, nothing to print"),
        }

        if !outcome.sources.is_empty() {
            println!();
            println!("Sources:");
            for doc in &outcome.sources {
                println!(
                    "- {} (Section: {}, {:.1}%)",
                    doc.source().unwrap_or_else(|| "Unknown".to_string()),
                    doc.section().unwrap_or_else(|| "N/A".to_string()),
                    doc.similarity_score().unwrap_or_default()
                );
            }
        }

        Ok(())
    }
}
