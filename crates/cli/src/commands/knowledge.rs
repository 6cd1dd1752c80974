//! Knowledge command handler.
//!
//! Manages the vector collection the ask and chat commands read from.

use clap::{Args, Subcommand};
use ragchart_core::{config::AppConfig, AppError, AppResult};
use ragchart_knowledge::{
    load_file, open_index, LoadOptions, ProgressEvent, ProgressReporter, VectorIndex,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Vector collection management
#[derive(Args, Debug)]
pub struct KnowledgeCommand {
    #[command(subcommand)]
    pub action: KnowledgeAction,
}

#[derive(Subcommand, Debug)]
pub enum KnowledgeAction {
    /// Load documents from a JSON Lines file
    Load(KnowledgeLoadCommand),
    /// Show collection statistics
    Stats(KnowledgeStatsCommand),
    /// Remove every document from the collection
    Clean(KnowledgeCleanCommand),
}

/// Load documents
#[derive(Args, Debug)]
pub struct KnowledgeLoadCommand {
    /// File of `{"content": ..., "metadata": {...}}` records, one per line
    pub file: PathBuf,

    /// Drop the collection before loading
    #[arg(long)]
    pub reindex: bool,

    /// Documents per upsert batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl KnowledgeLoadCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Loading {} into '{}'", self.file.display(), config.retrieval.collection);

        if !self.file.exists() {
            return Err(AppError::Config(format!(
                "file not found: {}",
                self.file.display()
            )));
        }

        let index = open_index(config)?;
        let options = LoadOptions {
            batch_size: self.batch_size.unwrap_or(config.retrieval.batch_size),
            reindex: self.reindex,
        };
        let progress = if self.json {
            ProgressReporter::noop()
        } else {
            ProgressReporter::new(Arc::new(|event: ProgressEvent| {
                eprintln!("{}", event.format_simple())
            }))
        };

        let stats = load_file(index.as_ref(), &self.file, &options, &progress).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        } else {
            println!(
                "Loaded {} documents in {} batches ({:.2}s); collection now holds {}",
                stats.documents, stats.batches, stats.duration_secs, stats.collection_size
            );
        }

        Ok(())
    }
}

/// Show collection statistics
#[derive(Args, Debug)]
pub struct KnowledgeStatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl KnowledgeStatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let stats = open_index(config)?.stats().await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        } else {
            println!("Collection: {} ({})", stats.collection, stats.backend);
            println!("  Documents: {}", stats.documents);
            println!("  Embeddings: {} ({} dimensions)", stats.embedding_model, stats.dimensions);
            if let Some(size) = stats.size_bytes {
                println!("  Size: {} bytes", size);
            }
            if let Some(loaded) = stats.last_loaded_at {
                println!("  Last load: {}", loaded);
            }
        }

        Ok(())
    }
}

/// Remove every document
#[derive(Args, Debug)]
pub struct KnowledgeCleanCommand {}

impl KnowledgeCleanCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        open_index(config)?.reset().await?;
        println!("Collection '{}' cleaned", config.retrieval.collection);
        Ok(())
    }
}

impl KnowledgeCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        match &self.action {
            KnowledgeAction::Load(cmd) => cmd.execute(config).await,
            KnowledgeAction::Stats(cmd) => cmd.execute(config).await,
            KnowledgeAction::Clean(cmd) => cmd.execute(config).await,
        }
    }
}
