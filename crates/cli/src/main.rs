//! ragchart CLI
//!
//! Answers questions from a document collection and charts the numbers
//! behind questions about a SQL database.

mod commands;
mod context;

use anyhow::Context;
use clap::{Parser, Subcommand};
use commands::{AskCommand, ChartCommand, ChatCommand, KnowledgeCommand};
use context::AppContext;
use ragchart_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;

/// ragchart - grounded answers and charts from your documents and data
#[derive(Parser, Debug)]
#[command(name = "ragchart")]
#[command(about = "Grounded answers and charts from documents and SQL data", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "RAGCHART_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "RAGCHART_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// LLM provider (ollama, groq, openai)
    #[arg(short, long, global = true, env = "RAGCHART_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "RAGCHART_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer a question from the loaded documents
    Ask(AskCommand),

    /// Chart the numbers behind a question about the database
    Chart(ChartCommand),

    /// Answer and chart a question, printing the chat JSON body
    Chat(ChatCommand),

    /// Vector collection management
    Knowledge(KnowledgeCommand),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Ask(_) => "ask",
            Commands::Chart(_) => "chart",
            Commands::Chat(_) => "chat",
            Commands::Knowledge(_) => "knowledge",
        }
    }

    async fn run(self, config: AppConfig) -> AppResult<()> {
        match self {
            Commands::Ask(cmd) => cmd.execute(&AppContext::new(config)?).await,
            Commands::Chart(cmd) => cmd.execute(&AppContext::new(config)?).await,
            Commands::Chat(cmd) => cmd.execute(&AppContext::new(config)?).await,
            Commands::Knowledge(cmd) => cmd.execute(&config).await,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Workspace and config file decide which config.yaml is read.
    let config = AppConfig::load_from(cli.workspace, cli.config)
        .context("Failed to load configuration")?
        .with_overrides(
            None,
            None,
            cli.provider,
            cli.model,
            cli.log_level,
            cli.verbose,
            cli.no_color,
        );

    logging::init_logging(config.log_level.as_deref(), config.no_color, config.log_json)?;

    tracing::info!("ragchart starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    config.ensure_state_dir()?;

    let _span = tracing::info_span!("command", name = cli.command.name()).entered();

    let result = cli.command.run(config).await;

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    Ok(result?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ask_with_overrides() {
        let cli = Cli::try_parse_from([
            "ragchart", "ask", "What is total revenue?", "-k", "3", "--threshold", "50", "--json",
        ])
        .unwrap();

        let Commands::Ask(cmd) = cli.command else {
            panic!("expected ask");
        };
        assert_eq!(cmd.question, "What is total revenue?");
        assert_eq!(cmd.k, Some(3));
        assert_eq!(cmd.threshold, Some(50.0));
        assert!(cmd.json);
    }

    #[test]
    fn test_parse_knowledge_load() {
        let cli = Cli::try_parse_from([
            "ragchart", "--verbose", "knowledge", "load", "docs.jsonl", "--reindex", "--batch-size", "10",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.command.name(), "knowledge");
    }

    #[test]
    fn test_chat_requires_question() {
        assert!(Cli::try_parse_from(["ragchart", "chat"]).is_err());
    }
}
