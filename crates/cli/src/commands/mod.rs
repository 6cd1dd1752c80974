//! Command handlers for the ragchart CLI.

pub mod ask;
pub mod chart;
pub mod chat;
pub mod knowledge;

pub use ask::AskCommand;
pub use chart::ChartCommand;
pub use chat::ChatCommand;
pub use knowledge::KnowledgeCommand;
