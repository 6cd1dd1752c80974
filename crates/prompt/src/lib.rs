//! Prompt system for ragchart.
//!
//! This crate provides structured prompt management with:
//! - YAML-based prompt definitions, built in and overridable per workspace
//! - Handlebars template rendering

pub mod builder;
pub mod library;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use library::PromptLibrary;
pub use loader::{list_prompts, load_builtin, load_prompt, BUILTIN_PROMPTS};
pub use types::{
    BuiltPrompt, BuiltPromptMetadata, LoadedPrompt, PromptBehavior, PromptDefinition,
    PromptInputSpec, PromptOutputSpec,
};

/// Prompt IDs used by the answering and chart pipelines.
pub mod ids {
    pub const ANSWER_GROUNDED: &str = "answer.grounded";
    pub const CHART_CODE: &str = "chart.code";
    pub const CHART_EXPLAIN: &str = "chart.explain";
    pub const AGENT_SQL: &str = "agent.sql";
    pub const AGENT_ANSWER: &str = "agent.answer";
}
