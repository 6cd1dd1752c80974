//! Error types for ragchart.
//!
//! One error enum covers every failure category: configuration, I/O, model
//! providers, retrieval, prompts, chart generation, the rendering sandbox and
//! the tabular database.

use thiserror::Error;

/// Unified error type for ragchart.
///
/// Library functions return `Result<T, AppError>`. Components that sit on the
/// answer boundary (synthesis, explanation) convert these into tagged outcomes
/// instead of propagating them.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors (transport, quota, malformed responses)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Vector index, embedding and retrieval errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Prompt loading and rendering errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Chart generation and explanation errors
    #[error("Chart error: {0}")]
    Chart(String),

    /// Generated plotting code was rejected or could not be rendered
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// Relational database errors raised by the tabular agent
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
