//! ragchart core library
//!
//! This crate provides the foundational utilities shared by every ragchart crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management (workspace, providers, retrieval and chart settings)

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{
    AppConfig, ChartSettings, DatabaseSettings, EmbeddingSettings, LlmConfig, OnRefusal,
    ProviderConfig, RefusalPolicy, RetrievalSettings, Sentinel, VectorBackend,
};
pub use error::{AppError, AppResult};
