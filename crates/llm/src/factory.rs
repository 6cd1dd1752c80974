//! LLM provider factory.
//!
//! Builds the single long-lived chat client the application shares between
//! the answer pipeline, the chart generator and the tabular agent.

use crate::client::LlmClient;
use crate::providers::{OllamaClient, OpenAiCompatibleClient};
use crate::types::ProviderType;
use ragchart_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Connection options for [`create_client`].
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Model identifier
    pub model: String,

    /// Custom endpoint URL, otherwise the provider default
    pub endpoint: Option<String>,

    /// API key for hosted providers
    pub api_key: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Create an LLM client based on the provider name.
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown or a hosted
/// provider has no API key, and `AppError::Llm` if the HTTP client cannot
/// be built.
pub fn create_client(provider: &str, options: &ClientOptions) -> AppResult<Arc<dyn LlmClient>> {
    let provider_type = ProviderType::parse(provider)
        .ok_or_else(|| AppError::Config(format!("Unknown provider: {}", provider)))?;

    let endpoint = options
        .endpoint
        .as_deref()
        .unwrap_or(provider_type.default_endpoint());

    tracing::debug!(provider = provider_type.as_str(), endpoint, model = %options.model, "Creating LLM client");

    match provider_type {
        ProviderType::Ollama => {
            let mut client = OllamaClient::with_base_url(endpoint).with_model(&options.model);
            if let Some(secs) = options.timeout_secs {
                client = client.with_timeout(Duration::from_secs(secs))?;
            }
            Ok(Arc::new(client))
        }
        ProviderType::Groq | ProviderType::OpenAI => {
            let api_key = options.api_key.as_deref().ok_or_else(|| {
                AppError::Config(format!(
                    "{} provider requires API key",
                    provider_type.as_str()
                ))
            })?;

            let mut client = OpenAiCompatibleClient::new(
                provider_type.as_str(),
                endpoint,
                api_key,
                &options.model,
            );
            if let Some(secs) = options.timeout_secs {
                client = client.with_timeout(Duration::from_secs(secs))?;
            }
            Ok(Arc::new(client))
        }
    }
}
