//! Prompt types.
//!
//! This module defines the domain entities for the prompt system.

use ragchart_llm::LlmRequest;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A prompt definition loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique prompt identifier
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Creator identifier
    #[serde(rename = "createdBy", default)]
    pub created_by: String,

    /// Behavioral settings
    #[serde(default)]
    pub behavior: PromptBehavior,

    /// Input specification
    #[serde(default)]
    pub input: PromptInputSpec,

    /// Template string with Handlebars syntax
    pub template: String,

    /// Output specification
    pub output: PromptOutputSpec,
}

/// Behavioral settings for prompt execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptBehavior {
    /// Tone (e.g., "honest", "technical", "analytical")
    #[serde(default)]
    pub tone: String,

    /// Style (e.g., "concise", "code-only")
    #[serde(default)]
    pub style: String,

    /// Sampling temperature to request from the model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Generation budget to request from the model
    #[serde(rename = "maxTokens", skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Input specification for the prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptInputSpec {
    /// Variables the template expects the caller to supply
    #[serde(default)]
    pub variables: Vec<String>,
}

/// Output specification for the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptOutputSpec {
    /// Output format (e.g., "text", "python", "sql")
    pub format: String,
}

/// A definition together with where it was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedPrompt {
    pub definition: PromptDefinition,

    /// True when `.ragchart/prompts/<id>.yml` replaced the built-in
    pub workspace_override: bool,
}

/// A fully built prompt ready for LLM execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPrompt {
    /// User message
    pub user: String,

    /// Temperature requested by the definition
    pub temperature: Option<f32>,

    /// Token budget requested by the definition
    pub max_tokens: Option<u32>,

    /// Metadata about the built prompt
    pub metadata: BuiltPromptMetadata,
}

impl BuiltPrompt {
    /// Completion request for `model` carrying the definition's sampling options.
    pub fn into_request(self, model: impl Into<String>) -> LlmRequest {
        let mut request = LlmRequest::new(self.user, model);
        if let Some(t) = self.temperature {
            request = request.with_temperature(t);
        }
        if let Some(m) = self.max_tokens {
            request = request.with_max_tokens(m);
        }
        request
    }
}

/// Metadata about a built prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPromptMetadata {
    /// Source prompt ID
    #[serde(rename = "sourcePromptId")]
    pub source_prompt_id: String,

    /// Whether the definition came from a workspace override
    #[serde(rename = "workspaceOverride")]
    pub workspace_override: bool,

    /// Template variables that were resolved
    #[serde(rename = "resolvedVariables")]
    pub resolved_variables: HashMap<String, String>,
}
