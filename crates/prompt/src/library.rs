//! A resolved set of prompts shared by every component of a process.

use crate::builder::build_prompt;
use crate::loader::{load_prompt, BUILTIN_PROMPTS};
use crate::types::{BuiltPrompt, LoadedPrompt};
use ragchart_core::{AppError, AppResult};
use std::collections::HashMap;
use std::path::Path;

/// Prompt definitions loaded once at startup.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    prompts: HashMap<String, LoadedPrompt>,
}

impl PromptLibrary {
    /// Load every built-in prompt, applying workspace overrides.
    pub fn load(workspace_path: &Path) -> AppResult<Self> {
        let mut prompts = HashMap::new();
        for (id, _) in BUILTIN_PROMPTS {
            prompts.insert(id.to_string(), load_prompt(workspace_path, id)?);
        }

        let overridden = prompts.values().filter(|p| p.workspace_override).count();
        tracing::debug!(count = prompts.len(), overridden, "Prompt library loaded");

        Ok(Self { prompts })
    }

    /// Built-in prompts only, ignoring any workspace.
    pub fn builtin() -> AppResult<Self> {
        let mut prompts = HashMap::new();
        for (id, _) in BUILTIN_PROMPTS {
            let definition = crate::loader::load_builtin(id)?;
            prompts.insert(
                id.to_string(),
                LoadedPrompt {
                    definition,
                    workspace_override: false,
                },
            );
        }
        Ok(Self { prompts })
    }

    /// Look up a prompt by ID.
    pub fn get(&self, prompt_id: &str) -> AppResult<&LoadedPrompt> {
        self.prompts
            .get(prompt_id)
            .ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", prompt_id)))
    }

    /// Render a prompt with the given variables.
    pub fn render(&self, prompt_id: &str, variables: &[(&str, &str)]) -> AppResult<BuiltPrompt> {
        let prompt = self.get(prompt_id)?;
        let vars = variables
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        build_prompt(prompt, vars)
    }
}
