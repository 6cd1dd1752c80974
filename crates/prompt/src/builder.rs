//! Prompt builder for rendering templates.

use crate::types::{BuiltPrompt, BuiltPromptMetadata, LoadedPrompt};
use ragchart_core::{AppError, AppResult};
use handlebars::Handlebars;
use std::collections::HashMap;

/// Build a prompt from a loaded definition and input variables.
///
/// Declared input variables the caller leaves out render as empty strings,
/// so optional sections guarded by `{{#if ...}}` simply disappear.
///
/// # Example
/// ```no_run
/// use ragchart_prompt::{build_prompt, load_prompt};
/// use std::collections::HashMap;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "answer.grounded")?;
/// let mut vars = HashMap::new();
/// vars.insert("question".to_string(), "What is Rust?".to_string());
///
/// let built = build_prompt(&prompt, vars)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(
    prompt: &LoadedPrompt,
    mut variables: HashMap<String, String>,
) -> AppResult<BuiltPrompt> {
    let definition = &prompt.definition;
    tracing::debug!("Building prompt: {}", definition.id);

    for name in &definition.input.variables {
        if !variables.contains_key(name) {
            tracing::debug!(prompt = %definition.id, variable = %name, "Variable not supplied");
            variables.insert(name.clone(), String::new());
        }
    }

    let user = render_template(&definition.template, &variables)?;

    Ok(BuiltPrompt {
        user,
        temperature: definition.behavior.temperature,
        max_tokens: definition.behavior.max_tokens,
        metadata: BuiltPromptMetadata {
            source_prompt_id: definition.id.clone(),
            workspace_override: prompt.workspace_override,
            resolved_variables: variables,
        },
    })
}

/// Render a Handlebars template with variables.
fn render_template(template: &str, variables: &HashMap<String, String>) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Prompts are plain text; HTML escaping would mangle quotes and code.
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    let rendered = handlebars
        .render("prompt", &variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))?;

    Ok(rendered)
}
