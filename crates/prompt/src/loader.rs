//! Prompt loader for built-in and workspace YAML prompt definitions.

use crate::types::{LoadedPrompt, PromptDefinition};
use ragchart_core::{config::STATE_DIR, AppError, AppResult};
use std::path::{Path, PathBuf};

/// Prompt definitions compiled into the binary.
pub const BUILTIN_PROMPTS: &[(&str, &str)] = &[
    (
        "answer.grounded",
        include_str!("../prompts/answer.grounded.yml"),
    ),
    ("chart.code", include_str!("../prompts/chart.code.yml")),
    ("chart.explain", include_str!("../prompts/chart.explain.yml")),
    ("agent.sql", include_str!("../prompts/agent.sql.yml")),
    ("agent.answer", include_str!("../prompts/agent.answer.yml")),
];

/// Directory holding workspace prompt overrides.
pub fn prompts_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(STATE_DIR).join("prompts")
}

/// Load a prompt definition by ID.
///
/// A file named `<id>.yml` in `.ragchart/prompts/` takes precedence over
/// the built-in definition of the same ID.
///
/// # Example
/// ```no_run
/// use ragchart_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "answer.grounded")?;
/// println!("Loaded prompt: {}", prompt.definition.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<LoadedPrompt> {
    let prompt_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));

    if prompt_file.exists() {
        tracing::debug!("Loading prompt override from: {:?}", prompt_file);

        let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
            AppError::Prompt(format!(
                "Failed to read prompt file {:?}: {}",
                prompt_file, e
            ))
        })?;

        let definition = parse_prompt(&contents, prompt_id).map_err(|e| {
            AppError::Prompt(format!("Invalid prompt file {:?}: {}", prompt_file, e))
        })?;

        tracing::info!("Loaded prompt override: {} ({})", definition.id, definition.title);

        return Ok(LoadedPrompt {
            definition,
            workspace_override: true,
        });
    }

    Ok(LoadedPrompt {
        definition: load_builtin(prompt_id)?,
        workspace_override: false,
    })
}

/// Load a built-in prompt definition by ID.
pub fn load_builtin(prompt_id: &str) -> AppResult<PromptDefinition> {
    let contents = BUILTIN_PROMPTS
        .iter()
        .find(|(id, _)| *id == prompt_id)
        .map(|(_, yaml)| *yaml)
        .ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", prompt_id)))?;

    parse_prompt(contents, prompt_id)
        .map_err(|e| AppError::Prompt(format!("Invalid built-in prompt {}: {}", prompt_id, e)))
}

/// List all available prompt IDs, built-in and workspace, sorted.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<String>> {
    let mut prompt_ids: Vec<String> = BUILTIN_PROMPTS
        .iter()
        .map(|(id, _)| id.to_string())
        .collect();

    let dir = prompts_dir(workspace_path);
    if dir.exists() {
        for entry in walkdir::WalkDir::new(&dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    prompt_ids.push(stem.to_string());
                }
            }
        }
    }

    prompt_ids.sort();
    prompt_ids.dedup();
    Ok(prompt_ids)
}

fn parse_prompt(contents: &str, expected_id: &str) -> AppResult<PromptDefinition> {
    let definition: PromptDefinition = serde_yaml::from_str(contents)
        .map_err(|e| AppError::Prompt(format!("Failed to parse prompt YAML: {}", e)))?;

    validate_prompt(&definition)?;

    if definition.id != expected_id {
        return Err(AppError::Prompt(format!(
            "Prompt id '{}' does not match requested id '{}'",
            definition.id, expected_id
        )));
    }

    Ok(definition)
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.trim().is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    Ok(())
}
