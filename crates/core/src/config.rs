//! Configuration management for ragchart.
//!
//! Configuration is merged from three sources, lowest precedence first:
//! - Defaults
//! - The workspace config file (`.ragchart/config.yaml`)
//! - Environment variables
//! - Command-line flags (applied with [`AppConfig::with_overrides`])
//!
//! The retrieval threshold, the refusal policy and the vector backend are all
//! plain settings here. Two historical deployments disagreed on them, so none
//! of them is treated as a fixed constant.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Name of the per-workspace state directory.
pub const STATE_DIR: &str = ".ragchart";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .ragchart/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Active chat provider (e.g., "ollama", "groq", "openai")
    pub provider: String,

    /// Chat model identifier
    pub model: String,

    /// API key override for the chat provider
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Emit logs as JSON lines
    pub log_json: bool,

    /// LLM provider configurations
    pub llm: Option<LlmConfig>,

    /// Document retrieval settings
    pub retrieval: RetrievalSettings,

    /// What to do when the model refuses or nothing relevant is found
    pub refusal: RefusalPolicy,

    /// Chart generation and rendering settings
    pub chart: ChartSettings,

    /// Tabular agent database settings
    pub database: DatabaseSettings,
}

/// LLM configuration from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(rename = "activeProvider")]
    pub active_provider: String,

    pub providers: HashMap<String, ProviderConfig>,
}

/// Provider-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderConfig {
    /// Any OpenAI-compatible chat completions endpoint (OpenAI, Groq).
    OpenAiCompatible {
        #[serde(rename = "apiKeyEnv")]
        api_key_env: String,
        model: String,
        endpoint: Option<String>,
        timeout: Option<u64>,
    },
    Ollama {
        endpoint: String,
        model: String,
        timeout: Option<u64>,
    },
}

impl ProviderConfig {
    /// Model configured for this provider.
    pub fn model(&self) -> &str {
        match self {
            Self::OpenAiCompatible { model, .. } | Self::Ollama { model, .. } => model,
        }
    }

    /// Custom endpoint, if any.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::OpenAiCompatible { endpoint, .. } => endpoint.as_deref(),
            Self::Ollama { endpoint, .. } => Some(endpoint.as_str()),
        }
    }

    /// Request timeout in seconds, if any.
    pub fn timeout(&self) -> Option<u64> {
        match self {
            Self::OpenAiCompatible { timeout, .. } | Self::Ollama { timeout, .. } => *timeout,
        }
    }
}

/// Which vector collection implementation backs retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// Persistent SQLite collection under `.ragchart/`
    #[default]
    Sqlite,
    /// Process-local collection, lost on exit
    Memory,
}

impl VectorBackend {
    /// Parse a backend name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" => Some(Self::Sqlite),
            "memory" | "mem" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Embedding provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EmbeddingSettings {
    /// Provider name: "trigram" or "ollama"
    pub provider: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Endpoint for HTTP providers
    pub endpoint: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "trigram".to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
            endpoint: None,
        }
    }
}

/// Document retrieval settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetrievalSettings {
    /// Vector collection backend
    pub backend: VectorBackend,

    /// Collection name inside the backend
    pub collection: String,

    /// Explicit SQLite index path (defaults to `.ragchart/index.sqlite`)
    pub index_path: Option<PathBuf>,

    /// Number of candidates requested from the index
    pub k: usize,

    /// Minimum similarity score in percent, inclusive
    pub threshold: f64,

    /// Character budget for the assembled context
    pub max_context_chars: usize,

    /// Batch size used when loading documents
    pub batch_size: usize,

    /// Embedding provider
    pub embedding: EmbeddingSettings,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            backend: VectorBackend::Sqlite,
            collection: "chatbot".to_string(),
            index_path: None,
            k: 5,
            threshold: 20.0,
            max_context_chars: 4000,
            batch_size: 50,
            embedding: EmbeddingSettings::default(),
        }
    }
}

impl RetrievalSettings {
    /// Check the ranges that retrieval relies on.
    pub fn validate(&self) -> AppResult<()> {
        if self.k == 0 {
            return Err(AppError::Config(
                "retrieval.k must be a positive integer".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.threshold) {
            return Err(AppError::Config(format!(
                "retrieval.threshold must be within [0, 100], got {}",
                self.threshold
            )));
        }
        if self.max_context_chars == 0 {
            return Err(AppError::Config(
                "retrieval.maxContextChars must be greater than zero".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(AppError::Config(
                "retrieval.batchSize must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// What the pipeline returns when the model declines to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OnRefusal {
    /// Return the refusal text as the answer
    #[default]
    Passthrough,
    /// Return no answer at all
    Suppress,
}

impl OnRefusal {
    /// Parse a policy name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "passthrough" => Some(Self::Passthrough),
            "suppress" => Some(Self::Suppress),
            _ => None,
        }
    }
}

/// Fixed refusal strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Sentinel {
    #[default]
    InsufficientInformation,
    NoRelevantSources,
}

impl Sentinel {
    /// Prefix shared by refusals written by the grounding prompt.
    pub const REFUSAL_PREFIX: &'static str = "I don't";

    /// The exact refusal text.
    pub fn text(self) -> &'static str {
        match self {
            Self::InsufficientInformation => {
                "I don't have enough information from the provided sources to answer this question."
            }
            Self::NoRelevantSources => {
                "I couldn't find sufficiently relevant information to answer your question."
            }
        }
    }
}

/// Refusal handling for the answering pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct RefusalPolicy {
    /// Behavior when the synthesized text is a refusal
    pub on_refusal: OnRefusal,

    /// Sentinel returned when retrieval finds nothing
    pub sentinel: Sentinel,
}

/// Chart generation and rendering settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChartSettings {
    /// Run the chart pipeline for chat requests
    pub enabled: bool,

    /// Raster resolution in dots per inch
    pub dpi: u32,

    /// Wall-clock limit for interpreting and rendering one chart
    pub render_timeout_secs: u64,

    /// Largest accepted code block in bytes
    pub max_code_bytes: usize,

    /// Largest accepted number of statements
    pub max_statements: usize,

    /// Largest accepted number of plotted values across all series
    pub max_points: usize,
}

impl Default for ChartSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            dpi: 200,
            render_timeout_secs: 10,
            max_code_bytes: 16 * 1024,
            max_statements: 256,
            max_points: 10_000,
        }
    }
}

/// Tabular agent database settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DatabaseSettings {
    /// SQLite database queried by the tabular agent
    pub path: Option<PathBuf>,

    /// Row cap applied to every agent query
    pub max_rows: usize,

    /// Query attempts before the agent gives up
    pub max_steps: usize,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: None,
            max_rows: 50,
            max_steps: 3,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmConfig>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    retrieval: Option<RetrievalSettings>,
    refusal: Option<RefusalPolicy>,
    chart: Option<ChartSettings>,
    database: Option<DatabaseSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    json: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(),
            model: "llama3.2:3b".to_string(),
            api_key: None,
            log_level: None,
            verbose: false,
            no_color: false,
            log_json: false,
            llm: None,
            retrieval: RetrievalSettings::default(),
            refusal: RefusalPolicy::default(),
            chart: ChartSettings::default(),
            database: DatabaseSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the workspace config file and
    /// environment variables.
    ///
    /// Environment variables:
    /// - `RAGCHART_WORKSPACE`: Override workspace path
    /// - `RAGCHART_CONFIG`: Path to config file
    /// - `RAGCHART_PROVIDER`: Chat provider
    /// - `RAGCHART_MODEL`: Chat model identifier
    /// - `RAGCHART_API_KEY`: API key
    /// - `RAGCHART_DATABASE`: SQLite database for the tabular agent
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use ragchart_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_from(None, None)
    }

    /// Like [`AppConfig::load`], with an explicit workspace and config file
    /// taking precedence over the environment.
    pub fn load_from(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(workspace) =
            workspace.or_else(|| std::env::var("RAGCHART_WORKSPACE").ok().map(PathBuf::from))
        {
            config.workspace = workspace;
        }

        config.config_file =
            config_file.or_else(|| std::env::var("RAGCHART_CONFIG").ok().map(PathBuf::from));

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.state_dir().join("config.yaml"),
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        if let Ok(provider) = std::env::var("RAGCHART_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("RAGCHART_MODEL") {
            config.model = model;
        }

        if let Ok(database) = std::env::var("RAGCHART_DATABASE") {
            config.database.path = Some(PathBuf::from(database));
        }

        config.api_key = std::env::var("RAGCHART_API_KEY").ok();
        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        self.merge_yaml_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config file {:?}: {}", path, e)))
    }

    fn merge_yaml_str(&self, contents: &str) -> Result<Self, serde_yaml::Error> {
        let config_file: ConfigFile = serde_yaml::from_str(contents)?;
        let mut result = self.clone();

        if let Some(ws) = config_file.workspace {
            if let Some(path) = ws.path {
                result.workspace = PathBuf::from(path);
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(json) = logging.json {
                result.log_json = json;
            }
        }

        if let Some(llm) = config_file.llm {
            result.provider = llm.active_provider.clone();
            if let Some(provider_config) = llm.providers.get(&llm.active_provider) {
                result.model = provider_config.model().to_string();
            }
            result.llm = Some(llm);
        }

        if let Some(retrieval) = config_file.retrieval {
            result.retrieval = retrieval;
        }
        if let Some(refusal) = config_file.refusal {
            result.refusal = refusal;
        }
        if let Some(chart) = config_file.chart {
            result.chart = chart;
        }
        if let Some(database) = config_file.database {
            result.database = database;
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables and the
    /// config file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .ragchart directory.
    pub fn state_dir(&self) -> PathBuf {
        self.workspace.join(STATE_DIR)
    }

    /// Ensure the .ragchart directory exists.
    pub fn ensure_state_dir(&self) -> AppResult<()> {
        let state_dir = self.state_dir();
        if !state_dir.exists() {
            std::fs::create_dir_all(&state_dir).map_err(|e| {
                AppError::Config(format!("Failed to create {} directory: {}", STATE_DIR, e))
            })?;
        }
        Ok(())
    }

    /// Path of the SQLite vector collection.
    pub fn index_path(&self) -> PathBuf {
        match self.retrieval.index_path {
            Some(ref path) if path.is_absolute() => path.clone(),
            Some(ref path) => self.workspace.join(path),
            None => self.state_dir().join("index.sqlite"),
        }
    }

    /// Path of the tabular agent's database, if configured.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database.path.as_ref().map(|path| {
            if path.is_absolute() {
                path.clone()
            } else {
                self.workspace.join(path)
            }
        })
    }

    /// Get a provider configuration by name.
    pub fn get_provider_config(&self, provider: &str) -> Option<ProviderConfig> {
        self.llm
            .as_ref()
            .and_then(|llm| llm.providers.get(provider).cloned())
    }

    /// Endpoint configured for a provider, if any.
    pub fn provider_endpoint(&self, provider: &str) -> Option<String> {
        self.get_provider_config(provider)
            .and_then(|pc| pc.endpoint().map(str::to_string))
    }

    /// Request timeout configured for a provider, if any.
    pub fn provider_timeout(&self, provider: &str) -> Option<u64> {
        self.get_provider_config(provider).and_then(|pc| pc.timeout())
    }

    /// Resolve the API key for a provider.
    ///
    /// `RAGCHART_API_KEY` wins; otherwise the provider's `apiKeyEnv`, and for
    /// Groq the conventional `GROQ_API_KEY`.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        if let Some(ProviderConfig::OpenAiCompatible { api_key_env, .. }) =
            self.get_provider_config(provider)
        {
            if let Ok(key) = std::env::var(&api_key_env) {
                return Some(key);
            }
        }

        match provider {
            "groq" => std::env::var("GROQ_API_KEY").ok(),
            "openai" => std::env::var("OPENAI_API_KEY").ok(),
            _ => None,
        }
    }

    /// Validate configuration for the active provider and every section.
    pub fn validate(&self) -> AppResult<()> {
        let provider = &self.provider;
        let known_providers = ["ollama", "groq", "openai"];

        if !known_providers.contains(&provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                provider,
                known_providers.join(", ")
            )));
        }

        if provider != "ollama" && self.resolve_api_key(provider).is_none() {
            return Err(AppError::Config(format!(
                "No API key found for provider '{}'",
                provider
            )));
        }

        self.retrieval.validate()?;

        if !(50..=600).contains(&self.chart.dpi) {
            return Err(AppError::Config(format!(
                "chart.dpi must be within [50, 600], got {}",
                self.chart.dpi
            )));
        }

        if self.chart.render_timeout_secs == 0 {
            return Err(AppError::Config(
                "chart.renderTimeoutSecs must be greater than zero".to_string(),
            ));
        }

        if self.database.max_steps == 0 || self.database.max_rows == 0 {
            return Err(AppError::Config(
                "database.maxSteps and database.maxRows must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.retrieval.k, 5);
        assert_eq!(config.retrieval.threshold, 20.0);
        assert_eq!(config.retrieval.max_context_chars, 4000);
        assert_eq!(config.refusal.on_refusal, OnRefusal::Passthrough);
        assert_eq!(config.chart.dpi, 200);
        assert!(!config.verbose);
    }

    #[test]
    fn test_state_dir_and_index_path() {
        let config = AppConfig::default();
        assert!(config.state_dir().ends_with(STATE_DIR));
        assert!(config.index_path().ends_with("index.sqlite"));
    }

    #[test]
    fn test_with_overrides() {
        let overridden = AppConfig::default().with_overrides(
            None,
            None,
            Some("groq".to_string()),
            Some("llama-3.3-70b-versatile".to_string()),
            None,
            true,
            false,
        );

        assert_eq!(overridden.provider, "groq");
        assert_eq!(overridden.model, "llama-3.3-70b-versatile");
        assert!(overridden.verbose);
        assert_eq!(overridden.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_merge_yaml_sections() {
        let yaml = r#"
llm:
  activeProvider: groq
  providers:
    groq:
      apiKeyEnv: GROQ_API_KEY
      model: llama-3.3-70b-versatile
      endpoint: https://api.groq.com/openai
    ollama:
      endpoint: http://localhost:11434
      model: llama3.2:3b
retrieval:
  backend: memory
  threshold: 70.0
  k: 8
refusal:
  onRefusal: suppress
  sentinel: no_relevant_sources
chart:
  dpi: 100
logging:
  color: false
"#;
        let merged = AppConfig::default().merge_yaml_str(yaml).unwrap();

        assert_eq!(merged.provider, "groq");
        assert_eq!(merged.model, "llama-3.3-70b-versatile");
        assert_eq!(merged.retrieval.backend, VectorBackend::Memory);
        assert_eq!(merged.retrieval.threshold, 70.0);
        assert_eq!(merged.retrieval.k, 8);
        // Unspecified fields keep their defaults.
        assert_eq!(merged.retrieval.max_context_chars, 4000);
        assert_eq!(merged.refusal.on_refusal, OnRefusal::Suppress);
        assert_eq!(merged.refusal.sentinel, Sentinel::NoRelevantSources);
        assert_eq!(merged.chart.dpi, 100);
        assert!(merged.no_color);
        assert_eq!(
            merged.provider_endpoint("groq"),
            Some("https://api.groq.com/openai".to_string())
        );
        assert!(matches!(
            merged.get_provider_config("ollama"),
            Some(ProviderConfig::Ollama { .. })
        ));
    }

    #[test]
    fn test_load_from_explicit_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(STATE_DIR)).unwrap();
        std::fs::write(
            dir.path().join(STATE_DIR).join("config.yaml"),
            "retrieval:\n  k: 7\nchart:\n  renderTimeoutSecs: 3\n",
        )
        .unwrap();

        let config = AppConfig::load_from(Some(dir.path().to_path_buf()), None).unwrap();
        assert_eq!(config.workspace, dir.path());
        assert_eq!(config.retrieval.k, 7);
        assert_eq!(config.chart.render_timeout_secs, 3);

        let missing = AppConfig::load_from(Some(dir.path().join("missing")), None);
        assert!(matches!(missing, Err(AppError::Config(_))));
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = AppConfig::default();
        config.provider = "unknown".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_ollama() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_retrieval_ranges() {
        let mut config = AppConfig::default();
        config.retrieval.threshold = 120.0;
        assert!(config.validate().is_err());

        config.retrieval.threshold = 100.0;
        config.retrieval.k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sentinel_texts_share_prefix_rules() {
        assert!(Sentinel::InsufficientInformation
            .text()
            .starts_with(Sentinel::REFUSAL_PREFIX));
        assert!(!Sentinel::NoRelevantSources
            .text()
            .starts_with(Sentinel::REFUSAL_PREFIX));
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(VectorBackend::parse("SQLite"), Some(VectorBackend::Sqlite));
        assert_eq!(VectorBackend::parse("memory"), Some(VectorBackend::Memory));
        assert_eq!(VectorBackend::parse("chroma"), None);
        assert_eq!(OnRefusal::parse("suppress"), Some(OnRefusal::Suppress));
        assert_eq!(OnRefusal::parse("drop"), None);
    }
}
