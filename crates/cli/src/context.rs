//! Shared handles built once per invocation.

use ragchart_chart::{
    ChartCodeGenerator, ChartExplainer, ChartPipeline, SandboxRenderer, SqlAgent,
};
use ragchart_core::{config::AppConfig, AppResult};
use ragchart_knowledge::{open_index, AnswerPipeline, AnswerSynthesizer, Retriever};
use ragchart_llm::{create_client, ClientOptions, LlmClient};
use ragchart_prompt::PromptLibrary;
use std::sync::Arc;

/// Configuration plus the model client and prompts every pipeline shares.
pub struct AppContext {
    pub config: AppConfig,
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
}

impl AppContext {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;

        let options = ClientOptions {
            model: config.model.clone(),
            endpoint: config.provider_endpoint(&config.provider),
            api_key: config.resolve_api_key(&config.provider),
            timeout_secs: config.provider_timeout(&config.provider),
        };
        let llm = create_client(&config.provider, &options)?;
        let prompts = Arc::new(PromptLibrary::load(&config.workspace)?);

        tracing::debug!(
            provider = llm.provider_name(),
            model = llm.default_model(),
            "Context ready"
        );
        Ok(Self {
            config,
            llm,
            prompts,
        })
    }

    /// Model the shared client was built for.
    fn model(&self) -> &str {
        self.llm.default_model()
    }

    pub fn answer_pipeline(&self) -> AppResult<AnswerPipeline> {
        let retrieval = &self.config.retrieval;
        let synthesizer = AnswerSynthesizer::new(
            self.llm.clone(),
            self.prompts.clone(),
            self.model(),
            retrieval.max_context_chars,
        );

        Ok(AnswerPipeline::new(
            Retriever::new(open_index(&self.config)?),
            synthesizer,
            retrieval,
            self.config.refusal,
        ))
    }

    /// The chart pipeline, or `None` when charts are disabled or no database
    /// is configured.
    pub fn chart_pipeline(&self) -> AppResult<Option<ChartPipeline>> {
        if !self.config.chart.enabled {
            return Ok(None);
        }
        let Some(path) = self.config.database_path() else {
            return Ok(None);
        };

        let model = self.model();
        let agent = SqlAgent::open(
            &path,
            self.llm.clone(),
            self.prompts.clone(),
            model,
            &self.config.database,
        )?;

        Ok(Some(ChartPipeline::new(
            Arc::new(agent),
            ChartCodeGenerator::new(self.llm.clone(), self.prompts.clone(), model),
            SandboxRenderer::new(&self.config.chart)?,
            ChartExplainer::new(self.llm.clone(), self.prompts.clone(), model),
        )))
    }
}
