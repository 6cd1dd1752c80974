//! Retrieval-augmented answering: retrieve, assemble, synthesize.

use crate::context::ContextAssembler;
use crate::document::Document;
use crate::retriever::Retriever;
use crate::synthesizer::{Answer, AnswerSynthesizer};
use ragchart_core::{AppResult, OnRefusal, RefusalPolicy, RetrievalSettings};
use serde::Serialize;

/// Everything one answering run produced.
#[derive(Debug, Clone, Serialize)]
pub struct AskOutcome {
    pub question: String,
    /// `None` when a refusal was suppressed
    pub answer: Option<String>,
    pub sources: Vec<Document>,
    pub context_chars: usize,
    pub duration_ms: u64,
}

/// Question answering over a vector collection.
#[derive(Clone)]
pub struct AnswerPipeline {
    retriever: Retriever,
    assembler: ContextAssembler,
    synthesizer: AnswerSynthesizer,
    policy: RefusalPolicy,
    k: usize,
    threshold: f64,
}

impl AnswerPipeline {
    pub fn new(
        retriever: Retriever,
        synthesizer: AnswerSynthesizer,
        settings: &RetrievalSettings,
        policy: RefusalPolicy,
    ) -> Self {
        Self {
            retriever,
            assembler: ContextAssembler::new(settings.max_context_chars),
            synthesizer,
            policy,
            k: settings.k,
            threshold: settings.threshold,
        }
    }

    /// Override the candidate count for this pipeline.
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Override the similarity floor for this pipeline.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Answer text for `question`, or `None` when a refusal is suppressed.
    pub async fn answer(&self, question: &str) -> AppResult<Option<String>> {
        Ok(self.ask(question).await?.answer)
    }

    /// Full answering run with the surviving sources.
    ///
    /// An empty retrieval returns the configured sentinel without a model
    /// call. Errors from the index propagate; model failures do not.
    pub async fn ask(&self, question: &str) -> AppResult<AskOutcome> {
        let start = std::time::Instant::now();

        let sources = self.retriever.retrieve(question, self.k, self.threshold).await?;

        let (answer, context_chars) = if sources.is_empty() {
            tracing::info!(
                threshold = self.threshold,
                "No documents above the similarity threshold"
            );
            (Some(self.policy.sentinel.text().to_string()), 0)
        } else {
            let context = self.assembler.assemble(&sources);
            let answer = self.synthesizer.synthesize(question, &context).await;
            (self.apply_policy(answer), context.chars().count())
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            sources = sources.len(),
            answered = answer.is_some(),
            duration_ms,
            "Answered question"
        );

        Ok(AskOutcome {
            question: question.to_string(),
            answer,
            sources,
            context_chars,
            duration_ms,
        })
    }

    /// Fixed sentinels always pass; only refusals the model wrote can be hidden.
    fn apply_policy(&self, answer: Answer) -> Option<String> {
        let model_refusal = matches!(answer, Answer::Synthesized(_)) && answer.is_refusal();
        if model_refusal && matches!(self.policy.on_refusal, OnRefusal::Suppress) {
            tracing::debug!("Suppressing model refusal");
            return None;
        }
        Some(answer.into_text())
    }
}
