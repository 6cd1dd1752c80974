//! Test doubles shared by unit and scenario tests.

use crate::agent::{TabularAgent, TabularAnswer};
use ragchart_core::{AppError, AppResult};
use ragchart_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Model double that hands out queued replies in order.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<Result<&str, &str>>) -> Self {
        Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(*r)).collect())
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let next = self.replies.lock().unwrap().pop_front();

        match next {
            Some(Ok(text)) => Ok(LlmResponse {
                content: text,
                model: request.model.clone(),
                usage: LlmUsage::new(10, 5),
            }),
            Some(Err(cause)) => Err(AppError::Llm(cause)),
            None => Err(AppError::Llm("no scripted reply left".to_string())),
        }
    }
}

/// Tabular agent double with a fixed answer.
pub struct ScriptedAgent {
    reply: Result<String, String>,
    calls: AtomicUsize,
}

impl ScriptedAgent {
    pub fn answering(output: &str) -> Self {
        Self {
            reply: Ok(output.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(cause: &str) -> Self {
        Self {
            reply: Err(cause.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TabularAgent for ScriptedAgent {
    async fn invoke(&self, _question: &str) -> AppResult<TabularAnswer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Ok(output) => Ok(TabularAnswer {
                output: output.clone(),
            }),
            Err(cause) => Err(AppError::Database(cause.clone())),
        }
    }
}
