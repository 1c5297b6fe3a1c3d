//! History summarization

use crate::conversation::Turn;
use crate::llm::{GenerationRequest, LanguageModel, ModelError, PromptRole};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Summarizer trait for different summarization strategies
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Condense `turns` into a single summary aiming for `target_tokens`
    async fn summarize(&self, turns: &[Turn], target_tokens: usize)
        -> Result<String, SummarizerError>;
}

/// Summarizer errors
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SummarizerError {
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Guardrail violation: {0}")]
    GuardrailViolation(String),

    #[error("Unsupported locale: {0}")]
    UnsupportedLocale(String),

    #[error("Summarization timed out after {0:?}")]
    Timeout(Duration),

    #[error("Summarization cancelled")]
    Cancelled,
}

impl From<ModelError> for SummarizerError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::ModelUnavailable(msg) => SummarizerError::ModelUnavailable(msg),
            ModelError::GuardrailViolation(msg) => SummarizerError::GuardrailViolation(msg),
            ModelError::UnsupportedLocale(msg) => SummarizerError::UnsupportedLocale(msg),
            ModelError::InvalidResponse(msg) => SummarizerError::ModelUnavailable(msg),
        }
    }
}

/// Configuration for the model-backed summarizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    #[serde(default = "default_instructions")]
    pub instructions: String,
}

fn default_instructions() -> String {
    "You are a concise summarizer. Condense the conversation so it can replace \
     the original turns as context for continuing the chat."
        .to_string()
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            instructions: default_instructions(),
        }
    }
}

/// Summarizer that asks a [`LanguageModel`] for the summary
pub struct ModelSummarizer {
    model: Arc<dyn LanguageModel>,
    config: SummarizerConfig,
}

impl ModelSummarizer {
    pub fn new(model: Arc<dyn LanguageModel>, config: SummarizerConfig) -> Self {
        Self { model, config }
    }

    /// Build summarization prompt
    fn build_prompt(&self, turns: &[Turn], target_tokens: usize) -> String {
        let transcript = turns
            .iter()
            .map(|t| format!("{}: {}", t.role(), t.text()))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Summarize the following conversation. Keep names, decisions, open \
            questions and anything the user asked to remember. \
            Keep the summary under {} tokens.\n\n{}",
            target_tokens, transcript
        )
    }
}

#[async_trait]
impl Summarizer for ModelSummarizer {
    async fn summarize(
        &self,
        turns: &[Turn],
        target_tokens: usize,
    ) -> Result<String, SummarizerError> {
        if turns.is_empty() {
            return Ok(String::new());
        }

        debug!("Summarizing {} turns, target: {} tokens", turns.len(), target_tokens);

        let request = GenerationRequest::new(self.config.instructions.clone())
            .message(PromptRole::User, self.build_prompt(turns, target_tokens))
            .max_tokens(target_tokens);

        let summary = self.model.generate(&request).await?;
        Ok(summary.trim().to_string())
    }
}
