//! OpenAI-compatible chat completion client

use super::{GenerationRequest, LanguageModel, ModelError, PromptRole};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound for a single retry backoff
const MAX_BACKOFF_MS: u64 = 30_000;

/// Model endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// API key (read from CHAT_CONTEXT__MODEL__API_KEY if not set)
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Total attempts per request, first one included
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Base backoff in milliseconds, doubled per attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_endpoint() -> String {
    "http://localhost:8080/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_temperature() -> f32 {
    0.3
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            model: default_model(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            temperature: default_temperature(),
        }
    }
}

/// Language model reached over an OpenAI-compatible HTTP API
pub struct OpenAiCompatibleModel {
    client: Client,
    config: ModelConfig,
}

impl OpenAiCompatibleModel {
    pub fn new(config: ModelConfig) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ModelError::ModelUnavailable(format!("HTTP client init failed: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn build_body(&self, request: &GenerationRequest) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.instructions.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: request.instructions.clone(),
            });
        }
        messages.extend(request.messages.iter().map(|m| ChatMessage {
            role: role_name(m.role).to_string(),
            content: m.content.clone(),
        }));

        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: Some(self.config.temperature),
        }
    }

    async fn attempt(&self, body: &ChatCompletionRequest) -> Result<String, Attempt> {
        let mut req = self.client.post(&self.config.endpoint).json(body);

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req.send().await.map_err(|e| {
            Attempt::Retryable(ModelError::ModelUnavailable(format!("Network error: {}", e)))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = classify_error(status, &body);
            return Err(if is_retryable(status) {
                Attempt::Retryable(error)
            } else {
                Attempt::Fatal(error)
            });
        }

        let parsed = response.json::<ChatCompletionResponse>().await.map_err(|e| {
            Attempt::Fatal(ModelError::InvalidResponse(format!(
                "Failed to parse response: {}",
                e
            )))
        })?;

        let choice = parsed.choices.into_iter().next().ok_or_else(|| {
            Attempt::Fatal(ModelError::InvalidResponse("No choices in response".to_string()))
        })?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(Attempt::Fatal(ModelError::GuardrailViolation(
                "Completion stopped by content filter".to_string(),
            )));
        }

        Ok(choice.message.content)
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ModelError> {
        let body = self.build_body(request);
        let attempts = self.config.max_retries.max(1);

        debug!(
            "Generating with {} messages (model: {})",
            body.messages.len(),
            self.config.model
        );

        let mut last_error = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                debug!("Retry attempt {} for generation", attempt);
                tokio::time::sleep(backoff_delay(self.config.retry_backoff_ms, attempt)).await;
            }

            match self.attempt(&body).await {
                Ok(text) => return Ok(text),
                Err(Attempt::Fatal(error)) => return Err(error),
                Err(Attempt::Retryable(error)) => last_error = Some(error),
            }
        }

        warn!("Generation failed after {} attempts", attempts);
        Err(last_error.unwrap_or_else(|| {
            ModelError::ModelUnavailable("No attempts were made".to_string())
        }))
    }
}

enum Attempt {
    Retryable(ModelError),
    Fatal(ModelError),
}

/// Exponential backoff before retry `attempt`, capped at [`MAX_BACKOFF_MS`]
fn backoff_delay(base_ms: u64, attempt: usize) -> Duration {
    let factor = u32::try_from(attempt)
        .ok()
        .and_then(|shift| 1u64.checked_shl(shift))
        .unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS))
}

fn role_name(role: PromptRole) -> &'static str {
    match role {
        PromptRole::System => "system",
        PromptRole::User => "user",
        PromptRole::Assistant => "assistant",
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn classify_error(status: StatusCode, body: &str) -> ModelError {
    let detail = serde_json::from_str::<ApiErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error);

    let code = detail
        .as_ref()
        .and_then(|d| d.code.clone().or_else(|| d.kind.clone()))
        .unwrap_or_default();
    let message = detail
        .and_then(|d| d.message)
        .unwrap_or_else(|| body.to_string());

    match code.as_str() {
        "content_filter" | "content_policy_violation" | "guardrail_violation" => {
            ModelError::GuardrailViolation(message)
        }
        "unsupported_language" | "unsupported_locale" => ModelError::UnsupportedLocale(message),
        _ => ModelError::ModelUnavailable(format!("HTTP {}: {}", status, message)),
    }
}

// OpenAI-compatible API types
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_config_default() {
        let config = ModelConfig::default();
        assert_eq!(config.model, "gpt-3.5-turbo");
        assert_eq!(config.max_retries, 3);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_build_body_prepends_instructions() {
        let model = OpenAiCompatibleModel::new(ModelConfig::default()).unwrap();
        let request = GenerationRequest::new("be helpful").message(PromptRole::User, "hi");
        let body = model.build_body(&request);

        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[0].role, "system");
        assert_eq!(body.messages[1].content, "hi");
    }

    #[test]
    fn test_backoff_doubles_and_saturates() {
        assert_eq!(backoff_delay(100, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(100, 2), Duration::from_millis(400));
        assert_eq!(backoff_delay(100, 64), Duration::from_millis(MAX_BACKOFF_MS));
        assert_eq!(backoff_delay(100, 200), Duration::from_millis(MAX_BACKOFF_MS));
    }

    #[test]
    fn test_classify_guardrail() {
        let body = r#"{"error":{"code":"content_filter","message":"blocked"}}"#;
        assert_eq!(
            classify_error(StatusCode::BAD_REQUEST, body),
            ModelError::GuardrailViolation("blocked".to_string())
        );
    }

    #[test]
    fn test_classify_locale_from_type() {
        let body = r#"{"error":{"type":"unsupported_language","message":"nope"}}"#;
        assert!(matches!(
            classify_error(StatusCode::BAD_REQUEST, body),
            ModelError::UnsupportedLocale(_)
        ));
    }

    #[test]
    fn test_classify_unstructured_body() {
        let error = classify_error(StatusCode::SERVICE_UNAVAILABLE, "overloaded");
        assert!(matches!(error, ModelError::ModelUnavailable(msg) if msg.contains("overloaded")));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
    }
}
