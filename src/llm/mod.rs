//! Language model session abstraction
//!
//! The model is opaque to the rest of the crate: one async `generate` call
//! that either returns text or one of a small set of failures. Availability
//! is explicit state handed to callers, never a global flag.

pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use client::{ModelConfig, OpenAiCompatibleModel};

/// Role of a message inside a generation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: PromptRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A single request to the model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// System instructions for the session
    pub instructions: String,
    pub messages: Vec<PromptMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
}

impl GenerationRequest {
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            ..Self::default()
        }
    }

    pub fn message(mut self, role: PromptRole, content: impl Into<String>) -> Self {
        self.messages.push(PromptMessage::new(role, content));
        self
    }

    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Model failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Guardrail violation: {0}")]
    GuardrailViolation(String),

    #[error("Unsupported locale: {0}")]
    UnsupportedLocale(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Capability interface over a language model session
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ModelError>;
}

/// Why the model cannot serve requests right now
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum UnavailableReason {
    DeviceNotEligible,
    ModelNotReady,
    Other(String),
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::DeviceNotEligible => f.write_str("device not eligible"),
            UnavailableReason::ModelNotReady => f.write_str("model not ready"),
            UnavailableReason::Other(detail) => f.write_str(detail),
        }
    }
}

/// Model availability as observed by the caller at request time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelAvailability {
    Available,
    Unavailable(UnavailableReason),
}

impl ModelAvailability {
    pub fn is_available(&self) -> bool {
        matches!(self, ModelAvailability::Available)
    }
}
