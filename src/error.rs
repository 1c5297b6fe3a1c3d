//! Crate-level error type

use thiserror::Error;
use uuid::Uuid;

use crate::context::BudgetError;
use crate::llm::ModelError;

/// Convenience result alias used across the crate
pub type Result<T> = std::result::Result<T, ContextError>;

/// Errors surfaced by the context manager and the chat orchestrator
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Budget(#[from] BudgetError),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(Uuid),

    #[error("Language model unavailable: {0}")]
    ModelUnavailable(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for ContextError {
    fn from(err: config::ConfigError) -> Self {
        ContextError::Configuration(err.to_string())
    }
}
