//! Context management with token budget enforcement
//!
//! This module decides, for every outgoing model request, whether the full
//! conversation history fits the token budget or older turns have to be
//! condensed into a summary.

pub mod budget_manager;
pub mod models;
pub mod summarizer;
pub mod token_budget;
pub mod token_estimator;

pub use budget_manager::ContextBudgetManager;
pub use models::{ContextDecision, ContextMode, ContextPayload, ContextWarning, TruncationTarget};
pub use summarizer::{ModelSummarizer, Summarizer, SummarizerConfig, SummarizerError};
pub use token_budget::{
    BudgetError, EstimatorKind, TokenBudget, TokenBudgetConfig, TokenBudgetManager,
};
pub use token_estimator::{
    truncate_to_tokens, TiktokenEstimator, TokenEstimator, WordBasedEstimator,
};
