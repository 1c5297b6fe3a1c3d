//! Context-window budgeting for chat sessions
//!
//! Before every model request the [`context::ContextBudgetManager`] decides
//! whether the whole conversation fits the token budget or older turns have
//! to be condensed into a summary, and degrades to a sliding window of
//! recent turns when summarization is not possible.

pub mod config;
pub mod context;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod logging;
pub mod metrics;

pub use error::{ContextError, Result};

pub mod prelude {
    pub use crate::config::Config;
    pub use crate::context::{
        ContextBudgetManager, ContextDecision, ContextMode, ContextPayload, ContextWarning,
        Summarizer, SummarizerError, TokenBudget, TokenBudgetConfig, TokenBudgetManager,
        TokenEstimator, WordBasedEstimator,
    };
    pub use crate::conversation::{
        ChatOrchestrator, ChatReply, ConversationHistory, ConversationStore, Role, Turn,
    };
    pub use crate::error::{ContextError, Result};
    pub use crate::llm::{LanguageModel, ModelAvailability, ModelError};
}
