//! Chat orchestration
//!
//! Glues the store, the context budget policy and the language model into a
//! single `send` operation. Requests on the same conversation run one at a
//! time; different conversations proceed concurrently.

use super::models::{ConversationHistory, Role, Turn};
use super::store::ConversationStore;
use crate::context::{ContextBudgetManager, ContextDecision, ContextMode, ContextWarning};
use crate::error::{ContextError, Result};
use crate::llm::{GenerationRequest, LanguageModel, ModelAvailability, PromptRole};
use crate::metrics::METRICS;
use crate::time_operation;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Chat session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// System instructions sent with every request
    #[serde(default = "default_instructions")]
    pub instructions: String,

    /// Completion cap passed to the model
    #[serde(default)]
    pub max_response_tokens: Option<usize>,
}

fn default_instructions() -> String {
    "You are a helpful assistant. Answer clearly and concisely.".to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            instructions: default_instructions(),
            max_response_tokens: None,
        }
    }
}

/// Assistant reply plus how its context was built
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub text: String,
    pub mode: ContextMode,
    pub estimated_tokens: usize,
    pub degraded: bool,
    pub warnings: Vec<ContextWarning>,
}

impl ChatReply {
    /// Whether the UI should warn that context was cut or degraded
    pub fn has_context_warning(&self) -> bool {
        self.degraded || !self.warnings.is_empty()
    }
}

pub struct ChatOrchestrator {
    store: Arc<ConversationStore>,
    context: ContextBudgetManager,
    model: Arc<dyn LanguageModel>,
    config: ChatConfig,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl ChatOrchestrator {
    pub fn new(
        store: Arc<ConversationStore>,
        context: ContextBudgetManager,
        model: Arc<dyn LanguageModel>,
        config: ChatConfig,
    ) -> Self {
        Self {
            store,
            context,
            model,
            config,
            locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn context(&self) -> &ContextBudgetManager {
        &self.context
    }

    /// Send a user message and return the assistant's reply.
    ///
    /// `availability` is the caller's current view of the model; nothing is
    /// recorded when it reports the model as unavailable or when building the
    /// context is cancelled. Once the model has been called, the user turn
    /// stays in the history even if generation fails.
    pub async fn send(
        &self,
        conversation_id: Uuid,
        text: &str,
        availability: &ModelAvailability,
    ) -> Result<ChatReply> {
        if let ModelAvailability::Unavailable(reason) = availability {
            return Err(ContextError::ModelUnavailable(reason.to_string()));
        }

        let lock = self.lock_for(conversation_id);
        let _guard = lock.lock().await;

        let user_turn = Turn::user(text);
        let mut history = self.store.history(conversation_id)?;
        history.push(user_turn.clone());

        let decision = self.context.decide(&history).await?;
        self.store.append(conversation_id, user_turn)?;
        if decision.degraded {
            warn!(
                "Conversation {} is using degraded context ({} of {} turns)",
                conversation_id,
                decision.turns().len(),
                history.len()
            );
        }

        let request = self.build_request(&decision);
        debug!(
            "Sending {} messages to model ({} estimated tokens, mode: {})",
            request.messages.len(),
            decision.estimated_tokens,
            decision.mode.as_str()
        );

        let generated = time_operation!(
            METRICS.model_request_duration,
            "chat",
            self.model.generate(&request).await
        );
        METRICS.record_model_request(generated.is_ok());
        let reply = generated?;

        self.store
            .append(conversation_id, Turn::assistant(reply.clone()))?;
        info!(
            "Conversation {} answered ({} tokens of context)",
            conversation_id, decision.estimated_tokens
        );

        Ok(ChatReply {
            text: reply,
            mode: decision.mode,
            estimated_tokens: decision.estimated_tokens,
            degraded: decision.degraded,
            warnings: decision.warnings,
        })
    }

    /// Delete a conversation and everything it owns
    pub fn delete_conversation(&self, conversation_id: Uuid) -> Result<()> {
        self.store.delete(conversation_id)?;
        self.locks.remove(&conversation_id);
        Ok(())
    }

    /// Preview the decision the next request would get, without sending
    pub fn preview(&self, conversation_id: Uuid) -> Result<ContextDecision> {
        let history: ConversationHistory = self.store.history(conversation_id)?;
        Ok(self.context.evaluate(&history))
    }

    fn lock_for(&self, conversation_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(conversation_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn build_request(&self, decision: &ContextDecision) -> GenerationRequest {
        let instructions = match decision.summary() {
            Some(summary) => format!(
                "{}\n\nSummary of the earlier conversation:\n{}",
                self.config.instructions, summary
            ),
            None => self.config.instructions.clone(),
        };

        let mut request = GenerationRequest::new(instructions);
        for turn in decision.turns() {
            let role = match turn.role() {
                Role::User => PromptRole::User,
                Role::Assistant => PromptRole::Assistant,
            };
            request = request.message(role, turn.text());
        }

        if let Some(max_tokens) = self.config.max_response_tokens {
            request = request.max_tokens(max_tokens);
        }
        request
    }
}
