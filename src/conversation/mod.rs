//! Conversations, their turns, and the chat flow built on top of them

pub mod models;
pub mod orchestrator;
pub mod store;

pub(crate) use models::join_texts;
pub use models::{Conversation, ConversationHistory, ConversationSummary, Role, Turn};
pub use orchestrator::{ChatConfig, ChatOrchestrator, ChatReply};
pub use store::ConversationStore;
