//! In-memory conversation store
//!
//! Conversations own their turns: deleting a conversation drops its whole
//! history with it.

use super::models::{Conversation, ConversationHistory, ConversationSummary, Turn};
use crate::error::{ContextError, Result};
use crate::metrics::METRICS;
use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

/// Concurrent map of conversations keyed by id
#[derive(Default)]
pub struct ConversationStore {
    conversations: DashMap<Uuid, Conversation>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty conversation and return its id
    pub fn create(&self, title: impl Into<String>) -> Uuid {
        let conversation = Conversation::new(title);
        let id = conversation.id;
        self.conversations.insert(id, conversation);
        METRICS.conversations_created.inc();
        info!("Created conversation {}", id);
        id
    }

    /// Append a turn to the end of a conversation's history
    pub fn append(&self, id: Uuid, turn: Turn) -> Result<()> {
        let mut entry = self
            .conversations
            .get_mut(&id)
            .ok_or(ContextError::ConversationNotFound(id))?;
        debug!("Appending {} turn to {}", turn.role(), id);
        entry.history.push(turn);
        Ok(())
    }

    /// Snapshot of a conversation's history
    pub fn history(&self, id: Uuid) -> Result<ConversationHistory> {
        self.conversations
            .get(&id)
            .map(|c| c.history.clone())
            .ok_or(ContextError::ConversationNotFound(id))
    }

    pub fn get(&self, id: Uuid) -> Result<Conversation> {
        self.conversations
            .get(&id)
            .map(|c| c.value().clone())
            .ok_or(ContextError::ConversationNotFound(id))
    }

    pub fn rename(&self, id: Uuid, title: impl Into<String>) -> Result<()> {
        let mut entry = self
            .conversations
            .get_mut(&id)
            .ok_or(ContextError::ConversationNotFound(id))?;
        entry.title = title.into();
        Ok(())
    }

    /// All conversations, newest first
    pub fn list(&self) -> Vec<ConversationSummary> {
        let mut summaries: Vec<_> = self
            .conversations
            .iter()
            .map(|c| ConversationSummary {
                id: c.id,
                title: c.title.clone(),
                created_at: c.created_at,
                turn_count: c.history.len(),
            })
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries
    }

    /// Remove a conversation together with all of its turns
    pub fn delete(&self, id: Uuid) -> Result<Conversation> {
        let (_, conversation) = self
            .conversations
            .remove(&id)
            .ok_or(ContextError::ConversationNotFound(id))?;
        METRICS.conversations_deleted.inc();
        info!(
            "Deleted conversation {} with {} turns",
            id,
            conversation.history.len()
        );
        Ok(conversation)
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Role;

    #[test]
    fn test_create_and_append() {
        let store = ConversationStore::new();
        let id = store.create("Rust questions");

        store.append(id, Turn::user("what is a trait?")).unwrap();
        store.append(id, Turn::assistant("a shared interface")).unwrap();

        let history = store.history(id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.turns()[0].role(), Role::User);
        assert_eq!(history.turns()[1].text(), "a shared interface");
    }

    #[test]
    fn test_delete_cascades_turns() {
        let store = ConversationStore::new();
        let id = store.create("temp");
        store.append(id, Turn::user("hello")).unwrap();

        let removed = store.delete(id).unwrap();
        assert_eq!(removed.history.len(), 1);
        assert!(store.is_empty());
        assert!(matches!(
            store.history(id),
            Err(ContextError::ConversationNotFound(missing)) if missing == id
        ));
        assert!(store.append(id, Turn::user("again")).is_err());
    }

    #[test]
    fn test_unknown_conversation() {
        let store = ConversationStore::new();
        let id = Uuid::new_v4();
        assert!(store.get(id).is_err());
        assert!(store.rename(id, "x").is_err());
        assert!(store.delete(id).is_err());
    }

    #[test]
    fn test_list_and_rename() {
        let store = ConversationStore::new();
        let first = store.create("first");
        let second = store.create("second");
        store.append(second, Turn::user("hi")).unwrap();
        store.rename(first, "renamed").unwrap();

        let listed = store.list();
        assert_eq!(listed.len(), 2);
        let renamed = listed.iter().find(|c| c.id == first).unwrap();
        assert_eq!(renamed.title, "renamed");
        let with_turn = listed.iter().find(|c| c.id == second).unwrap();
        assert_eq!(with_turn.turn_count, 1);
    }
}
