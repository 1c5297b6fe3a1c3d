//! Data models for conversations and their turns

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One exchange unit. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    text: String,
    created_at: DateTime<Utc>,
}

impl Turn {
    /// Create a turn stamped with the current time
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self::at(role, text, Utc::now())
    }

    /// Create a turn with an explicit timestamp
    pub fn at(role: Role, text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            role,
            text: text.into(),
            created_at,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Copy of this turn with its text replaced, keeping role and timestamp.
    /// Used when a payload has to be cut to fit the hard limit; the stored
    /// turn itself is never touched.
    pub(crate) fn with_text(&self, text: String) -> Self {
        Self {
            role: self.role,
            text,
            created_at: self.created_at,
        }
    }
}

/// Append-only, chronologically ordered sequence of turns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Texts of every turn joined by a single space
    pub fn concatenated_text(&self) -> String {
        join_texts(&self.turns)
    }
}

impl From<Vec<Turn>> for ConversationHistory {
    fn from(turns: Vec<Turn>) -> Self {
        Self { turns }
    }
}

impl FromIterator<Turn> for ConversationHistory {
    fn from_iter<I: IntoIterator<Item = Turn>>(iter: I) -> Self {
        Self {
            turns: iter.into_iter().collect(),
        }
    }
}

pub(crate) fn join_texts(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(Turn::text)
        .collect::<Vec<_>>()
        .join(" ")
}

/// A conversation owns its history; deleting it deletes its turns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub history: ConversationHistory,
}

impl Conversation {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            created_at: Utc::now(),
            history: ConversationHistory::new(),
        }
    }
}

/// Lightweight listing entry for a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub turn_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_preserves_insertion_order() {
        let mut history = ConversationHistory::new();
        history.push(Turn::user("first"));
        history.push(Turn::assistant("second"));
        history.push(Turn::user("third"));

        let texts: Vec<_> = history.turns().iter().map(Turn::text).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert_eq!(history.last().unwrap().role(), Role::User);
    }

    #[test]
    fn test_concatenated_text() {
        let history: ConversationHistory =
            vec![Turn::user("hello there"), Turn::assistant("general kenobi")].into();
        assert_eq!(history.concatenated_text(), "hello there general kenobi");
    }

    #[test]
    fn test_with_text_keeps_role_and_timestamp() {
        let turn = Turn::user("a long message");
        let cut = turn.with_text("a".to_string());
        assert_eq!(cut.role(), turn.role());
        assert_eq!(cut.created_at(), turn.created_at());
        assert_eq!(cut.text(), "a");
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }
}
