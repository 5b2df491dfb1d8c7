//! The conversation aggregate.

use crate::message::Message;
use chat_relay_core::ConversationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An ordered chat history.
///
/// Messages are kept in strict append order. A conversation with no
/// messages is valid; that is the state right after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation identifier.
    pub id: ConversationId,
    /// Messages in append order.
    pub messages: Vec<Message>,
    /// When the conversation was created (Unix seconds on the wire).
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Creates an empty conversation with a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: ConversationId::new(),
            messages: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Appends a message to the end of the history.
    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
