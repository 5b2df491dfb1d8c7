//! Conversation storage.
//!
//! [`ConversationStore`] is the seam between the relay and wherever
//! conversations live. Every operation is atomic with respect to the other
//! operations on the same store; callers that need several operations to
//! happen together (an exchange appending a user turn and, later, the
//! assistant reply) must serialize that themselves.

use crate::conversation::Conversation;
use crate::error::StoreError;
use crate::message::Message;
use async_trait::async_trait;
use chat_relay_core::ConversationId;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Trait for conversation storage.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Creates and stores an empty conversation.
    async fn create(&self) -> Conversation;

    /// Returns a snapshot of the conversation.
    async fn get(&self, id: ConversationId) -> Result<Conversation, StoreError>;

    /// Removes a conversation.
    ///
    /// Deleting an id that is already gone reports `NotFound`.
    async fn delete(&self, id: ConversationId) -> Result<(), StoreError>;

    /// Returns a snapshot of all conversations. Order is not part of the
    /// contract.
    async fn list(&self) -> Vec<Conversation>;

    /// Appends a message to the end of a conversation's history.
    async fn append_message(&self, id: ConversationId, message: Message)
    -> Result<(), StoreError>;
}

/// Process-lifetime conversation store.
///
/// Entries are kept in a `BTreeMap` keyed by id, so `list` is stable between
/// calls. Ids created within the same millisecond sort by their random
/// component, so this is not strictly creation order.
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<BTreeMap<ConversationId, Conversation>>,
}

impl InMemoryConversationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored conversations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create(&self) -> Conversation {
        let conversation = Conversation::new();
        self.conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(conversation.id, conversation.clone());

        debug!(conversation_id = %conversation.id, "created conversation");
        conversation
    }

    async fn get(&self, id: ConversationId) -> Result<Conversation, StoreError> {
        self.conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { id })
    }

    async fn delete(&self, id: ConversationId) -> Result<(), StoreError> {
        let removed = self
            .conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);

        match removed {
            Some(_) => {
                debug!(conversation_id = %id, "deleted conversation");
                Ok(())
            }
            None => Err(StoreError::NotFound { id }),
        }
    }

    async fn list(&self) -> Vec<Conversation> {
        self.conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    async fn append_message(
        &self,
        id: ConversationId,
        message: Message,
    ) -> Result<(), StoreError> {
        let mut conversations = self
            .conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let conversation = conversations
            .get_mut(&id)
            .ok_or(StoreError::NotFound { id })?;

        debug!(
            conversation_id = %id,
            role = %message.role,
            content_len = message.content.len(),
            "appending message"
        );
        conversation.add_message(message);
        Ok(())
    }
}
