//! Conversation history for chat-relay.
//!
//! This crate provides:
//!
//! - **Messages**: user and assistant turns, frozen once appended
//! - **Conversations**: ordered message history keyed by [`ConversationId`]
//! - **Conversation Store**: the storage seam the relay reads history from
//!   and commits replies to, with an in-process implementation
//!
//! [`ConversationId`]: chat_relay_core::ConversationId

pub mod conversation;
pub mod error;
pub mod message;
pub mod store;

pub use conversation::Conversation;
pub use error::StoreError;
pub use message::{Message, MessageRole};
pub use store::{ConversationStore, InMemoryConversationStore};
