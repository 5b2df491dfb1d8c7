//! Core domain types and utilities for chat-relay.
//!
//! This crate provides the foundational types and error handling shared by
//! the conversation store, the upstream completion client and the relay
//! server.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ConversationId, MessageId, ParseIdError};
