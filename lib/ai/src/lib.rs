//! Upstream completion primitives for chat-relay.
//!
//! This crate provides the two pieces the relay needs from the model side:
//!
//! - **Completion Backend**: opens one streamed chat-completion request and
//!   hands back the raw response body as a byte stream
//! - **Chunk Decoder**: turns that byte stream into an ordered, single-pass
//!   sequence of text fragments
//!
//! The decoder knows nothing about HTTP and the backend knows nothing about
//! the record format, so either side can be swapped independently.

pub mod backend;
pub mod decoder;
pub mod error;
pub mod openai;

pub use backend::{ChatMessage, ChatRole, CompletionBackend, CompletionStream, UpstreamConfig};
pub use decoder::{ChunkDecoder, StreamFragment};
pub use error::{DecodeError, UpstreamError};
pub use openai::OpenAiCompatibleBackend;
