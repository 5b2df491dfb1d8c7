//! chat-relay HTTP server.
//!
//! This crate wires the conversation store and the upstream completion
//! backend into an axum application. The interesting part is
//! [`relay`], which drives one streamed exchange from upstream to the
//! client.

pub mod api;
pub mod config;
pub mod error;
pub mod relay;

#[cfg(test)]
pub(crate) mod test_support;
