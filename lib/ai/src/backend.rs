//! Completion backend abstraction.
//!
//! A backend issues a single streamed chat-completion request and returns
//! the response body as a byte stream. Dropping the stream releases the
//! underlying connection, which the upstream sees as a hang-up.

use crate::error::UpstreamError;
use async_trait::async_trait;
use bytes::Bytes;
use chat_relay_core::Result;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Raw response body of a streamed completion.
pub type CompletionStream = BoxStream<'static, std::result::Result<Bytes, UpstreamError>>;

/// The role of a message sender on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A message as sent to the completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message sender.
    pub role: ChatRole,
    /// The content of the message.
    pub content: String,
}

impl ChatMessage {
    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Connection settings for the completion endpoint.
///
/// Fixed at process start. A missing API key is not an error here; the
/// endpoint rejects the first request instead.
#[derive(Clone)]
pub struct UpstreamConfig {
    /// Base URL of the API (e.g. `https://api.openai.com/v1`).
    pub base_url: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Bearer credential, if any.
    pub api_key: Option<String>,
    /// Upper bound on establishing the TCP/TLS connection.
    pub connect_timeout: Duration,
}

impl UpstreamConfig {
    /// Creates a configuration with the default connect timeout.
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Sets the API key. Empty keys are treated as absent.
    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.is_empty());
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Returns the chat-completions URL derived from the base URL.
    #[must_use]
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Trait for streamed completion backends.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Opens a streamed completion over the full message history.
    ///
    /// Resolves once the upstream has answered with headers.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be reached or answers with a
    /// non-success status. No retry is attempted.
    async fn stream_completion(
        &self,
        history: &[ChatMessage],
    ) -> Result<CompletionStream, UpstreamError>;

    /// Returns the model name.
    fn model(&self) -> &str;
}
