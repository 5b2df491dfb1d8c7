//! OpenAI-compatible streaming completion backend.

use crate::backend::{ChatMessage, CompletionBackend, CompletionStream, UpstreamConfig};
use crate::error::UpstreamError;
use async_trait::async_trait;
use chat_relay_core::Result;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use serde::Serialize;
use tracing::{debug, instrument, warn};

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

/// Backend for any endpoint speaking the OpenAI chat-completions protocol.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleBackend {
    client: reqwest::Client,
    config: UpstreamConfig,
    endpoint: String,
}

impl OpenAiCompatibleBackend {
    /// Creates a backend from configuration.
    ///
    /// Only a connect timeout is applied; the response body is streamed for
    /// as long as the upstream keeps it open.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| UpstreamError::InvalidConfig {
                reason: e.to_string(),
            })?;

        if config.api_key.is_none() {
            warn!("no upstream API key configured; requests will be sent unauthenticated");
        }

        let endpoint = config.completions_url();
        Ok(Self {
            client,
            config,
            endpoint,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionBackend for OpenAiCompatibleBackend {
    #[instrument(skip(self, history), fields(model = %self.config.model, messages = history.len()))]
    async fn stream_completion(
        &self,
        history: &[ChatMessage],
    ) -> Result<CompletionStream, UpstreamError> {
        let body = CompletionRequest {
            model: &self.config.model,
            messages: history,
            stream: true,
        };

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "text/event-stream")
            .json(&body);

        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| {
            warn!(
                error = %e,
                endpoint = %self.endpoint,
                "Failed to reach completion endpoint"
            );
            if e.is_timeout() {
                UpstreamError::Timeout {
                    endpoint: self.endpoint.clone(),
                }
            } else {
                UpstreamError::Connection {
                    endpoint: self.endpoint.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(
                endpoint = %self.endpoint,
                status = %status,
                body = %body,
                "Completion endpoint returned error"
            );
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        debug!(endpoint = %self.endpoint, "Completion stream opened");

        Ok(response
            .bytes_stream()
            .map(|chunk| {
                chunk.map_err(|e| UpstreamError::Transport {
                    reason: e.to_string(),
                })
            })
            .boxed())
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}
