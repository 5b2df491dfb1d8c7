//! Centralized server configuration.
//!
//! Loaded once at startup via the `config` crate from environment
//! variables. There is no hot reload; the upstream credential, model and
//! base URL are fixed for the life of the process.

use chat_relay_ai::UpstreamConfig;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Server configuration.
#[derive(Deserialize)]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer credential for the completion endpoint.
    /// Absence is not fatal; the endpoint rejects the first request instead.
    #[serde(default)]
    pub openai_api_key: Option<String>,

    /// Model identifier sent upstream.
    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    /// Connect timeout for the upstream, in seconds.
    #[serde(default = "default_openai_connect_timeout_seconds")]
    pub openai_connect_timeout_seconds: u64,

    /// Origin allowed by the CORS policy.
    #[serde(default = "default_cors_allowed_origin")]
    pub cors_allowed_origin: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_openai_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_connect_timeout_seconds() -> u64 {
    10
}

fn default_cors_allowed_origin() -> String {
    "http://localhost:5173".to_string()
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_environment(config::Environment::default())
    }

    fn from_environment(source: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(source.separator("__").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Returns the `host:port` pair to bind.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Builds the upstream client configuration.
    #[must_use]
    pub fn upstream(&self) -> UpstreamConfig {
        UpstreamConfig::new(&self.openai_base_url, &self.openai_model)
            .with_api_key(self.openai_api_key.clone())
            .with_connect_timeout(Duration::from_secs(self.openai_connect_timeout_seconds))
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field(
                "openai_api_key",
                &self.openai_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("openai_model", &self.openai_model)
            .field("openai_base_url", &self.openai_base_url)
            .field(
                "openai_connect_timeout_seconds",
                &self.openai_connect_timeout_seconds,
            )
            .field("cors_allowed_origin", &self.cors_allowed_origin)
            .finish()
    }
}
