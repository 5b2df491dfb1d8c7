//! Error types for the AI crate.
//!
//! - `UpstreamError`: failures opening or reading the completion stream
//! - `DecodeError`: malformed or truncated stream content
//!
//! Opening the stream returns `UpstreamError` wrapped in a rootcause
//! `Report` so the server can add exchange context. Decode errors never
//! leave the relay; they end the stream quietly.

use std::fmt;

/// Errors from the upstream completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// The endpoint answered with a non-success status.
    Status { status: u16, body: String },
    /// Timed out connecting to the endpoint.
    Timeout { endpoint: String },
    /// Could not reach the endpoint.
    Connection { endpoint: String, reason: String },
    /// Reading the response body failed after headers arrived.
    Transport { reason: String },
    /// The client could not be constructed from configuration.
    InvalidConfig { reason: String },
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { status, body } => {
                write!(f, "upstream returned HTTP {status}: {body}")
            }
            Self::Timeout { endpoint } => {
                write!(f, "timed out connecting to '{endpoint}'")
            }
            Self::Connection { endpoint, reason } => {
                write!(f, "failed to connect to '{endpoint}': {reason}")
            }
            Self::Transport { reason } => {
                write!(f, "upstream stream read failed: {reason}")
            }
            Self::InvalidConfig { reason } => {
                write!(f, "invalid upstream configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for UpstreamError {}

/// Errors from decoding the upstream partial-response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A complete line was not valid UTF-8.
    InvalidUtf8,
    /// A complete record could not be parsed.
    MalformedRecord { reason: String },
    /// The stream ended inside a record.
    Truncated { pending_bytes: usize },
    /// A single record grew past the size limit without a line break.
    RecordTooLarge { limit: usize },
    /// The upstream reported an error inside the stream.
    UpstreamReported { message: String },
    /// The underlying byte stream failed.
    Transport { reason: String },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUtf8 => write!(f, "stream record is not valid UTF-8"),
            Self::MalformedRecord { reason } => {
                write!(f, "malformed stream record: {reason}")
            }
            Self::Truncated { pending_bytes } => {
                write!(f, "stream ended mid-record ({pending_bytes} bytes pending)")
            }
            Self::RecordTooLarge { limit } => {
                write!(f, "stream record exceeds {limit} bytes")
            }
            Self::UpstreamReported { message } => {
                write!(f, "upstream reported an error mid-stream: {message}")
            }
            Self::Transport { reason } => {
                write!(f, "stream transport failed: {reason}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}
