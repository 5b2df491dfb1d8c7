//! HTTP-facing error type.
//!
//! Internal details are logged here and replaced with user-safe messages in
//! the response body, which is always `{"error": "..."}`.

use crate::relay::RelayError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chat_relay_conversation::StoreError;
use std::fmt;

/// Errors returned by API handlers before a response body is committed.
#[derive(Debug)]
pub enum ApiError {
    /// The conversation id is unknown (or not a valid id at all).
    NotFound { id: String },
    /// The request body could not be parsed.
    Validation { reason: String },
    /// The upstream call failed before streaming started.
    Upstream { details: String },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { id } => write!(f, "conversation '{id}' not found"),
            Self::Validation { reason } => write!(f, "invalid request: {reason}"),
            Self::Upstream { details } => write!(f, "upstream call failed: {details}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id } => Self::NotFound { id: id.to_string() },
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::NotFound { id } => Self::NotFound { id: id.to_string() },
            RelayError::Upstream(report) => Self::Upstream {
                details: report.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::NotFound { id } => {
                tracing::debug!(conversation_id = %id, "Conversation not found");
                (StatusCode::NOT_FOUND, "conversation not found".to_string())
            }
            Self::Validation { reason } => {
                tracing::debug!(reason = %reason, "Rejected malformed request");
                (StatusCode::BAD_REQUEST, "invalid request".to_string())
            }
            Self::Upstream { details } => {
                tracing::error!(details = %details, "Upstream completion request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "upstream completion request failed".to_string(),
                )
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
