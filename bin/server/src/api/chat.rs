//! The streaming chat endpoint.
//!
//! Validation and the upstream handshake happen before any response bytes
//! are written, so those failures still get a proper status code. Once the
//! event stream is committed the relay runs on its own task and the only
//! signal left to the client is the connection closing.

use super::AppState;
use super::conversations::parse_id;
use crate::error::ApiError;
use crate::relay::{Delivery, RelaySession};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::header,
    response::{
        IntoResponse,
        sse::{Event, Sse},
    },
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tracing::{Instrument, info_span};

/// Body of `POST /api/conversations/{id}/chat`.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// Takes the fragment for the response body, which is what marks it as
/// emitted for the relay.
fn fragment_event(delivery: Delivery) -> Result<Event, axum::Error> {
    let fragment = delivery.accept();
    Event::default()
        .event("message")
        .json_data(serde_json::json!({ "content": fragment.text }))
}

/// `POST /api/conversations/{id}/chat`
pub async fn stream_chat(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&raw_id)?;
    state.store.get(id).await?;

    let request: ChatRequest =
        serde_json::from_slice(&body).map_err(|e| ApiError::Validation {
            reason: e.to_string(),
        })?;

    let span = info_span!("chat_exchange", conversation_id = %id);
    let guard = state
        .exchange_locks
        .acquire(id)
        .instrument(span.clone())
        .await;

    let mut session = RelaySession::new(id, state.store.clone(), state.backend.clone())
        .with_exchange_guard(guard);
    let decoder = session
        .start(request.message)
        .instrument(span.clone())
        .await?;

    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(session.run(decoder, tx).instrument(span));

    let events = ReceiverStream::new(rx).map(fragment_event);
    Ok(([(header::CONNECTION, "keep-alive")], Sse::new(events)))
}
