//! Conversation bookkeeping handlers.

use super::AppState;
use crate::error::ApiError;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chat_relay_core::ConversationId;
use std::sync::Arc;
use tracing::info;

/// Parses a path id. Anything unparseable is simply an unknown conversation.
pub(super) fn parse_id(raw: &str) -> Result<ConversationId, ApiError> {
    raw.parse().map_err(|_| ApiError::NotFound {
        id: raw.to_string(),
    })
}

pub async fn health() -> &'static str {
    "ok"
}

/// `POST /api/conversations`
pub async fn create(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let conversation = state.store.create().await;
    info!(conversation_id = %conversation.id, "Created conversation");
    (StatusCode::CREATED, Json(conversation))
}

/// `GET /api/conversations`
pub async fn list(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store.list().await)
}

/// `DELETE /api/conversations/{id}`
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&raw_id)?;
    state.store.delete(id).await?;
    info!(conversation_id = %id, "Deleted conversation");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::api::tests::{TestApp, body_json, body_text};
    use crate::test_support::FakeBackend;
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
    };
    use chat_relay_conversation::ConversationStore;
    use chat_relay_core::ConversationId;

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn create_returns_empty_conversation() {
        let app = TestApp::new(FakeBackend::chunks(vec![]));
        let response = app.send(request(Method::POST, "/api/conversations")).await;

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert!(body["id"].as_str().unwrap().starts_with("conv_"));
        assert_eq!(body["messages"], serde_json::json!([]));
        assert!(body["created_at"].is_i64());
        assert_eq!(app.store.len(), 1);
    }

    #[tokio::test]
    async fn list_returns_all_conversations() {
        let app = TestApp::new(FakeBackend::chunks(vec![]));
        let first = app.store.create().await;
        let second = app.store.create().await;

        let response = app.send(request(Method::GET, "/api/conversations")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let mut ids: Vec<_> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["id"].as_str().unwrap().to_string())
            .collect();
        ids.sort();
        let mut expected = vec![first.id.to_string(), second.id.to_string()];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn delete_removes_conversation() {
        let app = TestApp::new(FakeBackend::chunks(vec![]));
        let conversation = app.store.create().await;
        let uri = format!("/api/conversations/{}", conversation.id);

        let response = app.send(request(Method::DELETE, &uri)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(app.store.is_empty());

        let response = app.send(request(Method::DELETE, &uri)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_unknown_or_invalid_id_is_404() {
        let app = TestApp::new(FakeBackend::chunks(vec![]));

        let uri = format!("/api/conversations/{}", ConversationId::new());
        let response = app.send(request(Method::DELETE, &uri)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"error": "conversation not found"})
        );

        let response = app
            .send(request(Method::DELETE, "/api/conversations/not-an-id"))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = TestApp::new(FakeBackend::chunks(vec![]));
        let response = app.send(request(Method::GET, "/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "ok");
    }
}
