//! HTTP surface: conversation bookkeeping and the streaming chat endpoint.

mod chat;
mod conversations;

use crate::config::ServerConfig;
use crate::relay::ExchangeLocks;
use axum::{
    Router,
    http::{HeaderValue, Method, header, header::InvalidHeaderValue},
    routing::{delete, get, post},
};
use chat_relay_ai::CompletionBackend;
use chat_relay_conversation::ConversationStore;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use chat::ChatRequest;

/// Shared state for all handlers.
pub struct AppState {
    pub store: Arc<dyn ConversationStore>,
    pub backend: Arc<dyn CompletionBackend>,
    pub exchange_locks: ExchangeLocks,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn ConversationStore>, backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            store,
            backend,
            exchange_locks: ExchangeLocks::new(),
        }
    }
}

/// Builds the API routes without middleware.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(conversations::health))
        .route(
            "/api/conversations",
            post(conversations::create).get(conversations::list),
        )
        .route("/api/conversations/{id}", delete(conversations::remove))
        .route("/api/conversations/{id}/chat", post(chat::stream_chat))
        .with_state(state)
}

/// Builds the full application with CORS and request tracing.
///
/// # Errors
///
/// Returns an error if the configured CORS origin is not a valid header
/// value.
pub fn app(state: Arc<AppState>, config: &ServerConfig) -> Result<Router, InvalidHeaderValue> {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_str(&config.cors_allowed_origin)?)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::AUTHORIZATION]);

    Ok(router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::test_support::FakeBackend;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, Response, StatusCode},
    };
    use chat_relay_conversation::InMemoryConversationStore;
    use serde_json::Value as JsonValue;
    use tower::ServiceExt;

    pub(crate) struct TestApp {
        pub store: Arc<InMemoryConversationStore>,
        pub backend: Arc<FakeBackend>,
        pub router: Router,
    }

    impl TestApp {
        pub(crate) fn new(backend: FakeBackend) -> Self {
            let store = Arc::new(InMemoryConversationStore::new());
            let backend = Arc::new(backend);
            let state = Arc::new(AppState::new(store.clone(), backend.clone()));
            let config = test_config();
            let router = app(state, &config).unwrap();
            Self {
                store,
                backend,
                router,
            }
        }

        pub(crate) async fn send(&self, request: Request<Body>) -> Response<Body> {
            self.router.clone().oneshot(request).await.unwrap()
        }
    }

    fn test_config() -> ServerConfig {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }

    pub(crate) async fn body_text(response: Response<Body>) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    pub(crate) async fn body_json(response: Response<Body>) -> JsonValue {
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    #[tokio::test]
    async fn cors_preflight_allows_configured_origin() {
        let app = TestApp::new(FakeBackend::chunks(vec![]));
        let response = app
            .send(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/conversations")
                    .header(header::ORIGIN, "http://localhost:5173")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:5173"
        );
        let methods = response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS]
            .to_str()
            .unwrap()
            .to_string();
        assert!(methods.contains("DELETE"));
    }

    #[tokio::test]
    async fn cors_ignores_other_origins() {
        let app = TestApp::new(FakeBackend::chunks(vec![]));
        let response = app
            .send(
                Request::builder()
                    .uri("/api/conversations")
                    .header(header::ORIGIN, "http://evil.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .is_none()
        );
    }

    #[test]
    fn invalid_cors_origin_is_rejected() {
        let mut config = test_config();
        config.cors_allowed_origin = "bad\norigin".to_string();
        let state = Arc::new(AppState::new(
            Arc::new(InMemoryConversationStore::new()),
            Arc::new(FakeBackend::chunks(vec![])),
        ));
        assert!(app(state, &config).is_err());
    }
}
