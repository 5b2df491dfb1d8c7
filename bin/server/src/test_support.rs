//! Test doubles shared by the relay and API tests.

use async_trait::async_trait;
use bytes::Bytes;
use chat_relay_ai::{ChatMessage, CompletionBackend, CompletionStream, UpstreamError};
use futures::{Stream, StreamExt, stream};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

pub type UpstreamSender = mpsc::UnboundedSender<Result<Bytes, UpstreamError>>;

/// One SSE record carrying a content delta.
pub fn record(content: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({"choices": [{"delta": {"content": content}, "finish_reason": null}]})
    )
}

/// One SSE record carrying a content delta and a finish marker.
pub fn finish_record(content: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({"choices": [{"delta": {"content": content}, "finish_reason": "stop"}]})
    )
}

enum Script {
    Chunks(Vec<String>),
    Channel(Mutex<Option<mpsc::UnboundedReceiver<Result<Bytes, UpstreamError>>>>),
    Fail(UpstreamError),
}

/// Scripted completion backend.
///
/// Records every history it is called with and whether the returned stream
/// has been dropped.
pub struct FakeBackend {
    script: Script,
    calls: AtomicUsize,
    histories: Mutex<Vec<Vec<ChatMessage>>>,
    released: Arc<AtomicBool>,
}

impl FakeBackend {
    fn with_script(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            histories: Mutex::new(Vec::new()),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Streams `chunks` and then closes the body.
    pub fn chunks(chunks: Vec<String>) -> Self {
        Self::with_script(Script::Chunks(chunks))
    }

    /// Streams whatever is pushed through the returned sender. The body
    /// closes when the sender is dropped. Only one call is served.
    pub fn channel() -> (Self, UpstreamSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::with_script(Script::Channel(Mutex::new(Some(rx)))), tx)
    }

    /// Fails every call with `error`.
    pub fn failing(error: UpstreamError) -> Self {
        Self::with_script(Script::Fail(error))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_history(&self) -> Option<Vec<ChatMessage>> {
        self.histories.lock().unwrap().last().cloned()
    }

    /// Whether the most recently returned stream has been dropped.
    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionBackend for FakeBackend {
    async fn stream_completion(
        &self,
        history: &[ChatMessage],
    ) -> chat_relay_core::Result<CompletionStream, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.histories.lock().unwrap().push(history.to_vec());

        let inner: CompletionStream = match &self.script {
            Script::Chunks(chunks) => {
                let items: Vec<Result<Bytes, UpstreamError>> = chunks
                    .iter()
                    .map(|chunk| Ok(Bytes::from(chunk.clone())))
                    .collect();
                stream::iter(items).boxed()
            }
            Script::Channel(rx) => {
                let rx = rx.lock().unwrap().take().expect("channel backend serves one call");
                UnboundedReceiverStream::new(rx).boxed()
            }
            Script::Fail(error) => return Err(error.clone().into()),
        };

        self.released.store(false, Ordering::SeqCst);
        Ok(Probed {
            inner,
            released: self.released.clone(),
        }
        .boxed())
    }

    fn model(&self) -> &str {
        "fake-model"
    }
}

/// Stream wrapper that flags when it is dropped.
struct Probed {
    inner: CompletionStream,
    released: Arc<AtomicBool>,
}

impl Stream for Probed {
    type Item = Result<Bytes, UpstreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl Drop for Probed {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}
