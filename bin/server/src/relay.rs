//! The streaming relay.
//!
//! A [`RelaySession`] drives one chat exchange through
//! `Idle -> Started -> Streaming -> Finalizing -> Closed`:
//!
//! 1. `start` appends the user turn and opens the upstream stream.
//! 2. `run` decodes fragments and hands each one to the client sink,
//!    racing every decode step against client disconnection. The next
//!    record is not decoded until the client has taken the previous
//!    fragment.
//! 3. On end of stream, decode failure or disconnect, the upstream stream
//!    is dropped and the assembled reply is committed if non-empty.
//!
//! Exchanges on the same conversation are serialized through
//! [`ExchangeLocks`] so user/assistant pairs never interleave.

use chat_relay_ai::{
    ChatMessage, ChunkDecoder, CompletionBackend, CompletionStream, StreamFragment, UpstreamError,
};
use chat_relay_conversation::{ConversationStore, Message, MessageRole, StoreError};
use chat_relay_core::ConversationId;
use rootcause::Report;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedMutexGuard, mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

/// Decoder over a live upstream completion.
pub type UpstreamDecoder = ChunkDecoder<CompletionStream>;

/// Lifecycle of one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Started,
    Streaming,
    Finalizing,
    Closed,
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Started => "started",
            Self::Streaming => "streaming",
            Self::Finalizing => "finalizing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Why the streaming loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The upstream finished the completion or closed the stream.
    Completed,
    /// The upstream stream could not be decoded. Treated like a close.
    DecodeFailed,
    /// The client went away.
    ClientDisconnected,
}

/// Summary of a finished exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub stop_reason: StopReason,
    /// Fragments accepted by the client sink.
    pub fragments_emitted: usize,
    /// Concatenation of every emitted fragment.
    pub reply: String,
    /// Whether the reply was committed to the conversation.
    pub persisted: bool,
}

/// A fragment on its way to the client.
///
/// The relay counts the fragment as emitted only once the client side calls
/// [`Delivery::accept`]. Dropping a delivery unaccepted discards it.
#[derive(Debug)]
pub struct Delivery {
    fragment: StreamFragment,
    ack: oneshot::Sender<()>,
}

impl Delivery {
    #[must_use]
    pub fn accept(self) -> StreamFragment {
        // The relay may already be gone; the fragment is still delivered.
        let _ = self.ack.send(());
        self.fragment
    }
}

/// Failures before any byte of the event stream is committed.
#[derive(Debug)]
pub enum RelayError {
    NotFound { id: ConversationId },
    Upstream(Report<UpstreamError>),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { id } => write!(f, "conversation not found: {id}"),
            Self::Upstream(report) => write!(f, "upstream call failed: {report}"),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<StoreError> for RelayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id } => Self::NotFound { id },
        }
    }
}

/// Per-conversation exchange locks.
///
/// Idle entries are pruned whenever a lock is acquired.
#[derive(Debug, Default)]
pub struct ExchangeLocks {
    locks: Mutex<HashMap<ConversationId, Arc<tokio::sync::Mutex<()>>>>,
}

impl ExchangeLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other exchange is running on `id`.
    pub async fn acquire(&self, id: ConversationId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of conversations with a running or waiting exchange.
    #[must_use]
    pub fn active(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}

/// One relayed exchange between a client and the upstream model.
pub struct RelaySession {
    conversation_id: ConversationId,
    store: Arc<dyn ConversationStore>,
    backend: Arc<dyn CompletionBackend>,
    state: RelayState,
    exchange_guard: Option<OwnedMutexGuard<()>>,
}

impl RelaySession {
    #[must_use]
    pub fn new(
        conversation_id: ConversationId,
        store: Arc<dyn ConversationStore>,
        backend: Arc<dyn CompletionBackend>,
    ) -> Self {
        Self {
            conversation_id,
            store,
            backend,
            state: RelayState::Idle,
            exchange_guard: None,
        }
    }

    /// Holds `guard` until the session closes.
    #[must_use]
    pub fn with_exchange_guard(mut self, guard: OwnedMutexGuard<()>) -> Self {
        self.exchange_guard = Some(guard);
        self
    }

    #[must_use]
    pub fn state(&self) -> RelayState {
        self.state
    }

    fn transition(&mut self, to: RelayState) {
        debug!(
            conversation_id = %self.conversation_id,
            from = %self.state,
            to = %to,
            "relay state transition"
        );
        self.state = to;
    }

    /// Appends the user turn and opens the upstream completion.
    ///
    /// The user message stays in the conversation even if the upstream call
    /// fails.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the conversation does not exist (upstream is
    /// not contacted) and `Upstream` if no stream could be opened. Either
    /// way the session is closed.
    #[instrument(skip(self, content), fields(conversation_id = %self.conversation_id))]
    pub async fn start(&mut self, content: String) -> Result<UpstreamDecoder, RelayError> {
        let result = self.open(content).await;
        if result.is_err() {
            self.close();
        }
        result
    }

    async fn open(&mut self, content: String) -> Result<UpstreamDecoder, RelayError> {
        self.store.get(self.conversation_id).await?;
        self.transition(RelayState::Started);

        self.store
            .append_message(self.conversation_id, Message::user(content))
            .await?;

        let history: Vec<ChatMessage> = self
            .store
            .get(self.conversation_id)
            .await?
            .messages
            .into_iter()
            .map(to_chat_message)
            .collect();

        let stream = self
            .backend
            .stream_completion(&history)
            .await
            .map_err(RelayError::Upstream)?;

        debug!(
            model = self.backend.model(),
            history_len = history.len(),
            "upstream stream opened"
        );
        Ok(ChunkDecoder::new(stream))
    }

    /// Relays decoded fragments to `sink` until the stream ends or the
    /// client disconnects, then commits the reply.
    ///
    /// Disconnection wins when it is ready at the same time as upstream
    /// data. A fragment joins the reply only once the client has accepted
    /// its [`Delivery`].
    /// `sink` is dropped after the session closes, which ends the client's
    /// event stream.
    #[instrument(skip_all, fields(conversation_id = %self.conversation_id))]
    pub async fn run(
        mut self,
        mut decoder: UpstreamDecoder,
        sink: mpsc::Sender<Delivery>,
    ) -> RelayOutcome {
        self.transition(RelayState::Streaming);

        let mut reply = String::new();
        let mut fragments_emitted = 0;

        let stop_reason = loop {
            let step = tokio::select! {
                biased;
                () = sink.closed() => break StopReason::ClientDisconnected,
                step = decoder.next() => step,
            };

            match step {
                Ok(Some(fragment)) => {
                    let text = fragment.text.clone();
                    let (ack, accepted) = oneshot::channel();
                    if sink.send(Delivery { fragment, ack }).await.is_err() {
                        break StopReason::ClientDisconnected;
                    }

                    let delivered = tokio::select! {
                        biased;
                        result = accepted => result.is_ok(),
                        () = sink.closed() => false,
                    };
                    if !delivered {
                        break StopReason::ClientDisconnected;
                    }

                    reply.push_str(&text);
                    fragments_emitted += 1;
                }
                Ok(None) => break StopReason::Completed,
                Err(e) => {
                    warn!(error = %e, "upstream stream could not be decoded; ending exchange");
                    break StopReason::DecodeFailed;
                }
            }
        };

        self.transition(RelayState::Finalizing);
        drop(decoder);

        let persisted = self.commit_reply(&reply).await;
        self.close();

        info!(
            stop_reason = ?stop_reason,
            fragments_emitted,
            reply_len = reply.len(),
            persisted,
            "relay session closed"
        );

        drop(sink);
        RelayOutcome {
            stop_reason,
            fragments_emitted,
            reply,
            persisted,
        }
    }

    async fn commit_reply(&self, reply: &str) -> bool {
        if reply.is_empty() {
            return false;
        }

        match self
            .store
            .append_message(self.conversation_id, Message::assistant(reply))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "conversation vanished before the reply was committed");
                false
            }
        }
    }

    fn close(&mut self) {
        self.transition(RelayState::Closed);
        self.exchange_guard = None;
    }
}

fn to_chat_message(message: Message) -> ChatMessage {
    match message.role {
        MessageRole::User => ChatMessage::user(message.content),
        MessageRole::Assistant => ChatMessage::assistant(message.content),
    }
}
