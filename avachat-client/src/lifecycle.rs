//! Stream lifecycle of one conversation view.
//!
//! [`ChatStream`] owns the message store and at most one open event stream.
//! Sending while a reply is still streaming settles the old reply (whatever
//! already arrived is applied, the message is frozen, the handle closed) and
//! only then opens the new stream. Failures are never retried automatically;
//! they surface as an [`ErrorNotice`] and [`ChatStream::resend_last`] sends
//! the same text again on request.

use std::time::Duration;

use shared::{
    config::ClientConfig,
    models::{ChatMessage, Locale, UserData},
};
use tokio::{
    sync::mpsc,
    time::{self, Instant},
};
use tracing::{debug, info, trace, warn};

use crate::{
    coalescer::TokenCoalescer,
    error::{ClientError, ClientResult, TransportError},
    event_stream::{EventStreamClient, EventTransport, StreamEndpoint, StreamHandle, StreamSignal},
    store::MessageStore,
};

/// Shown when the connection breaks before the reply is complete.
pub const CONNECTION_LOST_MESSAGE: &str = "Connection lost. Please resend your message.";

/// Whether a reply is currently streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No stream is open.
    Idle,
    /// A reply is streaming into the last assistant message.
    Streaming,
}

/// Why an open stream is being abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownReason {
    /// The view went to the background.
    Hidden,
    /// The process or page is going away.
    Unload,
    /// The view is being destroyed.
    Unmount,
    /// Another conversation is being shown.
    ConversationSwitch,
}

/// How a stream ended without `done`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFailure {
    /// The server sent an `error` event.
    Server(String),
    /// The connection failed or ended early.
    Connection(TransportError),
}

impl StreamFailure {
    /// Text shown to the user for this failure.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Server(message) => message.clone(),
            Self::Connection(_) => CONNECTION_LOST_MESSAGE.to_string(),
        }
    }
}

/// Visible change produced by [`ChatStream::next_update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatUpdate {
    /// Buffered text was appended to the streaming reply.
    Flushed {
        /// The assistant message that grew.
        message_id: String,
        /// Text appended by this flush.
        delta: String,
    },
    /// The reply finished. `tail` is the text applied by the terminal flush.
    Completed {
        /// The finished assistant message.
        message_id: String,
        /// Text applied by the terminal flush.
        tail: Option<String>,
    },
    /// The reply ended with an error. Text received so far is kept.
    Failed {
        /// The interrupted assistant message.
        message_id: String,
        /// Text applied by the terminal flush.
        tail: Option<String>,
        /// What went wrong.
        failure: StreamFailure,
    },
}

/// Messages created by one successful [`ChatStream::send_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// The user message that was appended.
    pub user: ChatMessage,
    /// Id of the empty assistant message the reply streams into.
    pub assistant_id: String,
    /// The reply that was still streaming when this message was sent, if
    /// any. Its final flush is carried here since no later update reports it.
    pub replaced: Option<ChatUpdate>,
}

/// A user-visible error that goes away on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorNotice {
    message: String,
    raised_at: Instant,
}

impl ErrorNotice {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            raised_at: Instant::now(),
        }
    }

    /// Text of the notice.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the notice has been visible for `ttl` or longer.
    #[must_use]
    pub fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.duration_since(self.raised_at) >= ttl
    }
}

/// Tunables of a [`ChatStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatSettings {
    /// Delay between the first buffered token and its flush.
    pub flush_interval: Duration,
    /// Longest accepted message, in characters.
    pub max_message_chars: usize,
    /// How long an error notice stays visible.
    pub error_display: Duration,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self::from_config(&ClientConfig::with_defaults())
    }
}

impl ChatSettings {
    /// Settings from the `stream` section and `error_display_secs`.
    #[must_use]
    pub const fn from_config(config: &ClientConfig) -> Self {
        Self {
            flush_interval: config.stream.flush_interval(),
            max_message_chars: config.stream.max_message_chars,
            error_display: config.error_display(),
        }
    }
}

#[derive(Debug)]
struct ActiveStream {
    handle: StreamHandle,
    signals: mpsc::Receiver<StreamSignal>,
    assistant_id: String,
    coalescer: TokenCoalescer,
}

enum Wake {
    Signal(Option<StreamSignal>),
    FlushDue,
}

/// Coordinates sending, streaming and teardown for one conversation view.
#[derive(Debug)]
pub struct ChatStream<T> {
    client: EventStreamClient<T>,
    endpoint: StreamEndpoint,
    settings: ChatSettings,
    store: MessageStore,
    active: Option<ActiveStream>,
    error: Option<ErrorNotice>,
    last_outgoing: Option<String>,
}

impl<T: EventTransport> ChatStream<T> {
    /// Creates an idle view of the conversation at `endpoint`.
    #[must_use]
    pub fn new(client: EventStreamClient<T>, endpoint: StreamEndpoint, settings: ChatSettings) -> Self {
        Self {
            client,
            endpoint,
            settings,
            store: MessageStore::new(),
            active: None,
            error: None,
            last_outgoing: None,
        }
    }

    /// Current stream state.
    #[must_use]
    pub const fn state(&self) -> StreamState {
        if self.active.is_some() {
            StreamState::Streaming
        } else {
            StreamState::Idle
        }
    }

    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        self.active.is_some()
    }

    /// Messages in display order.
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        self.store.messages()
    }

    #[must_use]
    pub const fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Where the next message is sent.
    #[must_use]
    pub const fn endpoint(&self) -> &StreamEndpoint {
        &self.endpoint
    }

    #[must_use]
    pub const fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    /// Streams opened by this view that are still live.
    #[must_use]
    pub fn live_handles(&self) -> usize {
        self.client.live_handles()
    }

    /// Current error text, unless it was dismissed or has expired.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error
            .as_ref()
            .filter(|notice| !notice.is_expired(Instant::now(), self.settings.error_display))
            .map(ErrorNotice::message)
    }

    /// Hides the current error before it expires.
    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    /// Sends `text` and starts streaming the reply.
    ///
    /// Blank input is ignored and yields `Ok(None)`. Any stream still open is
    /// settled and closed before the new one opens.
    ///
    /// # Errors
    /// Returns [`ClientError::MessageTooLong`] or
    /// [`ClientError::BackendUnavailable`]; in both cases nothing changes.
    pub fn send_message(&mut self, text: &str) -> ClientResult<Option<SentMessage>> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        let length = text.chars().count();
        if length > self.settings.max_message_chars {
            return Err(ClientError::MessageTooLong {
                length,
                limit: self.settings.max_message_chars,
            });
        }
        let url = self.endpoint.url_for(text)?;

        let replaced = self.active.take().map(|previous| {
            info!(
                handle = previous.handle.id(),
                "closing the previous stream before sending"
            );
            let (message_id, tail) = self.settle(previous);
            ChatUpdate::Completed { message_id, tail }
        });

        self.error = None;
        let user = self.store.append_user(text);
        let assistant = self.store.append_assistant_placeholder();
        let (handle, signals) = self.client.open(url);
        info!(
            handle = handle.id(),
            assistant_id = %assistant.id,
            conversation_id = %self.endpoint.conversation_id,
            "reply stream opened"
        );

        self.active = Some(ActiveStream {
            handle,
            signals,
            assistant_id: assistant.id.clone(),
            coalescer: TokenCoalescer::new(self.settings.flush_interval),
        });
        self.last_outgoing = Some(text.to_string());

        Ok(Some(SentMessage {
            user,
            assistant_id: assistant.id,
            replaced,
        }))
    }

    /// Sends the last outgoing text again, typically after a failure.
    ///
    /// # Errors
    /// Same as [`ChatStream::send_message`].
    pub fn resend_last(&mut self) -> ClientResult<Option<SentMessage>> {
        match self.last_outgoing.clone() {
            Some(text) => self.send_message(&text),
            None => Ok(None),
        }
    }

    /// Waits for the next visible change of the streaming reply.
    ///
    /// Returns `None` when no stream is open. Cancel-safe: dropping the
    /// future loses no signal and no buffered text.
    pub async fn next_update(&mut self) -> Option<ChatUpdate> {
        loop {
            let wake = {
                let active = self.active.as_mut()?;
                if active.coalescer.is_due(Instant::now()) {
                    Wake::FlushDue
                } else {
                    let deadline = active.coalescer.deadline();
                    tokio::select! {
                        biased;
                        signal = active.signals.recv() => Wake::Signal(signal),
                        () = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => Wake::FlushDue,
                    }
                }
            };

            match wake {
                Wake::FlushDue => {
                    if let Some(update) = self.flush_pending() {
                        return Some(update);
                    }
                }
                Wake::Signal(Some(StreamSignal::Token(fragment))) => {
                    if let Some(active) = self.active.as_mut() {
                        active.coalescer.push(&fragment, Instant::now());
                    }
                }
                Wake::Signal(Some(StreamSignal::Ping)) => trace!("stream heartbeat"),
                Wake::Signal(Some(StreamSignal::Done)) => return self.complete(),
                Wake::Signal(Some(StreamSignal::ServerError(message))) => {
                    return self.fail(StreamFailure::Server(message));
                }
                Wake::Signal(Some(StreamSignal::Disconnected(err))) => {
                    return self.fail(StreamFailure::Connection(err));
                }
                Wake::Signal(None) => {
                    return self.fail(StreamFailure::Connection(TransportError::Closed));
                }
            }
        }
    }

    /// Drives the open stream to its end and returns every update on the way.
    pub async fn finish(&mut self) -> Vec<ChatUpdate> {
        let mut updates = Vec::new();
        while let Some(update) = self.next_update().await {
            updates.push(update);
        }
        updates
    }

    /// Abandons the open stream, if any. Buffered text is discarded and the
    /// reply keeps what was already applied.
    pub fn teardown(&mut self, reason: TeardownReason) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        active.coalescer.cancel();
        active.handle.close();
        self.store.freeze(&active.assistant_id);
        info!(?reason, handle = active.handle.id(), "reply stream torn down");
    }

    /// Shows another conversation. The open stream is torn down and the
    /// messages are cleared until history is applied.
    pub fn switch_conversation(&mut self, conversation_id: impl Into<String>) {
        self.teardown(TeardownReason::ConversationSwitch);
        self.store.reset();
        self.error = None;
        self.last_outgoing = None;
        self.endpoint.conversation_id = conversation_id.into();
        info!(conversation_id = %self.endpoint.conversation_id, "conversation switched");
    }

    /// Installs server history, unless local messages already exist.
    pub fn apply_history(&mut self, messages: Vec<ChatMessage>) -> bool {
        self.store.seed(messages)
    }

    /// Replaces the messages on screen. An empty replacement never discards
    /// local messages.
    pub fn replace_messages(&mut self, messages: Vec<ChatMessage>) -> bool {
        if self.is_streaming() && !messages.is_empty() {
            self.teardown(TeardownReason::ConversationSwitch);
        }
        self.store.replace_all(messages)
    }

    /// Language used for replies from the next message on.
    pub fn set_locale(&mut self, locale: Locale) {
        self.endpoint.locale = locale;
    }

    /// User context sent with the next message.
    pub fn set_user_data(&mut self, user_data: UserData) {
        self.endpoint.user_data = user_data;
    }

    fn flush_pending(&mut self) -> Option<ChatUpdate> {
        let active = self.active.as_mut()?;
        let delta = active.coalescer.flush()?;
        self.store.grow_last(&active.assistant_id, &delta);
        trace!(bytes = delta.len(), "flushed buffered tokens");
        Some(ChatUpdate::Flushed {
            message_id: active.assistant_id.clone(),
            delta,
        })
    }

    fn complete(&mut self) -> Option<ChatUpdate> {
        let active = self.active.take()?;
        let (message_id, tail) = self.settle(active);
        info!(%message_id, "reply completed");
        Some(ChatUpdate::Completed { message_id, tail })
    }

    fn fail(&mut self, failure: StreamFailure) -> Option<ChatUpdate> {
        let active = self.active.take()?;
        let (message_id, tail) = self.settle(active);
        warn!(%message_id, ?failure, "reply stream failed");
        self.error = Some(ErrorNotice::new(failure.user_message()));
        Some(ChatUpdate::Failed {
            message_id,
            tail,
            failure,
        })
    }

    /// Applies everything already received, freezes the reply and closes the
    /// handle. The coalescer is finished, so this is the only terminal flush.
    fn settle(&mut self, mut active: ActiveStream) -> (String, Option<String>) {
        while let Ok(signal) = active.signals.try_recv() {
            if let StreamSignal::Token(fragment) = signal {
                active.coalescer.push(&fragment, Instant::now());
            }
        }

        let tail = active.coalescer.finish();
        if let Some(tail) = &tail {
            self.store.grow_last(&active.assistant_id, tail);
        }
        self.store.freeze(&active.assistant_id);
        active.handle.close();
        debug!(handle = active.handle.id(), "stream settled");
        (active.assistant_id, tail)
    }
}
