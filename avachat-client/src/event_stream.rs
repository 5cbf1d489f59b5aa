//! Server-sent event client for the chat stream.
//!
//! One [`StreamHandle`] owns one connection. A background reader decodes the
//! SSE wire format, turns the named events into [`StreamSignal`]s and forwards
//! them, in arrival order, to whoever holds the matching receiver.

use std::sync::{
    Arc,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, stream::BoxStream};
use reqwest::{Client, header::ACCEPT};
use shared::models::{Locale, StreamErrorPayload, TokenPayload, UserData, event_names};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{Instrument, debug, debug_span, warn};
use url::Url;

use crate::{
    api::api_endpoint,
    error::{ClientError, ClientResult, TransportError},
};

/// Signals buffered between the reader task and the lifecycle manager.
const SIGNAL_CHANNEL_CAPACITY: usize = 256;

/// Raw body of an event stream, chunked however the network delivered it.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Opens the byte stream behind an event-stream URL.
#[async_trait]
pub trait EventTransport: Send + Sync + 'static {
    /// Connects to `url` and returns the response body.
    ///
    /// # Errors
    /// Returns a [`TransportError`] when the connection cannot be established
    /// or the server rejects the request.
    async fn connect(&self, url: &Url) -> Result<ByteStream, TransportError>;
}

/// [`EventTransport`] backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Wraps an existing `reqwest` client.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventTransport for HttpTransport {
    async fn connect(&self, url: &Url) -> Result<ByteStream, TransportError> {
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|err| TransportError::Body(err.to_string())))
            .boxed())
    }
}

/// Everything needed to address the chat stream of one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoint {
    /// Backend base URL; `None` makes every send fail fast.
    pub base_url: Option<Url>,
    /// Conversation the messages belong to.
    pub conversation_id: String,
    /// User context sent as `userData`.
    pub user_data: UserData,
    /// Language of the replies.
    pub locale: Locale,
}

impl StreamEndpoint {
    /// Builds `GET /api/chat/stream` for one outgoing message. Every query
    /// value is percent-encoded.
    ///
    /// # Errors
    /// Returns [`ClientError::BackendUnavailable`] when no base URL is set.
    pub fn url_for(&self, message: &str) -> ClientResult<Url> {
        let base = self
            .base_url
            .as_ref()
            .ok_or(ClientError::BackendUnavailable)?;
        let mut url = api_endpoint(base, "api/chat/stream")?;
        url.query_pairs_mut()
            .append_pair("conversationId", &self.conversation_id)
            .append_pair("message", message)
            .append_pair("userData", &self.user_data.to_param())
            .append_pair("lang", self.locale.as_str());
        Ok(url)
    }
}

/// Typed view of one event received on the chat stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSignal {
    /// A fragment of assistant output, to be appended.
    Token(String),
    /// The reply is complete.
    Done,
    /// The server reported a failure; carries its human-readable message.
    ServerError(String),
    /// Heartbeat.
    Ping,
    /// The connection broke before a terminal event.
    Disconnected(TransportError),
}

impl StreamSignal {
    /// Whether no further signal can follow this one.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done | Self::ServerError(_) | Self::Disconnected(_)
        )
    }
}

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Event name; `message` when the frame names none.
    pub event: String,
    /// Data lines joined with `\n`.
    pub data: String,
    /// Last event id seen on the stream.
    pub id: Option<String>,
}

/// Incremental decoder for the `text/event-stream` format.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    last_event_id: Option<String>,
}

impl SseDecoder {
    /// Feeds one network chunk and returns every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(line) = self.next_line() {
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn next_line(&mut self) -> Option<String> {
        let pos = self
            .buffer
            .iter()
            .position(|byte| *byte == b'\n' || *byte == b'\r')?;
        let terminator = if self.buffer[pos] == b'\r' {
            match self.buffer.get(pos + 1) {
                Some(b'\n') => 2,
                Some(_) => 1,
                // A lone trailing CR may be the first half of CRLF.
                None => return None,
            }
        } else {
            1
        };

        let mut line: Vec<u8> = self.buffer.drain(..pos + terminator).collect();
        line.truncate(pos);
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" if !value.contains('\0') => self.last_event_id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }

        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: event
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| "message".to_string()),
            data,
            id: self.last_event_id.clone(),
        })
    }
}

/// Maps a decoded frame onto a [`StreamSignal`].
///
/// Malformed payloads and unknown event names are logged and dropped.
#[must_use]
pub fn parse_frame(frame: &SseFrame) -> Option<StreamSignal> {
    match frame.event.as_str() {
        event_names::TOKEN => match serde_json::from_str::<TokenPayload>(&frame.data) {
            Ok(payload) => Some(StreamSignal::Token(payload.content)),
            Err(err) => {
                warn!(event = %frame.event, error = %err, "dropping malformed stream payload");
                None
            }
        },
        event_names::DONE => Some(StreamSignal::Done),
        event_names::ERROR => match serde_json::from_str::<StreamErrorPayload>(&frame.data) {
            Ok(payload) => Some(StreamSignal::ServerError(payload.error)),
            Err(err) => {
                warn!(event = %frame.event, error = %err, "dropping malformed stream payload");
                None
            }
        },
        event_names::PING => {
            debug!("heartbeat received");
            Some(StreamSignal::Ping)
        }
        other => {
            debug!(event = other, "ignoring unknown stream event");
            None
        }
    }
}

/// Live connection owned by whoever opened it.
///
/// Closing is idempotent, and dropping the handle closes it.
#[derive(Debug)]
pub struct StreamHandle {
    id: u64,
    task: Option<JoinHandle<()>>,
    live: Arc<AtomicUsize>,
}

impl StreamHandle {
    /// Identifier used in logs.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Whether [`StreamHandle::close`] already ran.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.task.is_none()
    }

    /// Stops the reader and releases the connection.
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.live.fetch_sub(1, Ordering::SeqCst);
            debug!(handle = self.id, "event stream closed");
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens event streams over a transport.
#[derive(Debug)]
pub struct EventStreamClient<T> {
    transport: Arc<T>,
    live: Arc<AtomicUsize>,
    next_id: AtomicU64,
}

impl<T: EventTransport> EventStreamClient<T> {
    /// Creates a client opening streams over `transport`.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            live: Arc::new(AtomicUsize::new(0)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Opens a stream and returns its handle together with the receiver of
    /// its signals. Must be called from within a Tokio runtime.
    pub fn open(&self, url: Url) -> (StreamHandle, mpsc::Receiver<StreamSignal>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
        let transport = Arc::clone(&self.transport);
        let span = debug_span!("event_stream", handle = id);
        let task = tokio::spawn(pump(transport, url, tx).instrument(span));

        self.live.fetch_add(1, Ordering::SeqCst);
        debug!(handle = id, "event stream opened");

        let handle = StreamHandle {
            id,
            task: Some(task),
            live: Arc::clone(&self.live),
        };
        (handle, rx)
    }

    /// Number of handles opened by this client that are not closed yet.
    #[must_use]
    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

async fn pump<T: EventTransport>(transport: Arc<T>, url: Url, tx: mpsc::Sender<StreamSignal>) {
    let mut body = match transport.connect(&url).await {
        Ok(body) => body,
        Err(err) => {
            warn!(error = %err, "event stream connection failed");
            let _ = tx.send(StreamSignal::Disconnected(err)).await;
            return;
        }
    };

    let mut decoder = SseDecoder::default();
    while let Some(chunk) = body.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "event stream interrupted");
                let _ = tx.send(StreamSignal::Disconnected(err)).await;
                return;
            }
        };

        for frame in decoder.push(&bytes) {
            let Some(signal) = parse_frame(&frame) else {
                continue;
            };
            let terminal = signal.is_terminal();
            if tx.send(signal).await.is_err() {
                debug!("signal receiver dropped, stopping reader");
                return;
            }
            if terminal {
                return;
            }
        }
    }

    warn!("event stream ended without a terminal event");
    let _ = tx
        .send(StreamSignal::Disconnected(TransportError::Closed))
        .await;
}
