//! In-memory transport used by the unit tests.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use url::Url;

use crate::{
    error::TransportError,
    event_stream::{ByteStream, EventTransport},
};

type Chunk = Result<Bytes, TransportError>;

#[derive(Debug, Default)]
struct Inner {
    pending: VecDeque<Result<mpsc::UnboundedReceiver<Chunk>, TransportError>>,
    urls: Vec<Url>,
}

/// Serves queued scripts, one per connection, in order.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a stream for the next connection and returns its feed.
    pub fn script(&self) -> ScriptFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().unwrap().pending.push_back(Ok(rx));
        ScriptFeed { tx }
    }

    /// Makes the next connection attempt fail.
    pub fn fail_next(&self, err: TransportError) {
        self.inner.lock().unwrap().pending.push_back(Err(err));
    }

    /// URLs of every connection attempt so far.
    pub fn urls(&self) -> Vec<Url> {
        self.inner.lock().unwrap().urls.clone()
    }
}

#[async_trait]
impl EventTransport for ScriptedTransport {
    async fn connect(&self, url: &Url) -> Result<ByteStream, TransportError> {
        let next = {
            let mut inner = self.inner.lock().unwrap();
            inner.urls.push(url.clone());
            inner.pending.pop_front()
        };
        match next {
            Some(Ok(rx)) => Ok(UnboundedReceiverStream::new(rx).boxed()),
            Some(Err(err)) => Err(err),
            None => Err(TransportError::Connect("no scripted stream".to_string())),
        }
    }
}

/// Writes raw SSE bytes into one scripted connection. Dropping the feed ends
/// the body, like a server hanging up.
#[derive(Debug)]
pub struct ScriptFeed {
    tx: mpsc::UnboundedSender<Chunk>,
}

impl ScriptFeed {
    pub fn raw(&self, text: &str) {
        let _ = self.tx.send(Ok(Bytes::from(text.to_string())));
    }

    pub fn event(&self, name: &str, data: &str) {
        self.raw(&format!("event: {name}\ndata: {data}\n\n"));
    }

    pub fn token(&self, content: &str) {
        self.event("token", &json!({ "content": content }).to_string());
    }

    pub fn done(&self) {
        self.event("done", "{}");
    }

    pub fn error(&self, message: &str) {
        self.event("error", &json!({ "error": message }).to_string());
    }

    pub fn ping(&self) {
        self.event("ping", "{}");
    }

    pub fn fail(&self, err: TransportError) {
        let _ = self.tx.send(Err(err));
    }

    /// Whether the reading side of this connection is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
