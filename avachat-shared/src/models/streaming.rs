use serde::{Deserialize, Serialize};

/// SSE event names emitted by `GET /api/chat/stream`.
pub mod event_names {
    /// A fragment of the assistant reply.
    pub const TOKEN: &str = "token";
    /// The reply is complete.
    pub const DONE: &str = "done";
    /// The backend gave up on the reply.
    pub const ERROR: &str = "error";
    /// Keep-alive with no payload of interest.
    pub const PING: &str = "ping";
}

/// Payload of a `token` event: one fragment of the assistant reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPayload {
    /// Text to append to the reply.
    pub content: String,
}

/// Payload of an `error` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamErrorPayload {
    /// Message to show the user.
    pub error: String,
}
