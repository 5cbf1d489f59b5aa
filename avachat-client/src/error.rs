use reqwest::StatusCode;
use thiserror::Error;

/// Errors surfaced by the backend-facing parts of the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No backend URL is configured; every request fails immediately.
    #[error("network error: backend URL is not configured")]
    BackendUnavailable,
    /// An endpoint URL could not be built.
    #[error("invalid endpoint: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The request did not reach the backend or its body was unreadable.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    /// The backend answered with a non-success status.
    #[error("{message}")]
    Api {
        /// HTTP status of the response.
        status: StatusCode,
        /// Message from the response body, or a default.
        message: String,
    },
    /// The outgoing message exceeds the configured limit.
    #[error("message is too long ({length} characters, limit {limit})")]
    MessageTooLong {
        /// Length of the rejected message, in characters.
        length: usize,
        /// Configured limit, in characters.
        limit: usize,
    },
    /// Another session creation is still running.
    #[error("a session is already being created")]
    SessionInFlight,
    /// Reading or writing local storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
    /// JSON could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// Text suitable for showing to the person chatting.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// HTTP status for backend errors.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failure of the connection carrying an event stream, as opposed to an
/// `error` event sent by the server.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request could not be sent.
    #[error("failed to connect: {0}")]
    Connect(String),
    /// The server answered with a non-success status.
    #[error("stream rejected with status {0}")]
    Status(u16),
    /// Reading the body failed mid-stream.
    #[error("stream interrupted: {0}")]
    Body(String),
    /// The body ended before `done` or `error`.
    #[error("stream ended without a terminal event")]
    Closed,
}

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
