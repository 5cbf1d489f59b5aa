#![cfg_attr(not(test), forbid(unsafe_code))]
#![deny(warnings, clippy::pedantic)]
//! Streaming chat core of Avachat.
//!
//! [`ChatStream`] sends messages and assembles streamed replies in a
//! [`MessageStore`]; [`HistoryLoader`], [`SessionLauncher`] and
//! [`ConversationStorage`] provide the state a conversation view starts from.

pub mod api;
pub mod coalescer;
pub mod error;
pub mod event_stream;
pub mod history;
pub mod lifecycle;
pub mod session;
pub mod storage;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::BackendClient;
pub use coalescer::TokenCoalescer;
pub use error::{ClientError, ClientResult, TransportError};
pub use event_stream::{
    EventStreamClient, EventTransport, HttpTransport, SseDecoder, SseFrame, StreamEndpoint,
    StreamHandle, StreamSignal,
};
pub use history::{HistoryLoader, HistoryOutcome};
pub use lifecycle::{
    CONNECTION_LOST_MESSAGE, ChatSettings, ChatStream, ChatUpdate, ErrorNotice, SentMessage,
    StreamFailure, StreamState, TeardownReason,
};
pub use session::SessionLauncher;
pub use storage::{ConversationStorage, LocaleSwitch};
pub use store::MessageStore;
