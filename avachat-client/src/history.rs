//! Initial state of a conversation view.

use shared::models::{Avatar, ChatMessage};
use tracing::{debug, info, warn};

use crate::api::BackendClient;

/// What a view starts from. Loading never fails: problems are reported in
/// `error` and the fallback avatar is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryOutcome {
    /// The most recent messages, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Avatar of the conversation, or the fallback.
    pub avatar: Avatar,
    /// Message to show when loading failed.
    pub error: Option<String>,
}

impl HistoryOutcome {
    fn empty() -> Self {
        Self {
            messages: Vec::new(),
            avatar: Avatar::fallback(),
            error: None,
        }
    }
}

/// Fetches prior messages and avatar metadata for a conversation.
#[derive(Debug, Clone)]
pub struct HistoryLoader {
    backend: BackendClient,
    limit: usize,
}

impl HistoryLoader {
    /// Creates a loader keeping at most `limit` messages.
    #[must_use]
    pub const fn new(backend: BackendClient, limit: usize) -> Self {
        Self { backend, limit }
    }

    /// Loads the history of `conversation_id`. An empty id or a 404 yields
    /// an empty conversation without an error.
    pub async fn load(&self, conversation_id: &str) -> HistoryOutcome {
        if conversation_id.trim().is_empty() {
            debug!("no conversation id, starting empty");
            return HistoryOutcome::empty();
        }

        match self.backend.fetch_conversation(conversation_id).await {
            Ok(None) => HistoryOutcome::empty(),
            Ok(Some(conversation)) => {
                let messages = keep_recent(conversation.messages.unwrap_or_default(), self.limit);
                info!(conversation_id, messages = messages.len(), "history loaded");
                HistoryOutcome {
                    messages,
                    avatar: conversation.avatar.unwrap_or_else(Avatar::fallback),
                    error: None,
                }
            }
            Err(err) => {
                warn!(conversation_id, error = %err, "failed to load history");
                HistoryOutcome {
                    error: Some(err.user_message()),
                    ..HistoryOutcome::empty()
                }
            }
        }
    }
}

/// The last `limit` messages, in order.
#[must_use]
pub fn keep_recent(mut messages: Vec<ChatMessage>, limit: usize) -> Vec<ChatMessage> {
    if messages.len() > limit {
        messages.drain(..messages.len() - limit);
    }
    messages
}
