//! Ordered message sequence for the conversation on screen.

use shared::models::ChatMessage;
use tracing::debug;

/// Insertion-ordered messages of one conversation view.
///
/// Only the assistant placeholder created by
/// [`MessageStore::append_assistant_placeholder`] can grow, and only while it
/// is both open and the last message.
#[derive(Debug, Default, Clone)]
pub struct MessageStore {
    messages: Vec<ChatMessage>,
    open_assistant: Option<String>,
}

impl MessageStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a user message.
    pub fn append_user(&mut self, content: impl Into<String>) -> ChatMessage {
        let message = ChatMessage::user(content);
        self.messages.push(message.clone());
        message
    }

    /// Appends an empty assistant message and opens it for growth.
    pub fn append_assistant_placeholder(&mut self) -> ChatMessage {
        let message = ChatMessage::assistant_placeholder();
        self.open_assistant = Some(message.id.clone());
        self.messages.push(message.clone());
        message
    }

    /// Appends `delta` to the open assistant message `assistant_id`, provided
    /// it is still the last message. Returns whether anything changed.
    pub fn grow_last(&mut self, assistant_id: &str, delta: &str) -> bool {
        if self.open_assistant.as_deref() != Some(assistant_id) {
            debug!(assistant_id, "ignoring growth of a closed message");
            return false;
        }
        match self.messages.last_mut() {
            Some(last) if last.id == assistant_id && last.is_assistant() => {
                last.content.push_str(delta);
                true
            }
            _ => {
                debug!(assistant_id, "ignoring growth of a message that is no longer last");
                false
            }
        }
    }

    /// Stops growth of `assistant_id`. Its content is final from here on.
    pub fn freeze(&mut self, assistant_id: &str) {
        if self.open_assistant.as_deref() == Some(assistant_id) {
            self.open_assistant = None;
        }
    }

    /// Replaces the whole sequence.
    ///
    /// An empty replacement never discards local messages; returns whether
    /// the replacement happened.
    pub fn replace_all(&mut self, messages: Vec<ChatMessage>) -> bool {
        if messages.is_empty() && !self.messages.is_empty() {
            debug!(
                local = self.messages.len(),
                "keeping local messages over an empty replacement"
            );
            return false;
        }
        self.messages = messages;
        self.open_assistant = None;
        true
    }

    /// Installs `messages` only if nothing is on screen yet.
    pub fn seed(&mut self, messages: Vec<ChatMessage>) -> bool {
        if !self.messages.is_empty() {
            debug!(
                local = self.messages.len(),
                "history arrived after local activity, keeping local messages"
            );
            return false;
        }
        self.replace_all(messages)
    }

    /// Clears every message.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.open_assistant = None;
    }

    /// Messages in display order.
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    #[must_use]
    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Looks a message up by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|message| message.id == id)
    }

    /// Id of the assistant message still receiving text.
    #[must_use]
    pub fn open_assistant(&self) -> Option<&str> {
        self.open_assistant.as_deref()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
