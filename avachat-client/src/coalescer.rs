//! Buffers token fragments so a burst of tokens becomes one message update.

use std::time::Duration;

use tokio::time::Instant;

/// Token buffer with a single pending flush deadline.
///
/// The deadline is armed by the first fragment after a flush, never pushed
/// back by later fragments, so the flush cadence is independent of the token
/// arrival rate.
#[derive(Debug)]
pub struct TokenCoalescer {
    buffer: String,
    deadline: Option<Instant>,
    interval: Duration,
    closed: bool,
}

impl TokenCoalescer {
    /// Creates a coalescer that flushes `interval` after the first fragment.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            buffer: String::new(),
            deadline: None,
            interval,
            closed: false,
        }
    }

    /// Buffers `fragment`. Returns `true` when this call armed the flush timer.
    pub fn push(&mut self, fragment: &str, now: Instant) -> bool {
        if self.closed || fragment.is_empty() {
            return false;
        }

        self.buffer.push_str(fragment);
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(now + self.interval);
        true
    }

    /// When the pending flush is due, if one is pending.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the pending flush is due at `now`.
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }

    /// Text buffered since the last flush.
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Takes everything buffered so far and disarms the timer.
    pub fn flush(&mut self) -> Option<String> {
        self.deadline = None;
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    /// Terminal flush. Afterwards the coalescer accepts nothing and yields
    /// nothing, so at most one terminal flush can ever carry text.
    pub fn finish(&mut self) -> Option<String> {
        if self.closed {
            return None;
        }
        let remaining = self.flush();
        self.closed = true;
        remaining
    }

    /// Discards buffered text without flushing it.
    pub fn cancel(&mut self) {
        self.buffer.clear();
        self.deadline = None;
        self.closed = true;
    }

    /// Whether [`TokenCoalescer::finish`] or [`TokenCoalescer::cancel`] ran.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }
}
