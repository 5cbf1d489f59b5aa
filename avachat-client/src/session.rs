//! Conversation creation with an in-flight guard.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use shared::models::UserData;
use tracing::{debug, info};

use crate::{
    api::BackendClient,
    error::{ClientError, ClientResult},
};

/// Held while a session request is outstanding.
#[derive(Debug)]
struct InFlight {
    flag: Arc<AtomicBool>,
}

impl InFlight {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Starts new conversations, one request at a time per launcher.
#[derive(Debug)]
pub struct SessionLauncher {
    backend: BackendClient,
    in_flight: Arc<AtomicBool>,
}

impl SessionLauncher {
    /// Creates a launcher with its own in-flight guard.
    #[must_use]
    pub fn new(backend: BackendClient) -> Self {
        Self {
            backend,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a request is outstanding; input should stay disabled meanwhile.
    #[must_use]
    pub fn is_launching(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Creates a conversation with `avatar_id` and returns its id. The guard
    /// is released however the request ends.
    ///
    /// # Errors
    /// Returns [`ClientError::SessionInFlight`] when a request from this
    /// launcher is still outstanding, or the backend failure otherwise.
    pub async fn launch(&self, avatar_id: u32, user_data: &UserData) -> ClientResult<String> {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            debug!(avatar_id, "session request already in flight");
            return Err(ClientError::SessionInFlight);
        };
        let session_id = self.backend.create_session(avatar_id, user_data).await?;
        info!(avatar_id, %session_id, "conversation started");
        Ok(session_id)
    }
}
