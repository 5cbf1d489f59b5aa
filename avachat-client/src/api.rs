//! JSON endpoints of the chat backend.

use reqwest::{Client, Response, StatusCode};
use shared::{
    config::ClientConfig,
    models::{
        ApiErrorBody, ConversationResponse, CreateSessionRequest, CreateSessionResponse, Locale,
        UserData,
    },
};
use tracing::{debug, error, info, instrument};
use url::Url;

use crate::{
    error::{ClientError, ClientResult},
    event_stream::StreamEndpoint,
};

const CREATE_SESSION_FAILED: &str = "Failed to create session";
const LOAD_CONVERSATION_FAILED: &str = "Failed to load conversation";

/// Joins `path` onto `base`, treating `base` as a directory even when it has
/// no trailing slash.
pub(crate) fn api_endpoint(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    if base.path().ends_with('/') {
        base.join(path)
    } else {
        let mut dir = base.clone();
        dir.set_path(&format!("{}/", base.path()));
        dir.join(path)
    }
}

/// Client for the session and conversation endpoints.
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: Option<Url>,
    http: Client,
}

impl BackendClient {
    /// Builds a client from configuration. A missing backend URL is logged
    /// once here; every request then fails with
    /// [`ClientError::BackendUnavailable`].
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_http(config.backend_url.clone(), Client::new())
    }

    /// Builds a client around an existing `reqwest` client.
    #[must_use]
    pub fn with_http(base_url: Option<Url>, http: Client) -> Self {
        if base_url.is_none() {
            error!("backend URL is not configured, requests will fail");
        }
        Self { base_url, http }
    }

    /// Configured backend base URL.
    #[must_use]
    pub const fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// The underlying HTTP client, shared with the event stream transport.
    #[must_use]
    pub const fn http(&self) -> &Client {
        &self.http
    }

    fn endpoint(&self, path: &str) -> ClientResult<Url> {
        let base = self
            .base_url
            .as_ref()
            .ok_or(ClientError::BackendUnavailable)?;
        Ok(api_endpoint(base, path)?)
    }

    /// Creates a conversation for `avatar_id` and returns its id.
    ///
    /// # Errors
    /// Fails on network errors or when the backend answers with a
    /// non-success status; the message comes from the response body when
    /// it carries one.
    #[instrument(skip(self, user_data))]
    pub async fn create_session(&self, avatar_id: u32, user_data: &UserData) -> ClientResult<String> {
        let url = self.endpoint("api/session")?;
        let request = CreateSessionRequest {
            avatar_id,
            user_data: user_data.clone(),
        };

        let response = self.http.post(url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(api_error(response, CREATE_SESSION_FAILED).await);
        }

        let created: CreateSessionResponse = response.json().await?;
        info!(session_id = %created.session_id, "session created");
        Ok(created.session_id)
    }

    /// Fetches the stored conversation. `Ok(None)` means the backend has no
    /// history for `conversation_id` yet.
    ///
    /// # Errors
    /// Fails on network errors, malformed bodies, and statuses other than
    /// success or 404.
    #[instrument(skip(self))]
    pub async fn fetch_conversation(
        &self,
        conversation_id: &str,
    ) -> ClientResult<Option<ConversationResponse>> {
        let mut url = self.endpoint("api/conversations/")?;
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .push(conversation_id);

        let response = self.http.get(url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!("no history yet");
                Ok(None)
            }
            status if status.is_success() => Ok(Some(response.json().await?)),
            _ => Err(api_error(response, LOAD_CONVERSATION_FAILED).await),
        }
    }

    /// Addresses the chat stream of `conversation_id`.
    #[must_use]
    pub fn stream_endpoint(
        &self,
        conversation_id: impl Into<String>,
        user_data: UserData,
        locale: Locale,
    ) -> StreamEndpoint {
        StreamEndpoint {
            base_url: self.base_url.clone(),
            conversation_id: conversation_id.into(),
            user_data,
            locale,
        }
    }
}

async fn api_error(response: Response, fallback: &str) -> ClientError {
    let status = response.status();
    let message = response
        .json::<ApiErrorBody>()
        .await
        .ok()
        .and_then(|body| body.error)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string());
    debug!(%status, %message, "backend request failed");
    ClientError::Api { status, message }
}
