use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

use super::{Avatar, ChatMessage};

/// User context forwarded to the backend with every message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserData {
    /// How the assistant addresses the user.
    pub name: String,
    /// Where the user says they are.
    pub city: String,
}

impl Default for UserData {
    fn default() -> Self {
        Self::new("User", "Unknown")
    }
}

impl UserData {
    /// Creates user context from a name and a city.
    #[must_use]
    pub fn new(name: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            city: city.into(),
        }
    }

    /// Picks one of the demo personas at random.
    #[must_use]
    pub fn seeded() -> Self {
        let personas = [Self::new("John", "Tokyo"), Self::new("Aiko", "Osaka")];
        personas
            .choose(&mut rand::rng())
            .cloned()
            .unwrap_or_default()
    }

    /// Parses the JSON form carried in links and query strings, falling back
    /// to a seeded persona when the value is missing or malformed.
    #[must_use]
    pub fn from_param(raw: Option<&str>) -> Self {
        match raw.map(serde_json::from_str::<Self>) {
            Some(Ok(user)) => user,
            Some(Err(err)) => {
                tracing::warn!(error = %err, "failed to parse user data, using a seeded persona");
                Self::seeded()
            }
            None => Self::seeded(),
        }
    }

    /// JSON encoding used for the `userData` stream parameter.
    #[must_use]
    pub fn to_param(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

/// Languages the chat can be held in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Locale {
    /// English.
    #[default]
    En,
    /// Japanese.
    Ja,
}

impl Locale {
    /// Every supported locale.
    pub const ALL: [Self; 2] = [Self::En, Self::Ja];

    /// Language code sent as the `lang` stream parameter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ja => "ja",
        }
    }

    /// Name of the language in that language.
    #[must_use]
    pub const fn native_name(self) -> &'static str {
        match self {
            Self::En => "English",
            Self::Ja => "日本語",
        }
    }
}

impl TryFrom<&str> for Locale {
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "en" => Ok(Self::En),
            "ja" => Ok(Self::Ja),
            _ => Err("unsupported locale"),
        }
    }
}

impl std::str::FromStr for Locale {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::try_from(value)
    }
}

impl Display for Locale {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Body of `POST /api/session`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Avatar picked for the conversation.
    pub avatar_id: u32,
    /// Context about the person chatting.
    pub user_data: UserData,
}

/// Response of `POST /api/session`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    /// Id of the new conversation.
    pub session_id: String,
}

/// Response of `GET /api/conversations/:id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ConversationResponse {
    /// Stored messages, oldest first.
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
    /// Avatar the conversation was started with.
    #[serde(default)]
    pub avatar: Option<Avatar>,
}

/// Error body the backend attaches to failed requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ApiErrorBody {
    /// Human-readable reason.
    #[serde(default)]
    pub error: Option<String>,
}
