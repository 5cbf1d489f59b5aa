use serde::{Deserialize, Serialize};

/// Media set describing one selectable avatar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Avatar {
    /// Catalog identifier sent to the backend when a session is created.
    pub id: u32,
    /// Shown while nothing is happening.
    pub static_url: String,
    /// Shown while the user is typing.
    pub listening_url: String,
    /// Shown while the assistant reply is streaming.
    pub speaking_url: String,
    /// Shown right after the avatar is picked.
    pub tap_url: String,
}

/// Which clip an avatar should currently display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvatarMood {
    /// Nothing is happening.
    Idle,
    /// The user is typing.
    Listening,
    /// A reply is streaming.
    Speaking,
}

impl AvatarMood {
    /// Streaming takes precedence over typing.
    #[must_use]
    pub const fn from_activity(streaming: bool, typing: bool) -> Self {
        if streaming {
            Self::Speaking
        } else if typing {
            Self::Listening
        } else {
            Self::Idle
        }
    }
}

impl Avatar {
    /// The avatar used whenever the backend does not supply one.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            id: 1,
            static_url: "/images/still.gif".into(),
            listening_url: "/images/listening.gif".into(),
            speaking_url: "/images/speaking.gif".into(),
            tap_url: "/images/start.gif".into(),
        }
    }

    /// Clip to show for `mood`.
    #[must_use]
    pub fn media_for(&self, mood: AvatarMood) -> &str {
        match mood {
            AvatarMood::Idle => &self.static_url,
            AvatarMood::Listening => &self.listening_url,
            AvatarMood::Speaking => &self.speaking_url,
        }
    }
}

/// Avatars the user can pick from when starting a conversation.
#[must_use]
pub fn avatars() -> Vec<Avatar> {
    vec![Avatar::fallback()]
}

/// Looks up an avatar in the catalog.
#[must_use]
pub fn find_avatar(id: u32) -> Option<Avatar> {
    avatars().into_iter().find(|avatar| avatar.id == id)
}
