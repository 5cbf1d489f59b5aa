//! Data exchanged with the chat backend and shown in a conversation.

pub mod avatar;
pub mod message;
pub mod session;
pub mod streaming;

pub use avatar::{Avatar, AvatarMood, avatars, find_avatar};
pub use message::{ChatMessage, MessageRole};
pub use session::{
    ApiErrorBody, ConversationResponse, CreateSessionRequest, CreateSessionResponse, Locale,
    UserData,
};
pub use streaming::{StreamErrorPayload, TokenPayload, event_names};
