//! Runs the client against an in-process backend speaking the real wire
//! formats.

use std::{collections::HashMap, convert::Infallible, time::Duration};

use axum::{
    Json, Router,
    extract::{Path, Query},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
    routing::{get, post},
};
use client::{
    BackendClient, ChatSettings, ChatStream, ChatUpdate, ClientError, EventStreamClient,
    HistoryLoader, HttpTransport, SessionLauncher, StreamFailure, StreamState, TransportError,
    CONNECTION_LOST_MESSAGE,
};
use futures_util::stream;
use reqwest::Client;
use serde_json::json;
use shared::models::{Avatar, ChatMessage, CreateSessionRequest, Locale, MessageRole, UserData};
use tokio::net::TcpListener;
use url::Url;

async fn chat_stream(Query(params): Query<HashMap<String, String>>) -> Response {
    let message = params.get("message").cloned().unwrap_or_default();
    let events: Vec<(&str, String)> = match message.as_str() {
        "hello" => vec![
            ("token", json!({ "content": "Hi" }).to_string()),
            ("ping", "{}".to_string()),
            ("token", json!({ "content": " there" }).to_string()),
            ("done", "{}".to_string()),
        ],
        "x" => vec![("error", json!({ "error": "rate limited" }).to_string())],
        "hang up" => vec![("token", json!({ "content": "partial" }).to_string())],
        "reject" => return StatusCode::SERVICE_UNAVAILABLE.into_response(),
        _ => {
            let echo = format!(
                "{}|{}|{}|{}",
                params.get("conversationId").cloned().unwrap_or_default(),
                message,
                params.get("userData").cloned().unwrap_or_default(),
                params.get("lang").cloned().unwrap_or_default(),
            );
            vec![
                ("token", json!({ "content": echo }).to_string()),
                ("done", "{}".to_string()),
            ]
        }
    };

    let events = events
        .into_iter()
        .map(|(name, data)| Ok::<_, Infallible>(Event::default().event(name).data(data)));
    Sse::new(stream::iter(events)).into_response()
}

async fn create_session(Json(request): Json<CreateSessionRequest>) -> Response {
    match request.avatar_id {
        98 => StatusCode::BAD_GATEWAY.into_response(),
        99 => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "avatar unavailable" })),
        )
            .into_response(),
        id => {
            if id == 7 {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Json(json!({ "sessionId": format!("session-{id}-{}", request.user_data.name) }))
                .into_response()
        }
    }
}

async fn conversation(Path(id): Path<String>) -> Response {
    match id.as_str() {
        "missing" => StatusCode::NOT_FOUND.into_response(),
        "broken" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        "long" => {
            let messages: Vec<ChatMessage> = (0..60)
                .map(|i| ChatMessage {
                    id: format!("m-{i}"),
                    role: if i % 2 == 0 {
                        MessageRole::User
                    } else {
                        MessageRole::Assistant
                    },
                    content: format!("message {i}"),
                })
                .collect();
            Json(json!({ "messages": messages })).into_response()
        }
        _ => {
            let avatar = Avatar {
                id: 2,
                static_url: "/images/fox/still.gif".to_string(),
                listening_url: "/images/fox/listening.gif".to_string(),
                speaking_url: "/images/fox/speaking.gif".to_string(),
                tap_url: "/images/fox/start.gif".to_string(),
            };
            Json(json!({
                "messages": [
                    { "id": "a", "role": "user", "content": "hello" },
                    { "id": "b", "role": "assistant", "content": "Hi there" },
                ],
                "avatar": avatar,
            }))
            .into_response()
        }
    }
}

async fn spawn_backend() -> Url {
    let app = Router::new()
        .route("/api/chat/stream", get(chat_stream))
        .route("/api/session", post(create_session))
        .route("/api/conversations/{id}", get(conversation));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Url::parse(&format!("http://{addr}")).unwrap()
}

async fn chat_against(base: Url) -> ChatStream<HttpTransport> {
    let backend = BackendClient::with_http(Some(base), Client::new());
    let endpoint = backend.stream_endpoint("conv-1", UserData::new("Aiko", "Osaka"), Locale::Ja);
    ChatStream::new(
        EventStreamClient::new(HttpTransport::default()),
        endpoint,
        ChatSettings::default(),
    )
}

#[tokio::test]
async fn streams_a_reply_over_http() {
    let mut chat = chat_against(spawn_backend().await).await;

    let sent = chat.send_message("hello").unwrap().unwrap();
    let updates = chat.finish().await;

    assert_eq!(chat.store().get(&sent.assistant_id).unwrap().content, "Hi there");
    assert_eq!(chat.state(), StreamState::Idle);
    assert_eq!(chat.live_handles(), 0);
    assert!(matches!(updates.last(), Some(ChatUpdate::Completed { .. })));
}

#[tokio::test]
async fn stream_url_carries_encoded_context() {
    let mut chat = chat_against(spawn_backend().await).await;

    let sent = chat.send_message("what & why?").unwrap().unwrap();
    chat.finish().await;

    assert_eq!(
        chat.store().get(&sent.assistant_id).unwrap().content,
        r#"conv-1|what & why?|{"name":"Aiko","city":"Osaka"}|ja"#
    );
}

#[tokio::test]
async fn server_error_event_is_shown_verbatim() {
    let mut chat = chat_against(spawn_backend().await).await;

    chat.send_message("x").unwrap();
    let updates = chat.finish().await;

    assert_eq!(chat.error(), Some("rate limited"));
    assert!(matches!(
        updates.as_slice(),
        [ChatUpdate::Failed {
            failure: StreamFailure::Server(_),
            ..
        }]
    ));
}

#[tokio::test]
async fn early_hang_up_keeps_partial_text() {
    let mut chat = chat_against(spawn_backend().await).await;

    let sent = chat.send_message("hang up").unwrap().unwrap();
    let updates = chat.finish().await;

    assert_eq!(chat.store().get(&sent.assistant_id).unwrap().content, "partial");
    assert_eq!(chat.error(), Some(CONNECTION_LOST_MESSAGE));
    assert!(matches!(
        updates.last(),
        Some(ChatUpdate::Failed {
            failure: StreamFailure::Connection(TransportError::Closed),
            ..
        })
    ));
}

#[tokio::test]
async fn rejected_stream_is_a_connection_failure() {
    let mut chat = chat_against(spawn_backend().await).await;

    chat.send_message("reject").unwrap();
    let updates = chat.finish().await;

    assert!(matches!(
        updates.as_slice(),
        [ChatUpdate::Failed {
            failure: StreamFailure::Connection(TransportError::Status(503)),
            ..
        }]
    ));
}

#[tokio::test]
async fn creates_sessions_and_reports_backend_messages() {
    let base = spawn_backend().await;
    let backend = BackendClient::with_http(Some(base), Client::new());
    let user = UserData::new("John", "Tokyo");

    assert_eq!(backend.create_session(3, &user).await.unwrap(), "session-3-John");

    let explained = backend.create_session(99, &user).await.unwrap_err();
    assert_eq!(explained.user_message(), "avatar unavailable");
    assert_eq!(explained.status(), Some(reqwest::StatusCode::INTERNAL_SERVER_ERROR));

    let unexplained = backend.create_session(98, &user).await.unwrap_err();
    assert_eq!(unexplained.user_message(), "Failed to create session");
}

#[tokio::test]
async fn overlapping_launches_are_refused() {
    let base = spawn_backend().await;
    let launcher = SessionLauncher::new(BackendClient::with_http(Some(base), Client::new()));
    let user = UserData::default();

    let (first, second) = tokio::join!(launcher.launch(7, &user), launcher.launch(7, &user));

    assert_eq!(first.unwrap(), "session-7-User");
    assert!(matches!(second, Err(ClientError::SessionInFlight)));
    assert!(!launcher.is_launching());
}

#[tokio::test]
async fn history_loads_messages_and_avatar() {
    let base = spawn_backend().await;
    let loader = HistoryLoader::new(BackendClient::with_http(Some(base), Client::new()), 50);

    let outcome = loader.load("known").await;

    assert_eq!(outcome.messages.len(), 2);
    assert_eq!(outcome.messages[1].content, "Hi there");
    assert_eq!(outcome.avatar.id, 2);
    assert_eq!(outcome.avatar.speaking_url, "/images/fox/speaking.gif");
    assert_eq!(outcome.error, None);
}

#[tokio::test]
async fn missing_history_is_a_fresh_conversation() {
    let base = spawn_backend().await;
    let loader = HistoryLoader::new(BackendClient::with_http(Some(base), Client::new()), 50);

    let outcome = loader.load("missing").await;

    assert!(outcome.messages.is_empty());
    assert_eq!(outcome.avatar, Avatar::fallback());
    assert_eq!(outcome.error, None);
}

#[tokio::test]
async fn broken_history_reports_and_falls_back() {
    let base = spawn_backend().await;
    let loader = HistoryLoader::new(BackendClient::with_http(Some(base), Client::new()), 50);

    let outcome = loader.load("broken").await;

    assert!(outcome.messages.is_empty());
    assert_eq!(outcome.avatar, Avatar::fallback());
    assert_eq!(outcome.error.as_deref(), Some("Failed to load conversation"));
}

#[tokio::test]
async fn long_history_is_capped_to_the_most_recent() {
    let base = spawn_backend().await;
    let loader = HistoryLoader::new(BackendClient::with_http(Some(base), Client::new()), 50);

    let outcome = loader.load("long").await;

    assert_eq!(outcome.messages.len(), 50);
    assert_eq!(outcome.messages[0].content, "message 10");
    assert_eq!(outcome.messages[49].content, "message 59");
    assert_eq!(outcome.avatar, Avatar::fallback());
}
