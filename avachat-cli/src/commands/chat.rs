use std::io::{self, Write};

use anyhow::{Result, bail};
use clap::Args;
use client::{
    BackendClient, ChatSettings, ChatStream, ChatUpdate, ConversationStorage, EventStreamClient,
    HistoryLoader, HttpTransport, LocaleSwitch, SessionLauncher, TeardownReason,
};
use shared::{
    config::{ClientConfig, client::ENV_BACKEND_URL},
    models::{AvatarMood, ChatMessage, Locale, MessageRole, UserData},
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    signal,
};
use tracing::info;

use super::session::start_conversation;

const HELP: &str =
    "Commands: /suggest [n], /resend, /new, /lang <en|ja>, /dismiss, /help, /quit";

/// Canned prompts offered by `/suggest`.
const SUGGESTIONS: [&str; 4] = [
    "Tell me a fun fact",
    "What should I watch today?",
    "Help me plan a weekend trip",
    "Teach me a Japanese greeting",
];

#[derive(Args, Debug)]
#[command(about = "Start an interactive chat with an avatar")]
pub struct ChatArgs {
    /// Conversation to resume; defaults to the one remembered for --lang
    #[arg(long, alias = "conv")]
    pub conversation: Option<String>,

    /// Avatar used when a new conversation is started
    #[arg(long, default_value_t = 1)]
    pub avatar: u32,

    /// Language of the replies (en or ja)
    #[arg(long, default_value = "en")]
    pub lang: Locale,

    /// User context as JSON, e.g. '{"name":"Aiko","city":"Osaka"}'
    #[arg(long)]
    pub user: Option<String>,

    /// Send a single message, print the reply, and exit
    #[arg(long, short)]
    pub message: Option<String>,
}

/// One line of the transcript.
pub fn render_message(message: &ChatMessage) -> String {
    let speaker = match message.role {
        MessageRole::User => "you",
        MessageRole::Assistant => "avatar",
    };
    format!("{speaker}> {}", message.content)
}

pub async fn run(config: &ClientConfig, args: ChatArgs) -> Result<()> {
    let backend = BackendClient::new(config);
    if backend.base_url().is_none() {
        bail!(
            "network error: backend URL is not configured; set {ENV_BACKEND_URL} or pass --backend"
        );
    }

    let storage = ConversationStorage::from_config(&config.storage);
    let launcher = SessionLauncher::new(backend.clone());
    let user = UserData::from_param(args.user.as_deref());
    let conversation_id = match args.conversation.or_else(|| storage.get(args.lang)) {
        Some(id) => id,
        None => start_conversation(&launcher, &storage, args.avatar, &user, args.lang).await?,
    };
    info!(%conversation_id, locale = %args.lang, "chat opened");

    let chat = ChatStream::new(
        EventStreamClient::new(HttpTransport::new(backend.http().clone())),
        backend.stream_endpoint(conversation_id.clone(), user.clone(), args.lang),
        ChatSettings::from_config(config),
    );
    let mut session = ChatSession {
        chat,
        loader: HistoryLoader::new(backend, config.history_limit),
        launcher,
        storage,
        user,
        avatar_id: args.avatar,
        locale: args.lang,
    };
    session.show_history().await?;

    match args.message {
        Some(message) => session.send_once(&message).await,
        None => session.interact().await,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

struct ChatSession {
    chat: ChatStream<HttpTransport>,
    loader: HistoryLoader,
    launcher: SessionLauncher,
    storage: ConversationStorage,
    user: UserData,
    avatar_id: u32,
    locale: Locale,
}

impl ChatSession {
    async fn show_history(&mut self) -> Result<()> {
        let conversation_id = self.chat.endpoint().conversation_id.clone();
        let outcome = self.loader.load(&conversation_id).await;
        if let Some(error) = &outcome.error {
            eprintln!("warning: {error}");
        }

        let mut out = io::stdout().lock();
        writeln!(
            out,
            "[{}] conversation {conversation_id}, avatar #{} ({})",
            self.locale.native_name(),
            outcome.avatar.id,
            outcome
                .avatar
                .media_for(AvatarMood::from_activity(self.chat.is_streaming(), false))
        )?;
        if self.chat.apply_history(outcome.messages) {
            for message in self.chat.messages() {
                writeln!(out, "{}", render_message(message))?;
            }
        }
        out.flush()?;
        Ok(())
    }

    async fn send_once(&mut self, text: &str) -> Result<()> {
        if self.chat.send_message(text)?.is_none() {
            bail!("message is empty");
        }
        begin_reply()?;
        for update in self.chat.finish().await {
            render_update(&update)?;
        }
        if let Some(error) = self.chat.error() {
            bail!("{error}");
        }
        Ok(())
    }

    async fn interact(&mut self) -> Result<()> {
        println!("{HELP}");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let ctrl_c = signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    self.chat.teardown(TeardownReason::Unload);
                    println!();
                    break;
                }
                update = self.chat.next_update(), if self.chat.is_streaming() => {
                    if let Some(update) = update {
                        render_update(&update)?;
                        if let (ChatUpdate::Failed { .. }, Some(error)) = (&update, self.chat.error()) {
                            eprintln!("error: {error} (type /resend to try again)");
                        }
                    }
                }
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        for update in self.chat.finish().await {
                            render_update(&update)?;
                        }
                        break;
                    };
                    if self.handle_line(&line).await? == Flow::Quit {
                        self.chat.teardown(TeardownReason::Unmount);
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    async fn handle_line(&mut self, line: &str) -> Result<Flow> {
        let trimmed = line.trim();
        let (command, argument) = trimmed
            .split_once(char::is_whitespace)
            .map_or((trimmed, ""), |(command, rest)| (command, rest.trim()));

        match command {
            "/quit" | "/exit" => return Ok(Flow::Quit),
            "/help" => println!("{HELP}"),
            "/dismiss" => self.chat.dismiss_error(),
            "/suggest" if argument.is_empty() => {
                for (idx, suggestion) in SUGGESTIONS.iter().enumerate() {
                    println!("  {}. {suggestion}", idx + 1);
                }
            }
            "/suggest" => {
                if self.chat.is_streaming() {
                    eprintln!("error: suggestions are disabled while a reply is streaming");
                    return Ok(Flow::Continue);
                }
                match pick_suggestion(argument) {
                    Some(text) => {
                        println!("you> {text}");
                        match self.chat.send_message(text) {
                            Ok(Some(sent)) => start_reply(sent.replaced.as_ref())?,
                            Ok(None) => {}
                            Err(err) => eprintln!("error: {}", err.user_message()),
                        }
                    }
                    None => eprintln!(
                        "error: pick a suggestion between 1 and {}",
                        SUGGESTIONS.len()
                    ),
                }
            }
            "/resend" => {
                match self.chat.resend_last() {
                    Ok(Some(sent)) => start_reply(sent.replaced.as_ref())?,
                    Ok(None) => println!("Nothing to resend."),
                    Err(err) => eprintln!("error: {}", err.user_message()),
                }
            }
            "/new" => self.start_new().await?,
            "/lang" => match argument.parse::<Locale>() {
                Ok(locale) => self.switch_language(locale).await?,
                Err(_) => eprintln!("error: unsupported language '{argument}', use en or ja"),
            },
            _ => {
                match self.chat.send_message(line) {
                    Ok(Some(sent)) => start_reply(sent.replaced.as_ref())?,
                    Ok(None) => {}
                    Err(err) => eprintln!("error: {}", err.user_message()),
                }
            }
        }
        Ok(Flow::Continue)
    }

    async fn start_new(&mut self) -> Result<()> {
        match start_conversation(
            &self.launcher,
            &self.storage,
            self.avatar_id,
            &self.user,
            self.locale,
        )
        .await
        {
            Ok(id) => {
                self.enter_conversation(id).await?;
            }
            Err(err) => eprintln!("error: {err:#}"),
        }
        Ok(())
    }

    async fn switch_language(&mut self, target: Locale) -> Result<()> {
        if target == self.locale {
            println!("Already chatting in {}.", target.native_name());
            return Ok(());
        }

        let conversation_id = match self.storage.switch_to(target) {
            LocaleSwitch::Resume(id) => id,
            LocaleSwitch::Fresh => {
                match start_conversation(&self.launcher, &self.storage, self.avatar_id, &self.user, target)
                    .await
                {
                    Ok(id) => id,
                    Err(err) => {
                        eprintln!("error: {err:#}");
                        return Ok(());
                    }
                }
            }
        };

        self.locale = target;
        self.chat.set_locale(target);
        self.enter_conversation(conversation_id).await
    }

    async fn enter_conversation(&mut self, conversation_id: String) -> Result<()> {
        if self.chat.is_streaming() {
            println!();
        }
        self.chat.switch_conversation(conversation_id);
        self.show_history().await
    }
}

/// Finishes the line of a reply cut short by this send, then opens the next.
fn start_reply(replaced: Option<&ChatUpdate>) -> Result<()> {
    if let Some(update) = replaced {
        render_update(update)?;
    }
    begin_reply()
}

fn begin_reply() -> Result<()> {
    let mut out = io::stdout().lock();
    write!(out, "avatar> ")?;
    out.flush()?;
    Ok(())
}

/// 1-based lookup into [`SUGGESTIONS`].
fn pick_suggestion(argument: &str) -> Option<&'static str> {
    let index = argument.trim().parse::<usize>().ok()?;
    SUGGESTIONS.get(index.checked_sub(1)?).copied()
}

/// Terminal text for one update; terminal updates end the line.
fn update_text(update: &ChatUpdate) -> String {
    match update {
        ChatUpdate::Flushed { delta, .. } => delta.clone(),
        ChatUpdate::Completed { tail, .. } | ChatUpdate::Failed { tail, .. } => {
            format!("{}\n", tail.as_deref().unwrap_or_default())
        }
    }
}

fn render_update(update: &ChatUpdate) -> Result<()> {
    let mut out = io::stdout().lock();
    write!(out, "{}", update_text(update))?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_lines_name_the_speaker() {
        let user = ChatMessage::new(MessageRole::User, "hello");
        let reply = ChatMessage::new(MessageRole::Assistant, "Hi there");

        assert_eq!(render_message(&user), "you> hello");
        assert_eq!(render_message(&reply), "avatar> Hi there");
    }

    #[test]
    fn replaced_reply_prints_its_last_text_and_ends_the_line() {
        let replaced = ChatUpdate::Completed {
            message_id: "a-1".to_string(),
            tail: Some(" more".to_string()),
        };
        let nothing_left = ChatUpdate::Completed {
            message_id: "a-1".to_string(),
            tail: None,
        };
        let flushed = ChatUpdate::Flushed {
            message_id: "a-2".to_string(),
            delta: "Hi".to_string(),
        };

        assert_eq!(update_text(&replaced), " more\n");
        assert_eq!(update_text(&nothing_left), "\n");
        assert_eq!(update_text(&flushed), "Hi");
    }

    #[test]
    fn suggestions_are_picked_by_position() {
        assert_eq!(pick_suggestion("1"), Some("Tell me a fun fact"));
        assert_eq!(pick_suggestion(" 4 "), Some("Teach me a Japanese greeting"));
        assert_eq!(pick_suggestion("0"), None);
        assert_eq!(pick_suggestion("5"), None);
        assert_eq!(pick_suggestion("two"), None);
    }
}
