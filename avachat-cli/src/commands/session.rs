use anyhow::{Context, Result, bail};
use clap::Subcommand;
use client::{BackendClient, ConversationStorage, SessionLauncher};
use shared::{
    config::ClientConfig,
    models::{Locale, UserData},
};
use tracing::warn;

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// Start a new conversation and remember it for a language
    New {
        /// Avatar to talk to
        #[arg(long, default_value_t = 1)]
        avatar: u32,

        /// Language the conversation is held in (en or ja)
        #[arg(long, default_value = "en")]
        lang: Locale,

        /// User context as JSON, e.g. '{"name":"Aiko","city":"Osaka"}'
        #[arg(long)]
        user: Option<String>,
    },

    /// Show the conversations remembered per language
    Show,

    /// Forget the conversation of one language, or of all languages
    Clear {
        /// Language whose conversation is forgotten
        #[arg(long, conflicts_with = "all")]
        lang: Option<Locale>,

        /// Forget every remembered conversation
        #[arg(long)]
        all: bool,
    },
}

pub async fn run(config: &ClientConfig, action: SessionCommand) -> Result<()> {
    let storage = ConversationStorage::from_config(&config.storage);

    match action {
        SessionCommand::New { avatar, lang, user } => {
            let launcher = SessionLauncher::new(BackendClient::new(config));
            let user = UserData::from_param(user.as_deref());
            let id = start_conversation(&launcher, &storage, avatar, &user, lang).await?;
            println!("{lang}\t{id}");
        }
        SessionCommand::Show => {
            let entries = storage.entries();
            if entries.is_empty() {
                println!("No conversations stored in {}", storage.path().display());
            }
            for (locale, id) in entries {
                println!("{locale}\t{id}");
            }
        }
        SessionCommand::Clear { lang: Some(locale), .. } => {
            storage
                .clear(locale)
                .with_context(|| format!("failed to update {}", storage.path().display()))?;
            println!("Cleared the {} conversation.", locale.native_name());
        }
        SessionCommand::Clear { lang: None, all: true } => {
            storage
                .clear_all()
                .with_context(|| format!("failed to update {}", storage.path().display()))?;
            println!("Cleared all conversations.");
        }
        SessionCommand::Clear { lang: None, all: false } => {
            bail!("pass --lang <LANG> or --all");
        }
    }

    Ok(())
}

/// Creates a conversation and remembers it for `locale`. Failing to persist
/// the id is only logged; the conversation is usable either way.
pub async fn start_conversation(
    launcher: &SessionLauncher,
    storage: &ConversationStorage,
    avatar_id: u32,
    user: &UserData,
    locale: Locale,
) -> Result<String> {
    let id = launcher
        .launch(avatar_id, user)
        .await
        .map_err(|err| anyhow::anyhow!(err.user_message()))
        .context("failed to start a conversation")?;
    if let Err(err) = storage.set(locale, &id) {
        warn!(error = %err, "conversation id not persisted");
    }
    Ok(id)
}
