use anyhow::{Result, bail};
use clap::Args;
use client::{BackendClient, ConversationStorage, HistoryLoader};
use shared::{
    config::ClientConfig,
    models::{AvatarMood, Locale},
};

use super::chat::render_message;

#[derive(Args, Debug)]
#[command(about = "Print the stored history of a conversation")]
pub struct HistoryArgs {
    /// Conversation to print; defaults to the one remembered for --lang
    #[arg(long, alias = "conv")]
    pub conversation: Option<String>,

    /// Language whose remembered conversation is printed
    #[arg(long, default_value = "en")]
    pub lang: Locale,
}

pub async fn run(config: &ClientConfig, args: HistoryArgs) -> Result<()> {
    let storage = ConversationStorage::from_config(&config.storage);
    let Some(conversation_id) = args.conversation.or_else(|| storage.get(args.lang)) else {
        bail!(
            "no {} conversation stored; pass --conversation or run `avachat session new`",
            args.lang.native_name()
        );
    };

    let loader = HistoryLoader::new(BackendClient::new(config), config.history_limit);
    let outcome = loader.load(&conversation_id).await;
    if let Some(error) = outcome.error {
        bail!("{error}");
    }

    println!(
        "conversation {conversation_id} with avatar #{} ({})",
        outcome.avatar.id,
        outcome.avatar.media_for(AvatarMood::Idle)
    );
    if outcome.messages.is_empty() {
        println!("(no messages yet)");
    }
    for message in &outcome.messages {
        println!("{}", render_message(message));
    }
    Ok(())
}
