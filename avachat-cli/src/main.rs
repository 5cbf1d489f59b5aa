//! Main entry point for the Avachat CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use shared::config::ClientConfig;
use url::Url;

mod commands;
mod logging;

/// Avachat CLI
#[derive(Parser)]
#[command(name = "avachat")]
#[command(about = "Chat with an avatar over a streaming backend", long_about = None)]
struct Cli {
    /// Path to the configuration file (config.yaml or config.json)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL, overriding the configuration file and environment
    #[arg(long, global = true)]
    backend: Option<Url>,

    #[command(subcommand)]
    command: Commands,
}

/// Subcommands for the Avachat CLI
#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat with an avatar
    Chat(commands::chat::ChatArgs),

    /// Manage the conversations remembered per language
    Session {
        #[command(subcommand)]
        action: commands::session::SessionCommand,
    },

    /// Print the stored history of a conversation
    History(commands::history::HistoryArgs),

    /// Generate a configuration file
    Config {
        /// Format of the configuration file to generate (yaml or json). Defaults to yaml.
        #[arg(long, short)]
        format: Option<String>,

        /// Where to write the file. Defaults to config.<format> in the current directory.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Generate shell completion scripts for the CLI
    Completion {
        /// The shell type (bash, zsh, fish, powershell, elvish)
        #[arg(long, short)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Config { format, output } => {
            let format = format.unwrap_or_else(|| "yaml".to_string());
            commands::config::generate_config(&format, output)?;
        }
        Commands::Completion { shell } => {
            commands::completion::generate_completion(shell);
        }
        command => {
            let config = ClientConfig::load_config(cli.config, cli.backend)?;
            logging::initialize_tracing(&config);
            match command {
                Commands::Chat(args) => commands::chat::run(&config, args).await?,
                Commands::Session { action } => commands::session::run(&config, action).await?,
                Commands::History(args) => commands::history::run(&config, args).await?,
                Commands::Config { .. } | Commands::Completion { .. } => {}
            }
        }
    }

    Ok(())
}
