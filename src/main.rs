use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use chatsync::Config;
use chatsync::commands;

#[derive(Parser)]
#[command(name = "chatsync")]
#[command(version)]
#[command(about = "Chat with a remote assistant and rate its replies", long_about = None)]
struct Cli {
    /// Base URL of the conversation service
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Bearer token for the service
    #[arg(long, global = true)]
    token: Option<String>,

    /// tracing filter used when RUST_LOG is unset
    #[arg(long, global = true)]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the signed-in user
    Whoami,
    /// List conversations in the order the service returns them
    List,
    /// Delete a conversation
    Delete { id: String },
    /// Open the interactive chat
    Chat {
        /// Conversation to open instead of the most recent one
        #[arg(long)]
        conversation: Option<String>,
        /// Start a fresh conversation
        #[arg(long, conflicts_with = "conversation")]
        new: bool,
    },
}

fn init_tracing(config: &Config) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    config.apply_env_overrides(cli.api_url, cli.token);
    if let Some(filter) = cli.log_filter {
        config.log_filter = filter;
    }
    init_tracing(&config);

    match cli.command.unwrap_or(Commands::Chat {
        conversation: None,
        new: false,
    }) {
        Commands::Whoami => commands::whoami(&config).await,
        Commands::List => commands::list_conversations(&config).await,
        Commands::Delete { id } => commands::delete_conversation(&config, &id).await,
        Commands::Chat { conversation, new } => {
            commands::chat(&config, conversation.as_deref(), new).await
        }
    }
}
