use anyhow::{bail, Context, Result};
use chrono::Local;

use crate::client::ChatClient;
use crate::config::{Config, TOKEN_ENV};
use crate::repl;

/// Build a client and load the user's conversations
async fn connect(config: &Config) -> Result<ChatClient> {
    if !config.has_token() {
        bail!(
            "No token configured. Set {} or pass --token to sign in.",
            TOKEN_ENV
        );
    }

    let mut client = ChatClient::from_config(config)?;
    client
        .start()
        .await
        .with_context(|| format!("Could not sign in to {}", config.base_url()))?;
    Ok(client)
}

pub async fn whoami(config: &Config) -> Result<()> {
    let client = connect(config).await?;
    let Some(user) = client.user() else {
        bail!("Signed in but no user was returned");
    };

    println!("👤 {} <{}>", user.username, user.email);
    println!("   Role: {}", if user.is_admin() { "admin" } else { "user" });
    println!("   Conversations: {}", client.conversations().len());
    Ok(())
}

pub async fn list_conversations(config: &Config) -> Result<()> {
    let client = connect(config).await?;
    let conversations = client.conversations();

    if conversations.is_empty() {
        println!("📭 No conversations yet. Run 'chatsync chat' to start one!");
        return Ok(());
    }

    println!("📋 Your conversations:");
    println!("{}", "=".repeat(50));

    let now = Local::now();
    for conversation in conversations {
        println!("{}", repl::format_conversation(conversation, false, now));
        println!();
    }
    Ok(())
}

pub async fn delete_conversation(config: &Config, id: &str) -> Result<()> {
    let mut client = connect(config).await?;
    client
        .delete_conversation(id)
        .await
        .with_context(|| format!("Could not delete conversation '{}'", id))?;

    println!("🗑️  Deleted conversation {}", id);
    Ok(())
}

pub async fn chat(config: &Config, conversation: Option<&str>, new: bool) -> Result<()> {
    let mut client = connect(config).await?;

    if new {
        client.new_conversation(None).await?;
    } else if let Some(id) = conversation {
        client.open(id).await.with_context(|| {
            format!("Could not open conversation '{}'. Run 'chatsync list' to see available conversations.", id)
        })?;
    }

    repl::run(&mut client).await
}
