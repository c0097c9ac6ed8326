//! Line-based chat loop over stdin

pub mod commands;

pub use commands::{get_help_text, parse_slash_command, ParsedCommand, RateArgs, SlashCommand};

use anyhow::Result;
use chrono::{DateTime, Local};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::client::ChatClient;
use crate::conversation::ExchangeOutcome;
use crate::error::ChatError;
use crate::models::{Conversation, Message};

/// Whether the loop keeps reading after a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Read lines until EOF, `/quit` or `/logout`
pub async fn run(client: &mut ChatClient) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut out = std::io::stdout();

    print_header(client, &mut out)?;
    loop {
        write!(out, "> ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(out)?;
            break;
        };
        if handle_line(client, &line, &mut out).await? == Flow::Quit {
            break;
        }
    }
    Ok(())
}

/// Apply one line of input. Service errors are printed, only I/O errors escape.
pub async fn handle_line<W: Write>(client: &mut ChatClient, line: &str, out: &mut W) -> Result<Flow> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Flow::Continue);
    }

    if line.starts_with('/') {
        let Some(parsed) = parse_slash_command(line) else {
            writeln!(out, "Unknown command: {} (try /help)", line)?;
            return Ok(Flow::Continue);
        };
        return run_command(client, parsed, out).await;
    }

    match client.send(line).await {
        Ok(ExchangeOutcome::Completed { messages, .. }) => {
            if let Some(reply) = messages.last() {
                writeln!(out, "{}", format_message(reply))?;
            }
        }
        Ok(ExchangeOutcome::Skipped) => {}
        Ok(ExchangeOutcome::Discarded) => {
            writeln!(out, "(reply arrived for a conversation that is no longer open)")?;
        }
        Err(err) => return report(out, &err),
    }
    Ok(Flow::Continue)
}

async fn run_command<W: Write>(client: &mut ChatClient, parsed: ParsedCommand, out: &mut W) -> Result<Flow> {
    match parsed.command {
        SlashCommand::New => match client.new_conversation(parsed.argument()).await {
            Ok(id) => writeln!(out, "Started conversation {}", id)?,
            Err(err) => return report(out, &err),
        },
        SlashCommand::List => match client.refresh().await {
            Ok(_) => print_conversations(client, out)?,
            Err(err) => return report(out, &err),
        },
        SlashCommand::Open => {
            let Some(id) = parsed.argument() else {
                writeln!(out, "Usage: /open <conversation-id>")?;
                return Ok(Flow::Continue);
            };
            match client.open(id).await {
                Ok(()) => print_history(client, out)?,
                Err(ChatError::NotFound(_)) => writeln!(out, "No conversation with id {}", id)?,
                Err(err) => return report(out, &err),
            }
        }
        SlashCommand::History => print_history(client, out)?,
        SlashCommand::Rate => {
            let Some(args) = parsed.rate_args() else {
                writeln!(out, "Usage: /rate <message-id> <1-10> [comment]")?;
                return Ok(Flow::Continue);
            };
            if let Err(err) = rate(client, &args).await {
                // one-shot command: nothing is left to edit the draft with
                client.cancel_feedback();
                return report(out, &err);
            }
            writeln!(out, "Thanks for the feedback.")?;
        }
        SlashCommand::Whoami => match client.user() {
            Some(user) => writeln!(out, "{} <{}> ({})", user.username, user.email, user.role)?,
            None => writeln!(out, "Not signed in")?,
        },
        SlashCommand::Logout => {
            client.logout();
            writeln!(out, "Signed out.")?;
            return Ok(Flow::Quit);
        }
        SlashCommand::Help => writeln!(out, "{}", get_help_text())?,
        SlashCommand::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}

async fn rate(client: &mut ChatClient, args: &RateArgs) -> crate::error::Result<()> {
    client.open_feedback(&args.message_id)?;
    client.set_rating(args.rating)?;
    if let Some(comment) = &args.comment {
        client.set_comment(comment)?;
    }
    client.submit_feedback(&args.message_id).await
}

/// Print the error; a rejected credential ends the loop
fn report<W: Write>(out: &mut W, err: &ChatError) -> Result<Flow> {
    match err {
        ChatError::Unauthenticated => {
            writeln!(out, "Your session has expired. Sign in again and restart.")?;
            Ok(Flow::Quit)
        }
        ChatError::RemoteUnavailable { .. } => {
            writeln!(out, "Error: {}. You can try again.", err)?;
            Ok(Flow::Continue)
        }
        _ => {
            writeln!(out, "Error: {}", err)?;
            Ok(Flow::Continue)
        }
    }
}

fn print_header<W: Write>(client: &ChatClient, out: &mut W) -> Result<()> {
    if let Some(user) = client.user() {
        writeln!(out, "Signed in as {}. Type /help for commands.", user.username)?;
    }
    match client.registry().active() {
        Some(conversation) => {
            writeln!(out, "Conversation: {} ({})", conversation.title, conversation.id)?;
            print_history(client, out)?;
        }
        None => writeln!(out, "No conversation selected; your first message starts one.")?,
    }
    Ok(())
}

fn print_history<W: Write>(client: &ChatClient, out: &mut W) -> Result<()> {
    let messages = client.messages();
    if messages.is_empty() {
        writeln!(out, "(no messages yet)")?;
    }
    for message in messages {
        writeln!(out, "{}", format_message(message))?;
    }
    Ok(())
}

fn print_conversations<W: Write>(client: &ChatClient, out: &mut W) -> Result<()> {
    let conversations = client.conversations();
    if conversations.is_empty() {
        writeln!(out, "No conversations yet.")?;
        return Ok(());
    }
    let active = client.registry().active_id();
    let now = Local::now();
    for conversation in conversations {
        let is_active = active == Some(conversation.id.as_str());
        writeln!(out, "{}", format_conversation(conversation, is_active, now))?;
    }
    Ok(())
}

/// `[id] Role: content`, with the feedback on a second line
pub fn format_message(message: &Message) -> String {
    let mut line = format!(
        "[{}] {}: {}",
        message.id,
        message.role.display_name(),
        message.content
    );
    if let Some(feedback) = &message.feedback {
        line.push_str(&format!("\n    {}", feedback));
    }
    line
}

/// Two-line list entry; the active conversation is starred
pub fn format_conversation(conversation: &Conversation, active: bool, now: DateTime<Local>) -> String {
    format!(
        "{} {}  {}  [{}]\n    {}",
        if active { "*" } else { " " },
        conversation.title,
        conversation.updated_label(now),
        conversation.id,
        conversation.preview()
    )
}
