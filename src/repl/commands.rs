use std::str::FromStr;

use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Commands that can be invoked by starting a line with a leading slash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SlashCommand {
    /// Start a new conversation
    New,
    /// List conversations
    List,
    /// Switch to another conversation
    Open,
    /// Reprint the active conversation
    History,
    /// Rate an assistant message
    Rate,
    /// Show the signed-in user
    Whoami,
    /// Sign out and leave
    Logout,
    /// Show help
    Help,
    /// Exit the application
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: SlashCommand,
    pub argument: Option<String>,
}

/// Arguments of `/rate <message-id> <rating> [comment]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateArgs {
    pub message_id: String,
    pub rating: i32,
    pub comment: Option<String>,
}

impl ParsedCommand {
    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }

    /// Range is not checked here; the feedback editor does that.
    pub fn rate_args(&self) -> Option<RateArgs> {
        if self.command != SlashCommand::Rate {
            return None;
        }

        let (message_id, rest) = split_head(self.argument()?)?;
        let (rating, comment) = split_head(rest).unwrap_or((rest, ""));
        let rating = rating.parse::<i32>().ok()?;

        Some(RateArgs {
            message_id: message_id.to_string(),
            rating,
            comment: (!comment.is_empty()).then(|| comment.to_string()),
        })
    }
}

impl SlashCommand {
    /// User-visible description shown in help.
    pub fn description(self) -> &'static str {
        match self {
            SlashCommand::New => "start a new conversation, optionally with a title",
            SlashCommand::List => "list your conversations",
            SlashCommand::Open => "switch to the conversation with the given id",
            SlashCommand::History => "show the messages of the current conversation",
            SlashCommand::Rate => "rate an assistant reply: /rate <message-id> <1-10> [comment]",
            SlashCommand::Whoami => "show the signed-in user",
            SlashCommand::Logout => "sign out and exit",
            SlashCommand::Help => "show available commands",
            SlashCommand::Quit => "exit the application",
        }
    }

    /// Command string without the leading '/'.
    pub fn command(self) -> &'static str {
        self.into()
    }
}

/// Return all built-in commands in a Vec paired with their command string.
pub fn built_in_slash_commands() -> Vec<(&'static str, SlashCommand)> {
    SlashCommand::iter().map(|c| (c.command(), c)).collect()
}

/// Parse a slash command from user input
pub fn parse_slash_command(input: &str) -> Option<ParsedCommand> {
    let body = input.trim().strip_prefix('/')?;
    let (head, rest) = split_head(body).unwrap_or((body, ""));
    if head.is_empty() {
        return None;
    }

    let command = SlashCommand::from_str(&head.to_lowercase())
        .ok()
        .or_else(|| match head.to_lowercase().as_str() {
            "q" | "exit" | "bye" => Some(SlashCommand::Quit),
            "o" => Some(SlashCommand::Open),
            "ls" => Some(SlashCommand::List),
            "h" | "?" => Some(SlashCommand::Help),
            _ => None,
        })?;

    let argument = (!rest.is_empty()).then(|| rest.to_string());
    Some(ParsedCommand { command, argument })
}

/// Get help text for all available commands
pub fn get_help_text() -> String {
    let mut help = String::from("Available commands:\n\n");
    for (command_str, command) in built_in_slash_commands() {
        help.push_str(&format!("/{} - {}\n", command_str, command.description()));
    }

    help.push_str("\nAliases: /q and /exit for /quit, /o for /open, /ls for /list");
    help.push_str("\nAnything not starting with '/' is sent to the assistant.");

    help
}

/// First whitespace-delimited word and the trimmed remainder
fn split_head(text: &str) -> Option<(&str, &str)> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match text.split_once(char::is_whitespace) {
        Some((head, rest)) => Some((head, rest.trim())),
        None => Some((text, "")),
    }
}
