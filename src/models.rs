use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Default title for conversations allocated without one
pub const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";

/// Longest preview shown for a conversation's last message
pub const PREVIEW_MAX_CHARS: usize = 30;

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Tag used when building locally generated message ids
    pub fn tag(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Role::User => "You",
            Role::Assistant => "Assistant",
        }
    }
}

/// A rating with an optional comment, attached to an assistant message
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Feedback {
    /// 1-10; `None` while pending
    pub rating: Option<u8>,
    #[serde(default)]
    pub comment: String,
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rating {
            Some(rating) => write!(f, "Rating: {}/10", rating)?,
            None => write!(f, "Rating: pending")?,
        }
        if !self.comment.is_empty() {
            write!(f, " \"{}\"", self.comment)?;
        }
        Ok(())
    }
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub feedback: Option<Feedback>,
}

impl Message {
    pub fn new(id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            feedback: None,
        }
    }

    pub fn accepts_feedback(&self) -> bool {
        self.role == Role::Assistant
    }
}

/// A titled, ordered sequence of messages owned by one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(
        default,
        alias = "createdAt",
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    /// Advisory; only used for display ordering
    #[serde(
        default,
        alias = "updatedAt",
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Conversation {
    /// Last message content, truncated for list display
    pub fn preview(&self) -> String {
        let Some(last) = self.messages.last() else {
            return "No messages".to_string();
        };
        if last.content.chars().count() <= PREVIEW_MAX_CHARS {
            return last.content.clone();
        }
        let truncated: String = last.content.chars().take(PREVIEW_MAX_CHARS).collect();
        format!("{}...", truncated)
    }

    /// Relative label for `updated_at`: "Today, 14:05", "Yesterday, 09:30" or "Jun 6"
    pub fn updated_label(&self, now: DateTime<Local>) -> String {
        let Some(updated) = self.updated_at else {
            return "No date".to_string();
        };
        let updated = updated.with_timezone(&Local);
        let today = now.date_naive();
        let day = updated.date_naive();

        if day >= today {
            format!("Today, {}", updated.format("%H:%M"))
        } else if day >= today - Duration::days(1) {
            format!("Yesterday, {}", updated.format("%H:%M"))
        } else {
            updated.format("%b %-d").to_string()
        }
    }
}

/// The authenticated account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "user".to_string()
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case("admin")
    }
}

/// Body of `POST /conversations`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewConversation {
    pub title: String,
    pub messages: Vec<Message>,
}

/// Body of `PUT /conversations/{id}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
}

/// Body of `POST /chat`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// Response of `POST /chat`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Body of `POST /feedback`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub message_id: String,
    pub conversation_id: String,
    pub rating: u8,
    pub comment: String,
}

/// Error body returned by the service on non-success status
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    /// `detail` is usually a string; validation failures send a list
    pub fn detail_text(&self) -> Option<String> {
        match self.detail.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// Accepts RFC 3339 or a naive ISO timestamp (taken as UTC)
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(Utc.from_utc_datetime(&naive)))
        .map_err(serde::de::Error::custom)
}
