//! Error taxonomy for the synchronization core

use thiserror::Error;

/// Fallback text when the service gives no usable `detail`
pub const DEFAULT_ERROR_DETAIL: &str = "An error occurred";

/// Failures surfaced by the registry, the session, and the service binding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// No credential, or the service rejected it. Callers should send the user to login.
    #[error("not authenticated")]
    Unauthenticated,

    /// Network or service failure. Safe to retry by hand.
    #[error("remote service unavailable: {detail}")]
    RemoteUnavailable { status: Option<u16>, detail: String },

    /// The referenced conversation or message does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Feedback rating outside 1..=10, or never chosen
    #[error("rating must be between 1 and 10 (got {0})")]
    InvalidRating(i32),

    /// Feedback can only be attached to assistant messages
    #[error("message {0} does not accept feedback")]
    FeedbackNotAllowed(String),

    /// `submit` was called for a message whose editor is not open
    #[error("no feedback editor open for message {0}")]
    EditorNotOpen(String),
}

impl ChatError {
    pub fn remote(detail: impl Into<String>) -> Self {
        Self::RemoteUnavailable {
            status: None,
            detail: detail.into(),
        }
    }

    /// Map a non-success HTTP status and its error detail onto the taxonomy
    pub fn from_status(status: u16, detail: Option<String>) -> Self {
        let detail = detail
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ERROR_DETAIL.to_string());
        match status {
            401 | 403 => Self::Unauthenticated,
            404 => Self::NotFound(detail),
            _ => Self::RemoteUnavailable {
                status: Some(status),
                detail,
            },
        }
    }

    /// Only transport/service failures are worth offering a retry for.
    /// Nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteUnavailable { .. })
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        Self::RemoteUnavailable {
            status: err.status().map(|s| s.as_u16()),
            detail: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
