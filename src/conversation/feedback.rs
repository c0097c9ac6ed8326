//! Feedback editor state machine
//!
//! At most one editor is open per session. Drafts live here until `submit`
//! turns them into a [`Feedback`] value; cancelling never touches the message.

use crate::error::{ChatError, Result};
use crate::models::{Feedback, Message};

/// Lowest accepted rating
pub const MIN_RATING: i32 = 1;
/// Highest accepted rating
pub const MAX_RATING: i32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EditorState {
    #[default]
    Closed,
    Open {
        message_id: String,
        draft_rating: Option<i32>,
        draft_comment: String,
    },
}

/// Transient rating/comment draft for one assistant message
#[derive(Debug, Clone, Default)]
pub struct FeedbackEditor {
    state: EditorState,
}

impl FeedbackEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, EditorState::Open { .. })
    }

    /// Id of the message whose editor is open
    pub fn open_message_id(&self) -> Option<&str> {
        match &self.state {
            EditorState::Open { message_id, .. } => Some(message_id),
            EditorState::Closed => None,
        }
    }

    pub fn draft_rating(&self) -> Option<i32> {
        match &self.state {
            EditorState::Open { draft_rating, .. } => *draft_rating,
            EditorState::Closed => None,
        }
    }

    pub fn draft_comment(&self) -> Option<&str> {
        match &self.state {
            EditorState::Open { draft_comment, .. } => Some(draft_comment),
            EditorState::Closed => None,
        }
    }

    /// Open the editor for `message`, replacing any other open editor.
    /// The draft starts from the message's existing feedback.
    pub fn open(&mut self, message: &Message) -> Result<()> {
        if !message.accepts_feedback() {
            return Err(ChatError::FeedbackNotAllowed(message.id.clone()));
        }

        if let Some(previous) = self.open_message_id() {
            if previous != message.id {
                tracing::debug!(closed = previous, opened = %message.id, "switching feedback editor");
            }
        }

        let (draft_rating, draft_comment) = match &message.feedback {
            Some(existing) => (existing.rating.map(i32::from), existing.comment.clone()),
            None => (None, String::new()),
        };
        self.state = EditorState::Open {
            message_id: message.id.clone(),
            draft_rating,
            draft_comment,
        };
        Ok(())
    }

    /// Close if `message` is the one being edited, otherwise open it
    pub fn toggle(&mut self, message: &Message) -> Result<()> {
        if self.open_message_id() == Some(message.id.as_str()) {
            self.cancel();
            return Ok(());
        }
        self.open(message)
    }

    /// Draft only; range is checked at submit. Ignored while closed.
    pub fn set_rating(&mut self, value: i32) {
        if let EditorState::Open { draft_rating, .. } = &mut self.state {
            *draft_rating = Some(value);
        }
    }

    /// Draft only. Ignored while closed.
    pub fn set_comment(&mut self, text: impl Into<String>) {
        if let EditorState::Open { draft_comment, .. } = &mut self.state {
            *draft_comment = text.into();
        }
    }

    pub fn cancel(&mut self) {
        self.state = EditorState::Closed;
    }

    /// Validate the draft for `message_id` and close the editor.
    ///
    /// On `InvalidRating` the editor stays open with the draft intact.
    pub fn submit(&mut self, message_id: &str) -> Result<Feedback> {
        let EditorState::Open {
            message_id: open_id,
            draft_rating,
            draft_comment,
        } = &self.state
        else {
            return Err(ChatError::EditorNotOpen(message_id.to_string()));
        };
        if open_id != message_id {
            return Err(ChatError::EditorNotOpen(message_id.to_string()));
        }

        let rating = validate_rating(*draft_rating)?;
        let feedback = Feedback {
            rating: Some(rating),
            comment: draft_comment.clone(),
        };
        self.state = EditorState::Closed;
        Ok(feedback)
    }
}

/// A missing draft rating reports as 0
fn validate_rating(draft: Option<i32>) -> Result<u8> {
    let value = draft.unwrap_or(0);
    if !(MIN_RATING..=MAX_RATING).contains(&value) {
        return Err(ChatError::InvalidRating(value));
    }
    u8::try_from(value).map_err(|_| ChatError::InvalidRating(value))
}
