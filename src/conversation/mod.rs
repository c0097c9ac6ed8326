//! Conversation synchronization core: registry, live session and feedback editor

pub mod feedback;
pub mod registry;
pub mod session;

pub use feedback::{EditorState, FeedbackEditor, MAX_RATING, MIN_RATING};
pub use registry::ConversationRegistry;
pub use session::{ConversationSession, ExchangeOutcome, FeedbackSubmission, PendingExchange};
