//! Conversation and feedback synchronization with a remote chat service

pub mod api;
pub mod client;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod error;
pub mod models;
pub mod repl;
pub mod session;

#[cfg(test)]
mod testing;

pub use api::{ConversationService, HttpConversationService, SharedService};
pub use client::ChatClient;
pub use config::Config;
pub use conversation::{
    ConversationRegistry, ConversationSession, EditorState, ExchangeOutcome, FeedbackEditor,
};
pub use error::{ChatError, Result};
pub use models::{Conversation, Feedback, Message, Role, User};
pub use session::{Credential, SessionStore};
