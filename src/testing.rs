//! Scripted service double for unit tests
//!
//! Replies and failures are queued up front; every call is recorded so tests
//! can assert on exactly what reached the "network".

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::api::{ConversationService, SharedService};
use crate::error::{ChatError, Result};
use crate::models::{
    ChatReply, ChatRequest, Conversation, ConversationUpdate, FeedbackRequest, Message, Role, User,
};
use crate::session::{Credential, SessionStore};

/// One recorded service call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CurrentUser,
    List,
    Get(String),
    Create(String),
    Update(String, ConversationUpdate),
    Delete(String),
    Chat(ChatRequest),
    Feedback(FeedbackRequest),
}

#[derive(Default)]
struct FakeState {
    user: Option<User>,
    conversations: Vec<Conversation>,
    chat_replies: VecDeque<Result<ChatReply>>,
    feedback_results: VecDeque<Result<()>>,
    update_results: VecDeque<Result<()>>,
    list_results: VecDeque<Result<()>>,
    calls: Vec<Call>,
}

#[derive(Default)]
pub struct FakeConversationService {
    state: Mutex<FakeState>,
}

impl FakeConversationService {
    pub fn new() -> Self {
        let service = Self::default();
        service.lock().user = Some(User {
            id: "u1".into(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            role: "user".into(),
        });
        service
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn with_conversations(self, conversations: Vec<Conversation>) -> Self {
        self.lock().conversations = conversations;
        self
    }

    pub fn with_user(self, user: User) -> Self {
        self.lock().user = Some(user);
        self
    }

    pub fn queue_reply(&self, text: &str) {
        self.lock().chat_replies.push_back(Ok(ChatReply {
            message: text.to_string(),
            conversation_id: None,
        }));
    }

    pub fn queue_chat_error(&self, error: ChatError) {
        self.lock().chat_replies.push_back(Err(error));
    }

    pub fn queue_feedback_error(&self, error: ChatError) {
        self.lock().feedback_results.push_back(Err(error));
    }

    pub fn queue_update_error(&self, error: ChatError) {
        self.lock().update_results.push_back(Err(error));
    }

    pub fn queue_list_error(&self, error: ChatError) {
        self.lock().list_results.push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn chat_requests(&self) -> Vec<ChatRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Chat(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn feedback_requests(&self) -> Vec<FeedbackRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Feedback(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn updates(&self) -> Vec<(String, ConversationUpdate)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Update(id, update) => Some((id, update)),
                _ => None,
            })
            .collect()
    }

    pub fn stored(&self, id: &str) -> Option<Conversation> {
        self.lock().conversations.iter().find(|c| c.id == id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn record(&self, call: Call) {
        self.lock().calls.push(call);
    }
}

pub fn conversation(id: &str, title: &str, messages: Vec<Message>) -> Conversation {
    Conversation {
        id: id.to_string(),
        title: title.to_string(),
        messages,
        created_at: Some(Utc::now()),
        updated_at: Some(Utc::now()),
        user_id: Some("u1".to_string()),
    }
}

pub fn user_message(id: &str, content: &str) -> Message {
    Message::new(id, Role::User, content)
}

pub fn assistant_message(id: &str, content: &str) -> Message {
    Message::new(id, Role::Assistant, content)
}

/// Service handle and signed-in store over a fake
pub fn wiring(fake: &Arc<FakeConversationService>) -> (SharedService, SessionStore) {
    let service: SharedService = fake.clone();
    (service, SessionStore::with_token("test-token"))
}

#[async_trait]
impl ConversationService for FakeConversationService {
    async fn current_user(&self, _auth: &Credential) -> Result<User> {
        self.record(Call::CurrentUser);
        self.lock().user.clone().ok_or(ChatError::Unauthenticated)
    }

    async fn list_conversations(&self, _auth: &Credential) -> Result<Vec<Conversation>> {
        self.record(Call::List);
        let mut state = self.lock();
        if let Some(result) = state.list_results.pop_front() {
            result?;
        }
        Ok(state.conversations.clone())
    }

    async fn get_conversation(&self, _auth: &Credential, id: &str) -> Result<Conversation> {
        self.record(Call::Get(id.to_string()));
        self.stored(id)
            .ok_or_else(|| ChatError::NotFound("Conversation not found".into()))
    }

    async fn create_conversation(&self, _auth: &Credential, title: &str) -> Result<Conversation> {
        self.record(Call::Create(title.to_string()));
        let created = conversation(&uuid::Uuid::new_v4().to_string(), title, Vec::new());
        self.lock().conversations.insert(0, created.clone());
        Ok(created)
    }

    async fn update_conversation(
        &self,
        _auth: &Credential,
        id: &str,
        update: &ConversationUpdate,
    ) -> Result<Conversation> {
        self.record(Call::Update(id.to_string(), update.clone()));
        let mut state = self.lock();
        if let Some(result) = state.update_results.pop_front() {
            result?;
        }
        let stored = state
            .conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| ChatError::NotFound("Conversation not found".into()))?;
        if let Some(title) = &update.title {
            stored.title = title.clone();
        }
        if let Some(messages) = &update.messages {
            stored.messages = messages.clone();
        }
        stored.updated_at = Some(Utc::now());
        Ok(stored.clone())
    }

    async fn delete_conversation(&self, _auth: &Credential, id: &str) -> Result<()> {
        self.record(Call::Delete(id.to_string()));
        let mut state = self.lock();
        let before = state.conversations.len();
        state.conversations.retain(|c| c.id != id);
        if state.conversations.len() == before {
            return Err(ChatError::NotFound("Conversation not found".into()));
        }
        Ok(())
    }

    async fn send_chat(&self, _auth: &Credential, request: &ChatRequest) -> Result<ChatReply> {
        self.record(Call::Chat(request.clone()));
        let mut state = self.lock();
        let queued = state.chat_replies.pop_front().unwrap_or_else(|| {
            Ok(ChatReply {
                message: format!("You said: {}", request.message),
                conversation_id: None,
            })
        });
        let mut reply = queued?;

        // like the real service, an id-less send allocates a conversation
        let conversation_id = match &request.conversation_id {
            Some(id) => id.clone(),
            None => {
                let created = conversation(&uuid::Uuid::new_v4().to_string(), "New Conversation", Vec::new());
                let id = created.id.clone();
                state.conversations.insert(0, created);
                id
            }
        };
        reply.conversation_id.get_or_insert(conversation_id);
        Ok(reply)
    }

    async fn submit_feedback(&self, _auth: &Credential, request: &FeedbackRequest) -> Result<()> {
        self.record(Call::Feedback(request.clone()));
        self.lock().feedback_results.pop_front().unwrap_or(Ok(()))
    }
}
