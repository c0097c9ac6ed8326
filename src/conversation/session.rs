//! Live message list for the active conversation
//!
//! A send runs in three phases so the optimistic append is visible before the
//! network round-trip resolves:
//!
//! 1. [`ConversationSession::begin_send`] validates, appends the user message,
//!    clears the input buffer and raises the sending flag.
//! 2. [`PendingExchange::dispatch`] performs the request without borrowing the
//!    session.
//! 3. [`ConversationSession::finish_send`] applies the reply, or surfaces the
//!    failure. Replies issued before the last [`ConversationSession::initialize`]
//!    are dropped.
//!
//! [`ConversationSession::send`] strings the three together.

use chrono::Utc;

use crate::api::{ConversationService, SharedService};
use crate::conversation::feedback::FeedbackEditor;
use crate::error::{ChatError, Result};
use crate::models::{ChatReply, ChatRequest, Conversation, FeedbackRequest, Message, Role};
use crate::session::SessionStore;

/// Persistence hook, called with the full list after each completed exchange
pub type ExchangeCallback = Box<dyn FnMut(&[Message]) + Send>;

/// Result of a send attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// Empty text, or another send was in flight; nothing changed
    Skipped,
    /// The reply was appended
    Completed {
        conversation_id: Option<String>,
        messages: Vec<Message>,
    },
    /// The reply belonged to a conversation that is no longer loaded
    Discarded,
}

/// An exchange whose user message has been appended but whose reply has not arrived
#[derive(Clone)]
pub struct PendingExchange {
    generation: u64,
    user_message_id: String,
    request: ChatRequest,
    service: SharedService,
    store: SessionStore,
}

impl PendingExchange {
    pub fn request(&self) -> &ChatRequest {
        &self.request
    }

    pub fn user_message_id(&self) -> &str {
        &self.user_message_id
    }

    /// Issue `POST /chat`. Fails locally with `Unauthenticated` when signed out.
    pub async fn dispatch(&self) -> Result<ChatReply> {
        let auth = self.store.credential()?;
        self.service.send_chat(&auth, &self.request).await
    }
}

/// Feedback already written locally, waiting to be sent to the service
#[derive(Clone)]
pub struct FeedbackSubmission {
    request: FeedbackRequest,
    service: SharedService,
    store: SessionStore,
}

impl FeedbackSubmission {
    pub fn request(&self) -> &FeedbackRequest {
        &self.request
    }

    /// Send the feedback. Failures are logged and reported as `false`;
    /// the local copy is never rolled back.
    pub async fn deliver(self) -> bool {
        let result = match self.store.credential() {
            Ok(auth) => self.service.submit_feedback(&auth, &self.request).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => {
                tracing::debug!(message_id = %self.request.message_id, "feedback stored");
                true
            }
            Err(err) => {
                tracing::warn!(
                    message_id = %self.request.message_id,
                    conversation_id = %self.request.conversation_id,
                    error = %err,
                    "feedback submission failed; keeping local copy"
                );
                false
            }
        }
    }
}

pub struct ConversationSession {
    conversation_id: Option<String>,
    messages: Vec<Message>,
    input: String,
    sending: bool,
    generation: u64,
    next_seq: u64,
    editor: FeedbackEditor,
    last_error: Option<ChatError>,
    on_exchange_complete: Option<ExchangeCallback>,
    service: SharedService,
    store: SessionStore,
}

impl ConversationSession {
    pub fn new(service: SharedService, store: SessionStore) -> Self {
        Self {
            conversation_id: None,
            messages: Vec::new(),
            input: String::new(),
            sending: false,
            generation: 0,
            next_seq: 0,
            editor: FeedbackEditor::new(),
            last_error: None,
            on_exchange_complete: None,
            service,
            store,
        }
    }

    /// Session loaded with a conversation's current messages
    pub fn for_conversation(
        service: SharedService,
        store: SessionStore,
        conversation: &Conversation,
    ) -> Self {
        let mut session = Self::new(service, store);
        session.initialize(Some(conversation.id.clone()), conversation.messages.clone());
        session
    }

    pub fn on_exchange_complete(&mut self, callback: impl FnMut(&[Message]) + Send + 'static) {
        self.on_exchange_complete = Some(Box::new(callback));
    }

    /// Replace the message list wholesale. Editor state and any in-flight
    /// exchange from the previous conversation are abandoned.
    pub fn initialize(&mut self, conversation_id: Option<String>, messages: Vec<Message>) {
        self.generation += 1;
        self.conversation_id = conversation_id;
        self.messages = messages;
        self.sending = false;
        self.editor.cancel();
        self.last_error = None;
        tracing::debug!(
            conversation_id = ?self.conversation_id,
            generation = self.generation,
            messages = self.messages.len(),
            "session initialized"
        );
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Failure from the most recent exchange, for display
    pub fn last_error(&self) -> Option<&ChatError> {
        self.last_error.as_ref()
    }

    pub fn editor(&self) -> &FeedbackEditor {
        &self.editor
    }

    /// Optimistically append the user message and prepare the request.
    ///
    /// Returns `None` for blank text or while another send is in flight;
    /// the second send is dropped, not queued.
    pub fn begin_send(&mut self, text: &str) -> Option<PendingExchange> {
        if text.trim().is_empty() {
            return None;
        }
        if self.sending {
            tracing::debug!("send ignored; exchange already in flight");
            return None;
        }

        let user_message_id = self.next_message_id(Role::User);
        self.messages
            .push(Message::new(user_message_id.clone(), Role::User, text));
        self.input.clear();
        self.sending = true;
        self.last_error = None;

        Some(PendingExchange {
            generation: self.generation,
            user_message_id,
            request: ChatRequest {
                message: text.to_string(),
                conversation_id: self.conversation_id.clone(),
            },
            service: self.service.clone(),
            store: self.store.clone(),
        })
    }

    /// Apply the outcome of a dispatched exchange.
    ///
    /// On failure the optimistic user message stays and the error is returned.
    /// Either way the sending flag drops so another send can start.
    pub fn finish_send(
        &mut self,
        pending: PendingExchange,
        result: Result<ChatReply>,
    ) -> Result<ExchangeOutcome> {
        if pending.generation != self.generation {
            tracing::warn!(
                issued = pending.generation,
                current = self.generation,
                "dropping reply for an abandoned conversation"
            );
            return Ok(ExchangeOutcome::Discarded);
        }
        self.sending = false;

        let reply = match result {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!(error = %err, "exchange failed");
                self.last_error = Some(err.clone());
                return Err(err);
            }
        };

        if self.conversation_id.is_none() {
            if let Some(id) = reply.conversation_id {
                tracing::debug!(conversation_id = %id, "adopting conversation id from service");
                self.conversation_id = Some(id);
            }
        }

        let assistant_id = self.next_message_id(Role::Assistant);
        self.messages
            .push(Message::new(assistant_id, Role::Assistant, reply.message));

        if let Some(callback) = self.on_exchange_complete.as_mut() {
            callback(&self.messages);
        }

        Ok(ExchangeOutcome::Completed {
            conversation_id: self.conversation_id.clone(),
            messages: self.messages.clone(),
        })
    }

    /// Full exchange: optimistic append, round-trip, reply
    pub async fn send(&mut self, text: &str) -> Result<ExchangeOutcome> {
        let Some(pending) = self.begin_send(text) else {
            return Ok(ExchangeOutcome::Skipped);
        };
        let result = pending.dispatch().await;
        self.finish_send(pending, result)
    }

    /// Send whatever is in the input buffer
    pub async fn send_input(&mut self) -> Result<ExchangeOutcome> {
        let text = self.input.clone();
        self.send(&text).await
    }

    pub fn open_feedback(&mut self, message_id: &str) -> Result<()> {
        let message = find_message(&self.messages, message_id)?;
        self.editor.open(message)
    }

    pub fn toggle_feedback(&mut self, message_id: &str) -> Result<()> {
        let message = find_message(&self.messages, message_id)?;
        self.editor.toggle(message)
    }

    pub fn set_rating(&mut self, value: i32) {
        self.editor.set_rating(value);
    }

    pub fn set_comment(&mut self, text: impl Into<String>) {
        self.editor.set_comment(text);
    }

    pub fn cancel_feedback(&mut self) {
        self.editor.cancel();
    }

    /// Validate the draft, write it onto the message and close the editor.
    ///
    /// Returns the remote submission to deliver, or `None` when the
    /// conversation has no id yet and the feedback stays local.
    pub fn begin_feedback(&mut self, message_id: &str) -> Result<Option<FeedbackSubmission>> {
        let index = self
            .messages
            .iter()
            .position(|m| m.id == message_id)
            .ok_or_else(|| ChatError::NotFound(message_id.to_string()))?;
        let feedback = self.editor.submit(message_id)?;
        self.messages[index].feedback = Some(feedback.clone());

        let Some(conversation_id) = self.conversation_id.clone() else {
            tracing::debug!(message_id, "conversation not persisted yet; feedback kept local");
            return Ok(None);
        };

        Ok(feedback.rating.map(|rating| FeedbackSubmission {
            request: FeedbackRequest {
                message_id: message_id.to_string(),
                conversation_id,
                rating,
                comment: feedback.comment,
            },
            service: self.service.clone(),
            store: self.store.clone(),
        }))
    }

    /// Submit the open editor's draft. Remote failures are logged, not returned.
    pub async fn submit_feedback(&mut self, message_id: &str) -> Result<()> {
        if let Some(submission) = self.begin_feedback(message_id)? {
            submission.deliver().await;
        }
        Ok(())
    }

    /// Microsecond timestamp plus a per-session counter plus the role tag.
    /// The counter keeps ids distinct when sends land within one clock tick.
    fn next_message_id(&mut self, role: Role) -> String {
        self.next_seq += 1;
        format!(
            "{}-{}-{}",
            Utc::now().timestamp_micros(),
            self.next_seq,
            role.tag()
        )
    }
}

fn find_message<'a>(messages: &'a [Message], message_id: &str) -> Result<&'a Message> {
    messages
        .iter()
        .find(|m| m.id == message_id)
        .ok_or_else(|| ChatError::NotFound(message_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Feedback;
    use crate::testing::{assistant_message, user_message, wiring, Call, FakeConversationService};
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    fn session_with(
        fake: &Arc<FakeConversationService>,
        id: Option<&str>,
        messages: Vec<Message>,
    ) -> ConversationSession {
        let (service, store) = wiring(fake);
        let mut session = ConversationSession::new(service, store);
        session.initialize(id.map(str::to_string), messages);
        session
    }

    #[test]
    fn begin_send_appends_before_the_request_resolves() {
        let fake = FakeConversationService::new().shared();
        let mut session = session_with(&fake, Some("c1"), vec![user_message("1", "hi")]);
        session.set_input("how are you");

        let pending = session.begin_send("how are you").unwrap();

        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[1].role, Role::User);
        assert_eq!(session.messages()[1].content, "how are you");
        assert_eq!(session.messages()[1].id, pending.user_message_id());
        assert_eq!(session.input(), "");
        assert!(session.is_sending());
        assert_eq!(pending.request().conversation_id.as_deref(), Some("c1"));
        assert!(fake.calls().is_empty());
    }

    #[test]
    fn blank_text_is_not_sent() {
        let fake = FakeConversationService::new().shared();
        let mut session = session_with(&fake, Some("c1"), vec![]);
        assert!(session.begin_send("").is_none());
        assert!(session.begin_send("  \n\t").is_none());
        assert!(session.messages().is_empty());
        assert!(!session.is_sending());
    }

    #[tokio::test]
    async fn second_send_while_in_flight_is_dropped() {
        let fake = FakeConversationService::new().shared();
        let mut session = session_with(&fake, Some("c1"), vec![]);

        let first = session.begin_send("one").unwrap();
        assert!(session.begin_send("two").is_none());
        assert_eq!(session.send("three").await, Ok(ExchangeOutcome::Skipped));
        assert_eq!(session.messages().len(), 1);
        assert!(fake.chat_requests().is_empty());

        let result = first.dispatch().await;
        session.finish_send(first, result).unwrap();
        assert_eq!(fake.chat_requests().len(), 1);
        assert!(!session.is_sending());
    }

    #[tokio::test]
    async fn successful_exchange_appends_reply_and_fires_callback_once() {
        let fake = FakeConversationService::new().shared();
        fake.queue_reply("good");
        let mut session = session_with(&fake, Some("c1"), vec![user_message("1", "hi")]);

        let seen: Arc<Mutex<Vec<Vec<Message>>>> = Arc::default();
        let sink = seen.clone();
        session.on_exchange_complete(move |messages| sink.lock().unwrap().push(messages.to_vec()));

        let outcome = session.send("how are you").await.unwrap();

        let contents: Vec<(&str, Role)> = session
            .messages()
            .iter()
            .map(|m| (m.content.as_str(), m.role))
            .collect();
        assert_eq!(
            contents,
            vec![
                ("hi", Role::User),
                ("how are you", Role::User),
                ("good", Role::Assistant)
            ]
        );

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], session.messages());
        assert_eq!(
            outcome,
            ExchangeOutcome::Completed {
                conversation_id: Some("c1".into()),
                messages: session.messages().to_vec(),
            }
        );
        assert_eq!(
            fake.chat_requests(),
            vec![ChatRequest {
                message: "how are you".into(),
                conversation_id: Some("c1".into())
            }]
        );
    }

    #[tokio::test]
    async fn failed_exchange_keeps_user_message_and_unblocks() {
        let fake = FakeConversationService::new().shared();
        fake.queue_chat_error(ChatError::remote("boom"));
        let mut session = session_with(&fake, Some("c1"), vec![]);
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        session.on_exchange_complete(move |_| *counter.lock().unwrap() += 1);

        let err = session.send("hello").await.unwrap_err();

        assert_eq!(err, ChatError::remote("boom"));
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].role, Role::User);
        assert!(!session.is_sending());
        assert_eq!(session.last_error(), Some(&err));
        assert_eq!(*calls.lock().unwrap(), 0);

        // the next send goes through and clears the stale error
        session.send("again").await.unwrap();
        assert!(session.last_error().is_none());
        assert_eq!(session.messages().len(), 3);
    }

    #[tokio::test]
    async fn signed_out_send_fails_without_a_request() {
        let fake = FakeConversationService::new().shared();
        let (service, store) = wiring(&fake);
        let mut session = ConversationSession::new(service, store.clone());
        store.sign_out();

        let err = session.send("hello").await.unwrap_err();
        assert_eq!(err, ChatError::Unauthenticated);
        assert_eq!(session.messages().len(), 1);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn reply_after_switch_is_discarded() {
        let fake = FakeConversationService::new().shared();
        let mut session = session_with(&fake, Some("c1"), vec![]);

        let pending = session.begin_send("for c1").unwrap();
        session.initialize(Some("c2".into()), vec![user_message("x", "other")]);
        assert!(!session.is_sending());

        let result = pending.dispatch().await;
        let outcome = session.finish_send(pending, result).unwrap();

        assert_eq!(outcome, ExchangeOutcome::Discarded);
        assert_eq!(session.conversation_id(), Some("c2"));
        assert_eq!(session.messages(), &[user_message("x", "other")]);
    }

    #[tokio::test]
    async fn id_less_conversation_adopts_service_id() {
        let fake = FakeConversationService::new().shared();
        let mut session = session_with(&fake, None, vec![]);

        let outcome = session.send("first").await.unwrap();

        let adopted = session.conversation_id().map(str::to_string);
        assert!(adopted.is_some());
        assert_eq!(fake.chat_requests()[0].conversation_id, None);
        match outcome {
            ExchangeOutcome::Completed { conversation_id, .. } => assert_eq!(conversation_id, adopted),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn message_ids_stay_unique_under_rapid_sends() {
        let fake = FakeConversationService::new().shared();
        let mut session = session_with(&fake, Some("c1"), vec![]);
        for i in 0..50 {
            session.send(&format!("msg {}", i)).await.unwrap();
        }
        let ids: HashSet<&str> = session.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids.len(), 100);
        assert!(session.messages()[0].id.ends_with("-user"));
        assert!(session.messages()[1].id.ends_with("-assistant"));
    }

    #[tokio::test]
    async fn send_input_uses_the_buffer() {
        let fake = FakeConversationService::new().shared();
        let mut session = session_with(&fake, Some("c1"), vec![]);
        session.set_input("typed");
        session.send_input().await.unwrap();
        assert_eq!(session.messages()[0].content, "typed");
        assert_eq!(session.input(), "");
    }

    #[tokio::test]
    async fn invalid_rating_leaves_message_untouched() {
        let fake = FakeConversationService::new().shared();
        let mut session = session_with(&fake, Some("c1"), vec![assistant_message("m2", "answer")]);

        session.open_feedback("m2").unwrap();
        session.set_rating(12);
        let err = session.submit_feedback("m2").await.unwrap_err();

        assert_eq!(err, ChatError::InvalidRating(12));
        assert_eq!(session.message("m2").unwrap().feedback, None);
        assert_eq!(session.editor().open_message_id(), Some("m2"));
        assert!(fake.feedback_requests().is_empty());
    }

    #[tokio::test]
    async fn valid_feedback_is_written_and_submitted() {
        let fake = FakeConversationService::new().shared();
        let mut session = session_with(&fake, Some("c1"), vec![assistant_message("m2", "answer")]);

        session.open_feedback("m2").unwrap();
        session.set_rating(7);
        session.set_comment("solid");
        session.submit_feedback("m2").await.unwrap();

        assert_eq!(
            session.message("m2").unwrap().feedback,
            Some(Feedback {
                rating: Some(7),
                comment: "solid".into()
            })
        );
        assert!(!session.editor().is_open());
        assert_eq!(
            fake.feedback_requests(),
            vec![FeedbackRequest {
                message_id: "m2".into(),
                conversation_id: "c1".into(),
                rating: 7,
                comment: "solid".into(),
            }]
        );
    }

    #[tokio::test]
    async fn remote_feedback_failure_keeps_local_copy() {
        let fake = FakeConversationService::new().shared();
        fake.queue_feedback_error(ChatError::remote("down"));
        let mut session = session_with(&fake, Some("c1"), vec![assistant_message("m2", "answer")]);

        session.open_feedback("m2").unwrap();
        session.set_rating(7);
        assert_eq!(session.submit_feedback("m2").await, Ok(()));

        assert_eq!(session.message("m2").unwrap().feedback.as_ref().unwrap().rating, Some(7));
        assert!(!session.editor().is_open());
    }

    #[test]
    fn feedback_without_conversation_id_stays_local() {
        let fake = FakeConversationService::new().shared();
        let mut session = session_with(&fake, None, vec![assistant_message("m2", "answer")]);

        session.open_feedback("m2").unwrap();
        session.set_rating(9);
        let submission = session.begin_feedback("m2").unwrap();

        assert!(submission.is_none());
        assert_eq!(session.message("m2").unwrap().feedback.as_ref().unwrap().rating, Some(9));
    }

    #[test]
    fn opening_b_closes_a_without_touching_it() {
        let fake = FakeConversationService::new().shared();
        let mut a = assistant_message("a", "first");
        a.feedback = Some(Feedback {
            rating: Some(2),
            comment: "old".into(),
        });
        let mut session = session_with(&fake, Some("c1"), vec![a.clone(), assistant_message("b", "second")]);

        session.open_feedback("a").unwrap();
        session.set_rating(10);
        session.open_feedback("b").unwrap();

        assert_eq!(session.editor().open_message_id(), Some("b"));
        assert_eq!(session.message("a"), Some(&a));
    }

    #[test]
    fn cancel_discards_draft() {
        let fake = FakeConversationService::new().shared();
        let mut session = session_with(&fake, Some("c1"), vec![assistant_message("m2", "answer")]);
        session.open_feedback("m2").unwrap();
        session.set_rating(5);
        session.cancel_feedback();

        assert!(!session.editor().is_open());
        assert_eq!(session.message("m2").unwrap().feedback, None);
        assert_eq!(session.begin_feedback("m2").err(), Some(ChatError::EditorNotOpen("m2".into())));
    }

    #[test]
    fn unknown_message_is_not_found() {
        let fake = FakeConversationService::new().shared();
        let mut session = session_with(&fake, Some("c1"), vec![]);
        assert_eq!(session.open_feedback("nope"), Err(ChatError::NotFound("nope".into())));
    }

    #[test]
    fn initialize_discards_editor_state() {
        let fake = FakeConversationService::new().shared();
        let mut session = session_with(&fake, Some("c1"), vec![assistant_message("m2", "answer")]);
        session.open_feedback("m2").unwrap();

        session.initialize(Some("c2".into()), vec![]);
        assert!(!session.editor().is_open());
        assert_eq!(session.generation(), 2);
    }

    #[tokio::test]
    async fn feedback_and_send_can_overlap() {
        let fake = FakeConversationService::new().shared();
        fake.queue_reply("B");
        let mut session = session_with(&fake, Some("c1"), vec![assistant_message("a", "A")]);

        session.open_feedback("a").unwrap();
        session.set_rating(8);
        let submission = session.begin_feedback("a").unwrap().unwrap();
        let pending = session.begin_send("next").unwrap();

        let (delivered, result) = tokio::join!(submission.deliver(), pending.dispatch());
        assert!(delivered);
        session.finish_send(pending, result).unwrap();

        assert_eq!(session.messages().len(), 3);
        assert_eq!(session.message("a").unwrap().feedback.as_ref().unwrap().rating, Some(8));
        assert!(fake.calls().iter().any(|c| matches!(c, Call::Feedback(_))));
    }
}
