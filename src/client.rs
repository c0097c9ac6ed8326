use std::sync::Arc;
use tokio::sync::mpsc;

use crate::api::{ConversationService, HttpConversationService, SharedService};
use crate::config::Config;
use crate::conversation::{ConversationRegistry, ConversationSession, ExchangeOutcome};
use crate::error::{ChatError, Result};
use crate::models::{Conversation, Message, User};
use crate::session::SessionStore;

/// Ties the session store, the registry and the active conversation session together
pub struct ChatClient {
    store: SessionStore,
    service: SharedService,
    registry: ConversationRegistry,
    session: Option<ConversationSession>,
    default_title: String,
    /// Message lists reported by the sessions' exchange callback
    exchanges_tx: mpsc::UnboundedSender<Vec<Message>>,
    exchanges: mpsc::UnboundedReceiver<Vec<Message>>,
}

impl ChatClient {
    pub fn new(service: SharedService, store: SessionStore) -> Self {
        let (exchanges_tx, exchanges) = mpsc::unbounded_channel();
        Self {
            registry: ConversationRegistry::new(service.clone(), store.clone()),
            store,
            service,
            session: None,
            default_title: crate::models::DEFAULT_CONVERSATION_TITLE.to_string(),
            exchanges_tx,
            exchanges,
        }
    }

    /// HTTP-backed client using the configured URL, timeout and token
    pub fn from_config(config: &Config) -> Result<Self> {
        let service: SharedService = Arc::new(HttpConversationService::from_config(config)?);
        let store = SessionStore::new();
        if let Some(token) = &config.token {
            store.sign_in(token.clone());
        }
        Ok(Self::new(service, store).with_default_title(config.default_title.clone()))
    }

    pub fn with_default_title(mut self, title: impl Into<String>) -> Self {
        self.default_title = title.into();
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn registry(&self) -> &ConversationRegistry {
        &self.registry
    }

    pub fn conversations(&self) -> &[Conversation] {
        self.registry.conversations()
    }

    pub fn session(&self) -> Option<&ConversationSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut ConversationSession> {
        self.session.as_mut()
    }

    /// Messages of the active session, empty when none is loaded
    pub fn messages(&self) -> &[Message] {
        self.session
            .as_ref()
            .map(ConversationSession::messages)
            .unwrap_or_default()
    }

    pub fn user(&self) -> Option<User> {
        self.store.user()
    }

    pub fn is_admin(&self) -> bool {
        self.store.is_admin()
    }

    /// Load the user and their conversations, activating the first one.
    ///
    /// A rejected credential signs the store out before the error is returned.
    pub async fn start(&mut self) -> Result<User> {
        let auth = self.store.credential()?;
        let user = match self.service.current_user(&auth).await {
            Ok(user) => user,
            Err(ChatError::Unauthenticated) => {
                self.store.sign_out();
                return Err(ChatError::Unauthenticated);
            }
            Err(err) => return Err(err),
        };
        tracing::info!(username = %user.username, admin = user.is_admin(), "signed in");
        self.store.set_user(user.clone());

        self.registry.list().await?;
        if self.registry.active().is_none() {
            let first = self.registry.conversations().first().map(|c| c.id.clone());
            if let Some(id) = first {
                self.select(&id);
            }
        }
        Ok(user)
    }

    /// Re-fetch the conversation list. A session whose conversation is no
    /// longer listed is dropped.
    pub async fn refresh(&mut self) -> Result<&[Conversation]> {
        self.registry.refresh().await?;
        self.sync_session();
        Ok(self.registry.conversations())
    }

    /// Make `id` active and load its messages. Unknown ids leave the current
    /// selection in place.
    pub fn select(&mut self, id: &str) -> bool {
        if !self.registry.set_active(id) {
            return false;
        }
        self.hydrate();
        true
    }

    /// Load `id` fresh from the service and make it active
    pub async fn open(&mut self, id: &str) -> Result<()> {
        self.registry.fetch(id).await?;
        self.select(id);
        Ok(())
    }

    /// Create an empty conversation and switch to it
    pub async fn new_conversation(&mut self, title: Option<&str>) -> Result<String> {
        let title = title.unwrap_or(&self.default_title).to_string();
        let id = self.registry.create(Some(title.as_str())).await?.id.clone();
        self.hydrate();
        Ok(id)
    }

    /// Send through the active session, or through a fresh id-less session
    /// when nothing is selected. Completed exchanges are persisted and the
    /// list refreshed; persistence failures are logged only.
    pub async fn send(&mut self, text: &str) -> Result<ExchangeOutcome> {
        let session = self.session.get_or_insert_with(|| {
            new_session(&self.service, &self.store, &self.exchanges_tx)
        });
        let outcome = session.send(text).await?;
        let conversation_id = session.conversation_id().map(str::to_string);

        while let Ok(messages) = self.exchanges.try_recv() {
            match &conversation_id {
                Some(id) => self.persist(id, &messages).await,
                None => tracing::debug!("exchange completed without a conversation id; not saved"),
            }
        }
        Ok(outcome)
    }

    pub fn open_feedback(&mut self, message_id: &str) -> Result<()> {
        self.active_session_mut()?.open_feedback(message_id)
    }

    pub fn set_rating(&mut self, value: i32) -> Result<()> {
        self.active_session_mut()?.set_rating(value);
        Ok(())
    }

    pub fn set_comment(&mut self, text: &str) -> Result<()> {
        self.active_session_mut()?.set_comment(text);
        Ok(())
    }

    pub fn cancel_feedback(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.cancel_feedback();
        }
    }

    pub async fn submit_feedback(&mut self, message_id: &str) -> Result<()> {
        self.active_session_mut()?.submit_feedback(message_id).await
    }

    /// Delete remotely; the session goes away if it was showing that conversation
    pub async fn delete_conversation(&mut self, id: &str) -> Result<()> {
        self.registry.delete(id).await?;
        if self
            .session
            .as_ref()
            .is_some_and(|s| s.conversation_id() == Some(id))
        {
            self.session = None;
        }
        Ok(())
    }

    /// Invalidate the credential and drop all conversation state
    pub fn logout(&mut self) {
        self.store.sign_out();
        self.registry.reset();
        self.session = None;
        tracing::info!("signed out");
    }

    fn active_session_mut(&mut self) -> Result<&mut ConversationSession> {
        self.session
            .as_mut()
            .ok_or_else(|| ChatError::NotFound("no conversation selected".into()))
    }

    /// Load the registry's active conversation into the session
    fn hydrate(&mut self) {
        let Some(conversation) = self.registry.active() else {
            self.session = None;
            return;
        };
        let id = conversation.id.clone();
        let messages = conversation.messages.clone();

        match self.session.as_mut() {
            Some(session) => session.initialize(Some(id), messages),
            None => {
                let mut session = new_session(&self.service, &self.store, &self.exchanges_tx);
                session.initialize(Some(id), messages);
                self.session = Some(session);
            }
        }
    }

    /// Line the registry up with the session after a refresh. A session whose
    /// conversation is no longer listed is dropped; id-less drafts are kept.
    fn sync_session(&mut self) {
        let Some(id) = self
            .session
            .as_ref()
            .and_then(|s| s.conversation_id())
            .map(str::to_string)
        else {
            return;
        };

        if self.registry.get(&id).is_none() {
            tracing::warn!(conversation_id = %id, "conversation disappeared; closing it");
            self.registry.clear_active();
            self.session = None;
        } else if self.registry.active_id() != Some(id.as_str()) {
            // an id-less send was just given a conversation by the service
            self.registry.set_active(&id);
        }
    }

    async fn persist(&mut self, id: &str, messages: &[Message]) {
        if let Err(err) = self.registry.persist_messages(id, messages).await {
            tracing::warn!(conversation_id = id, error = %err, "failed to save conversation");
            return;
        }
        if let Err(err) = self.registry.refresh().await {
            tracing::warn!(error = %err, "failed to refresh conversations");
            return;
        }
        self.sync_session();
    }
}

/// Session whose completed exchanges are queued for persistence
fn new_session(
    service: &SharedService,
    store: &SessionStore,
    exchanges: &mpsc::UnboundedSender<Vec<Message>>,
) -> ConversationSession {
    let mut session = ConversationSession::new(service.clone(), store.clone());
    let exchanges = exchanges.clone();
    session.on_exchange_complete(move |messages| {
        // the receiver lives as long as the client
        let _ = exchanges.send(messages.to_vec());
    });
    session
}
