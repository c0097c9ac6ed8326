use crate::api::{ConversationService, SharedService};
use crate::error::Result;
use crate::models::{Conversation, ConversationUpdate, DEFAULT_CONVERSATION_TITLE, Message};
use crate::session::SessionStore;

/// The signed-in user's conversations and which one is active
pub struct ConversationRegistry {
    conversations: Vec<Conversation>,
    active_id: Option<String>,
    service: SharedService,
    store: SessionStore,
}

impl ConversationRegistry {
    pub fn new(service: SharedService, store: SessionStore) -> Self {
        Self {
            conversations: Vec::new(),
            active_id: None,
            service,
            store,
        }
    }

    /// Fetch the full list from the service, replacing the local copy
    pub async fn list(&mut self) -> Result<&[Conversation]> {
        let auth = self.store.credential()?;
        let conversations = self.service.list_conversations(&auth).await?;
        tracing::debug!(count = conversations.len(), "conversations loaded");
        self.conversations = conversations;
        Ok(&self.conversations)
    }

    /// Re-fetch after persistence so previews and ordering follow the service.
    /// The active id is left alone even if it no longer resolves.
    pub async fn refresh(&mut self) -> Result<&[Conversation]> {
        self.list().await
    }

    /// Allocate an empty conversation, prepend it and make it active
    pub async fn create(&mut self, title: Option<&str>) -> Result<&Conversation> {
        let auth = self.store.credential()?;
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_CONVERSATION_TITLE);
        let created = self.service.create_conversation(&auth, title).await?;
        tracing::debug!(conversation_id = %created.id, "conversation created");

        self.active_id = Some(created.id.clone());
        self.conversations.insert(0, created);
        Ok(&self.conversations[0])
    }

    /// Write a session's messages back to the service (`PUT /conversations/{id}`)
    pub async fn persist_messages(&self, id: &str, messages: &[Message]) -> Result<Conversation> {
        let auth = self.store.credential()?;
        let update = ConversationUpdate {
            title: None,
            messages: Some(messages.to_vec()),
        };
        self.service.update_conversation(&auth, id, &update).await
    }

    /// Fetch one conversation fresh from the service and update the local
    /// copy; one not yet listed is prepended
    pub async fn fetch(&mut self, id: &str) -> Result<&Conversation> {
        let auth = self.store.credential()?;
        let fresh = self.service.get_conversation(&auth, id).await?;

        let index = match self.conversations.iter().position(|c| c.id == id) {
            Some(index) => {
                self.conversations[index] = fresh;
                index
            }
            None => {
                self.conversations.insert(0, fresh);
                0
            }
        };
        Ok(&self.conversations[index])
    }

    /// Delete remotely, then drop it locally. Deleting the active
    /// conversation leaves none active.
    pub async fn delete(&mut self, id: &str) -> Result<()> {
        let auth = self.store.credential()?;
        self.service.delete_conversation(&auth, id).await?;
        self.remove(id);
        Ok(())
    }

    /// Local removal only
    pub fn remove(&mut self, id: &str) -> Option<Conversation> {
        let index = self.conversations.iter().position(|c| c.id == id)?;
        if self.active_id.as_deref() == Some(id) {
            self.active_id = None;
        }
        Some(self.conversations.remove(index))
    }

    /// Select a conversation. Unknown ids are ignored with a warning.
    pub fn set_active(&mut self, id: &str) -> bool {
        if self.get(id).is_none() {
            tracing::warn!(conversation_id = id, "ignoring selection of unknown conversation");
            return false;
        }
        self.active_id = Some(id.to_string());
        true
    }

    pub fn clear_active(&mut self) {
        self.active_id = None;
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    /// The active conversation, or `None` when nothing is selected or the
    /// selected id has disappeared from the list
    pub fn active(&self) -> Option<&Conversation> {
        let id = self.active_id.as_deref()?;
        self.get(id)
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// Drop everything; used on logout
    pub fn reset(&mut self) {
        self.conversations.clear();
        self.active_id = None;
    }
}
