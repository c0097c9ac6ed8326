//! Binding to the remote conversation service
//!
//! [`ConversationService`] is the seam the registry and sessions talk through;
//! [`HttpConversationService`] implements it over authenticated HTTP.

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::models::{
    ChatReply, ChatRequest, Conversation, ConversationUpdate, ErrorBody, FeedbackRequest,
    NewConversation, User,
};
use crate::session::Credential;

/// Remote system of record for conversations, messages and feedback
#[async_trait]
pub trait ConversationService: Send + Sync {
    /// `GET /users/me`
    async fn current_user(&self, auth: &Credential) -> Result<User>;

    /// `GET /conversations`
    async fn list_conversations(&self, auth: &Credential) -> Result<Vec<Conversation>>;

    /// `GET /conversations/{id}`
    async fn get_conversation(&self, auth: &Credential, id: &str) -> Result<Conversation>;

    /// `POST /conversations` with an empty message list
    async fn create_conversation(&self, auth: &Credential, title: &str) -> Result<Conversation>;

    /// `PUT /conversations/{id}`
    async fn update_conversation(
        &self,
        auth: &Credential,
        id: &str,
        update: &ConversationUpdate,
    ) -> Result<Conversation>;

    /// `DELETE /conversations/{id}`
    async fn delete_conversation(&self, auth: &Credential, id: &str) -> Result<()>;

    /// `POST /chat`
    async fn send_chat(&self, auth: &Credential, request: &ChatRequest) -> Result<ChatReply>;

    /// `POST /feedback`
    async fn submit_feedback(&self, auth: &Credential, request: &FeedbackRequest) -> Result<()>;
}

#[async_trait]
impl<T: ConversationService + ?Sized> ConversationService for Arc<T> {
    async fn current_user(&self, auth: &Credential) -> Result<User> {
        (**self).current_user(auth).await
    }

    async fn list_conversations(&self, auth: &Credential) -> Result<Vec<Conversation>> {
        (**self).list_conversations(auth).await
    }

    async fn get_conversation(&self, auth: &Credential, id: &str) -> Result<Conversation> {
        (**self).get_conversation(auth, id).await
    }

    async fn create_conversation(&self, auth: &Credential, title: &str) -> Result<Conversation> {
        (**self).create_conversation(auth, title).await
    }

    async fn update_conversation(
        &self,
        auth: &Credential,
        id: &str,
        update: &ConversationUpdate,
    ) -> Result<Conversation> {
        (**self).update_conversation(auth, id, update).await
    }

    async fn delete_conversation(&self, auth: &Credential, id: &str) -> Result<()> {
        (**self).delete_conversation(auth, id).await
    }

    async fn send_chat(&self, auth: &Credential, request: &ChatRequest) -> Result<ChatReply> {
        (**self).send_chat(auth, request).await
    }

    async fn submit_feedback(&self, auth: &Credential, request: &FeedbackRequest) -> Result<()> {
        (**self).submit_feedback(auth, request).await
    }
}

/// Shared handle used by the registry and sessions
pub type SharedService = Arc<dyn ConversationService>;

/// HTTP client for the conversation service
#[derive(Clone)]
pub struct HttpConversationService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpConversationService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self { base_url, client })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.base_url(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder, auth: &Credential) -> RequestBuilder {
        builder.header("Authorization", auth.bearer())
    }

    async fn execute(&self, builder: RequestBuilder, what: &str) -> Result<Response> {
        tracing::debug!(request = what, "issuing request");
        let response = builder.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let detail = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.detail_text());
        tracing::debug!(request = what, status, "request rejected");
        Err(ChatError::from_status(status, detail))
    }

    async fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| ChatError::remote(format!("invalid {} response: {}", what, e)))
    }
}

#[async_trait]
impl ConversationService for HttpConversationService {
    async fn current_user(&self, auth: &Credential) -> Result<User> {
        let request = self.authorized(self.client.get(self.url("/users/me")), auth);
        let response = self.execute(request, "current_user").await?;
        Self::decode(response, "user").await
    }

    async fn list_conversations(&self, auth: &Credential) -> Result<Vec<Conversation>> {
        let request = self.authorized(self.client.get(self.url("/conversations")), auth);
        let response = self.execute(request, "list_conversations").await?;
        Self::decode(response, "conversation list").await
    }

    async fn get_conversation(&self, auth: &Credential, id: &str) -> Result<Conversation> {
        let url = self.url(&format!("/conversations/{}", id));
        let request = self.authorized(self.client.get(url), auth);
        let response = self.execute(request, "get_conversation").await?;
        Self::decode(response, "conversation").await
    }

    async fn create_conversation(&self, auth: &Credential, title: &str) -> Result<Conversation> {
        let body = NewConversation {
            title: title.to_string(),
            messages: Vec::new(),
        };
        let request = self
            .authorized(self.client.post(self.url("/conversations")), auth)
            .json(&body);
        let response = self.execute(request, "create_conversation").await?;
        Self::decode(response, "conversation").await
    }

    async fn update_conversation(
        &self,
        auth: &Credential,
        id: &str,
        update: &ConversationUpdate,
    ) -> Result<Conversation> {
        let url = self.url(&format!("/conversations/{}", id));
        let request = self.authorized(self.client.put(url), auth).json(update);
        let response = self.execute(request, "update_conversation").await?;
        Self::decode(response, "conversation").await
    }

    async fn delete_conversation(&self, auth: &Credential, id: &str) -> Result<()> {
        let url = self.url(&format!("/conversations/{}", id));
        let request = self.authorized(self.client.delete(url), auth);
        self.execute(request, "delete_conversation").await?;
        Ok(())
    }

    async fn send_chat(&self, auth: &Credential, request: &ChatRequest) -> Result<ChatReply> {
        let builder = self
            .authorized(self.client.post(self.url("/chat")), auth)
            .json(request);
        let response = self.execute(builder, "send_chat").await?;
        Self::decode(response, "chat").await
    }

    async fn submit_feedback(&self, auth: &Credential, request: &FeedbackRequest) -> Result<()> {
        let builder = self
            .authorized(self.client.post(self.url("/feedback")), auth)
            .json(request);
        // success body is empty
        self.execute(builder, "submit_feedback").await?;
        Ok(())
    }
}
