use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use shared::{
    domain::{Conversation, ConversationId, ListingId, Message, UserId},
    protocol::{
        ConversationEnvelope, ConversationListResponse, CreateConversationRequest,
        MessagePageResponse,
    },
};

/// The REST side the realtime core depends on: conversation list, get-or-create, history.
#[async_trait]
pub trait ConversationApi: Send + Sync {
    async fn list_conversations(&self, token: &str) -> Result<Vec<Conversation>>;

    async fn get_or_create_conversation(
        &self,
        token: &str,
        user_id: &UserId,
        listing_id: Option<&ListingId>,
    ) -> Result<Conversation>;

    /// Pages count from 1, newest page first.
    async fn list_messages(
        &self,
        token: &str,
        conversation_id: &ConversationId,
        page: u32,
    ) -> Result<Vec<Message>>;
}

pub struct MissingConversationApi;

#[async_trait]
impl ConversationApi for MissingConversationApi {
    async fn list_conversations(&self, _token: &str) -> Result<Vec<Conversation>> {
        Err(anyhow!("conversation api is unavailable"))
    }

    async fn get_or_create_conversation(
        &self,
        _token: &str,
        _user_id: &UserId,
        _listing_id: Option<&ListingId>,
    ) -> Result<Conversation> {
        Err(anyhow!("conversation api is unavailable"))
    }

    async fn list_messages(
        &self,
        _token: &str,
        _conversation_id: &ConversationId,
        _page: u32,
    ) -> Result<Vec<Message>> {
        Err(anyhow!("conversation api is unavailable"))
    }
}

pub struct HttpConversationApi {
    http: Client,
    base_url: String,
}

impl HttpConversationApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ConversationApi for HttpConversationApi {
    async fn list_conversations(&self, token: &str) -> Result<Vec<Conversation>> {
        let response: ConversationListResponse = self
            .http
            .get(format!("{}/chat/conversations", self.base_url))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.conversations)
    }

    async fn get_or_create_conversation(
        &self,
        token: &str,
        user_id: &UserId,
        listing_id: Option<&ListingId>,
    ) -> Result<Conversation> {
        let response: ConversationEnvelope = self
            .http
            .post(format!("{}/chat/conversations", self.base_url))
            .bearer_auth(token)
            .json(&CreateConversationRequest {
                user_id: user_id.clone(),
                listing_id: listing_id.cloned(),
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.conversation)
    }

    async fn list_messages(
        &self,
        token: &str,
        conversation_id: &ConversationId,
        page: u32,
    ) -> Result<Vec<Message>> {
        let response: MessagePageResponse = self
            .http
            .get(format!(
                "{}/chat/conversations/{}/messages",
                self.base_url, conversation_id
            ))
            .query(&[("page", page)])
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.messages)
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
