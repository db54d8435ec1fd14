//! The REST operations bot logic depends on.
//!
//! Implemented by [`crate::http::DiscordHttpClient`] for the real API and by
//! an in-memory fake in tests, so cogs never name a concrete client.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HttpError;
use crate::types::*;

#[async_trait]
pub trait DiscordApi: Send + Sync {
    async fn create_message(
        &self,
        channel_id: &str,
        msg: &CreateMessage,
    ) -> Result<Message, HttpError>;

    async fn get_message(&self, channel_id: &str, message_id: &str) -> Result<Message, HttpError>;

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        edit: &EditMessage,
    ) -> Result<Message, HttpError>;

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), HttpError>;

    async fn get_channel(&self, channel_id: &str) -> Result<Channel, HttpError>;

    /// React to a message as the bot.
    async fn create_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), HttpError>;

    /// Remove one user's reaction.
    async fn delete_user_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
        user_id: &str,
    ) -> Result<(), HttpError>;

    /// Remove every reaction of a single emoji.
    async fn delete_all_reactions_for_emoji(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), HttpError>;

    async fn delete_all_reactions(&self, channel_id: &str, message_id: &str)
        -> Result<(), HttpError>;

    /// Download the bytes behind an attachment URL.
    async fn download(&self, url: &str) -> Result<Vec<u8>, HttpError>;
}

pub type SharedApi = Arc<dyn DiscordApi>;

/// Helpers that treat "already gone" as a normal outcome.
#[async_trait]
pub trait DiscordApiExt: DiscordApi {
    async fn send_text(&self, channel_id: &str, content: &str) -> Result<Message, HttpError> {
        self.create_message(channel_id, &CreateMessage::new().content(content))
            .await
    }

    /// Fetch a message, mapping 404 to `None`.
    async fn find_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<Option<Message>, HttpError> {
        match self.get_message(channel_id, message_id).await {
            Ok(msg) => Ok(Some(msg)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Delete a message, ignoring one that no longer exists.
    async fn delete_message_if_exists(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<(), HttpError> {
        match self.delete_message(channel_id, message_id).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }
}

impl<T: DiscordApi + ?Sized> DiscordApiExt for T {}
