use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::types::{Button, ChatId, InboundEvent, MessageHandle, PlatformResult, TextFormat, UserId};

pub mod telegram;

#[cfg(test)]
pub mod testing;

/// Capabilities the bot needs from a group-messaging platform
#[async_trait]
pub trait PlatformConnection: Send + Sync {
    /// Connect to the platform and start receiving events
    async fn connect(&self) -> Result<()>;

    /// Gracefully disconnect
    async fn disconnect(&self) -> Result<()>;

    /// Get the platform identifier (e.g., "telegram")
    fn platform_name(&self) -> &str;

    /// Check if the connection is healthy
    async fn is_connected(&self) -> bool;

    /// Get a receiver for inbound events
    fn get_event_receiver(&self) -> Option<broadcast::Receiver<InboundEvent>>;

    /// Send an image with a caption and an optional inline keyboard
    async fn send_photo(
        &self,
        chat_id: ChatId,
        image: &str,
        caption: &str,
        keyboard: &[Vec<Button>],
    ) -> PlatformResult<MessageHandle>;

    async fn send_text(&self, chat_id: ChatId, text: &str, format: TextFormat) -> PlatformResult<MessageHandle>;

    /// Send plain text with an inline keyboard below it
    async fn send_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: &[Vec<Button>],
    ) -> PlatformResult<MessageHandle>;

    async fn delete_message(&self, message: MessageHandle) -> PlatformResult<()>;

    /// Revoke the member's permission to send messages until `until`
    async fn restrict_member(&self, chat_id: ChatId, user_id: UserId, until: DateTime<Utc>) -> PlatformResult<()>;

    async fn ban_member(&self, chat_id: ChatId, user_id: UserId) -> PlatformResult<()>;

    /// Full display name of a chat member
    async fn member_name(&self, chat_id: ChatId, user_id: UserId) -> PlatformResult<String>;

    async fn answer_callback(&self, callback_id: &str) -> PlatformResult<()>;

    async fn edit_message_text(&self, message: MessageHandle, text: &str) -> PlatformResult<()>;
}
