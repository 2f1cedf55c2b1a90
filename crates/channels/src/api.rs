use {
    async_trait::async_trait,
    beenbag_common::{ChannelId, MessageId, OutboundMessage, UserId},
};

use crate::Result;

/// Raw calls against the chat platform's REST API.
///
/// Implementations classify failures into [`crate::ApiError`] variants and
/// never retry on their own; retrying is the gate's job. Callers should go
/// through [`crate::Messenger`] rather than hold this trait directly.
#[async_trait]
pub trait MessagingApi: Send + Sync {
    async fn create_message(
        &self,
        channel: ChannelId,
        message: &OutboundMessage,
    ) -> Result<MessageId>;

    async fn edit_message(
        &self,
        channel: ChannelId,
        message_id: MessageId,
        message: &OutboundMessage,
    ) -> Result<()>;

    async fn delete_message(&self, channel: ChannelId, message_id: MessageId) -> Result<()>;

    /// Resolve (creating if needed) the direct-message channel for a user.
    /// Direct sends are this plus [`Self::create_message`], composed by the
    /// outbox so the channel can be cached.
    async fn open_direct_channel(&self, recipient: UserId) -> Result<ChannelId>;
}
