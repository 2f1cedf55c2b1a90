//! REST calls against Discord.

use std::sync::Arc;

use {
    async_trait::async_trait,
    beenbag_channels::{MessagingApi, Result},
    beenbag_common::{ChannelId, MessageId, OutboundMessage, UserId},
    serenity::{
        all::{CreateAttachment, CreateMessage, EditMessage},
        http::Http,
        model::id,
    },
    tracing::trace,
};

use crate::error::classify;

/// [`MessagingApi`] over serenity's HTTP client.
///
/// Serenity's own per-route ratelimiter stays on; a 429 that still gets
/// through surfaces as `Throttled` and is retried by the gate.
#[derive(Clone)]
pub struct DiscordApi {
    http: Arc<Http>,
}

impl DiscordApi {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    /// Client for a bot token, without a gateway connection.
    pub fn from_token(token: &str) -> Self {
        Self::new(Arc::new(Http::new(token)))
    }

    pub fn http(&self) -> &Arc<Http> {
        &self.http
    }
}

fn create_builder(message: &OutboundMessage) -> CreateMessage {
    let builder = CreateMessage::new().content(&message.content);
    match &message.attachment {
        Some(file) => builder.add_file(CreateAttachment::bytes(
            file.bytes.clone(),
            file.filename.clone(),
        )),
        None => builder,
    }
}

fn edit_builder(message: &OutboundMessage) -> EditMessage {
    let builder = EditMessage::new().content(&message.content);
    match &message.attachment {
        // Swap the previous frame's image for this one.
        Some(file) => builder.remove_all_attachments().new_attachment(CreateAttachment::bytes(
            file.bytes.clone(),
            file.filename.clone(),
        )),
        None => builder,
    }
}

#[async_trait]
impl MessagingApi for DiscordApi {
    async fn create_message(
        &self,
        channel: ChannelId,
        message: &OutboundMessage,
    ) -> Result<MessageId> {
        trace!(channel_id = %channel, "discord create_message");
        let sent = id::ChannelId::new(channel.get())
            .send_message(&*self.http, create_builder(message))
            .await
            .map_err(|e| classify("create message", e))?;
        Ok(MessageId::new(sent.id.get()))
    }

    async fn edit_message(
        &self,
        channel: ChannelId,
        message_id: MessageId,
        message: &OutboundMessage,
    ) -> Result<()> {
        trace!(channel_id = %channel, message_id = %message_id, "discord edit_message");
        id::ChannelId::new(channel.get())
            .edit_message(
                &*self.http,
                id::MessageId::new(message_id.get()),
                edit_builder(message),
            )
            .await
            .map_err(|e| classify("edit message", e))?;
        Ok(())
    }

    async fn delete_message(&self, channel: ChannelId, message_id: MessageId) -> Result<()> {
        trace!(channel_id = %channel, message_id = %message_id, "discord delete_message");
        id::ChannelId::new(channel.get())
            .delete_message(&*self.http, id::MessageId::new(message_id.get()))
            .await
            .map_err(|e| classify("delete message", e))
    }

    async fn open_direct_channel(&self, recipient: UserId) -> Result<ChannelId> {
        let dm = id::UserId::new(recipient.get())
            .create_dm_channel(&*self.http)
            .await
            .map_err(|e| classify("open direct channel", e))?;
        Ok(ChannelId::new(dm.id.get()))
    }
}
