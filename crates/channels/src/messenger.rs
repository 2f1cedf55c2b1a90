use std::sync::Arc;

use beenbag_common::{ChannelId, MessageId, OutboundMessage, UserId};

use crate::{MessagingApi, RateLimitedGate, Result};

/// Gate-wrapped access to a [`MessagingApi`].
///
/// Every outward call in the process should go through one of these so the
/// shared concurrency bound and throttle backoff apply to it.
#[derive(Clone)]
pub struct Messenger {
    api: Arc<dyn MessagingApi>,
    gate: Arc<RateLimitedGate>,
}

impl Messenger {
    pub fn new(api: Arc<dyn MessagingApi>, gate: Arc<RateLimitedGate>) -> Self {
        Self { api, gate }
    }

    #[must_use]
    pub fn gate(&self) -> &Arc<RateLimitedGate> {
        &self.gate
    }

    pub async fn create_message(
        &self,
        channel: ChannelId,
        message: &OutboundMessage,
    ) -> Result<MessageId> {
        self.gate
            .call("create_message", || {
                let api = Arc::clone(&self.api);
                let message = message.clone();
                async move { api.create_message(channel, &message).await }
            })
            .await
    }

    pub async fn edit_message(
        &self,
        channel: ChannelId,
        message_id: MessageId,
        message: &OutboundMessage,
    ) -> Result<()> {
        self.gate
            .call("edit_message", || {
                let api = Arc::clone(&self.api);
                let message = message.clone();
                async move { api.edit_message(channel, message_id, &message).await }
            })
            .await
    }

    pub async fn delete_message(&self, channel: ChannelId, message_id: MessageId) -> Result<()> {
        self.gate
            .call("delete_message", || {
                let api = Arc::clone(&self.api);
                async move { api.delete_message(channel, message_id).await }
            })
            .await
    }

    pub async fn open_direct_channel(&self, recipient: UserId) -> Result<ChannelId> {
        self.gate
            .call("open_direct_channel", || {
                let api = Arc::clone(&self.api);
                async move { api.open_direct_channel(recipient).await }
            })
            .await
    }
}
