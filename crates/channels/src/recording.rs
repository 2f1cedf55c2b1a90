//! In-memory [`MessagingApi`] that records every call.
//!
//! Used by tests across the workspace and by `beenbag run --dry-run`, where
//! nothing should reach the real platform.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use {
    async_trait::async_trait,
    beenbag_common::{ChannelId, MessageId, OutboundMessage, UserId},
    tokio::time::Instant,
    tracing::info,
};

use crate::{ApiError, MessagingApi, Result};

/// One successful call observed by [`RecordingApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Create {
        channel: ChannelId,
        message_id: MessageId,
        content: String,
    },
    Edit {
        channel: ChannelId,
        message_id: MessageId,
        content: String,
    },
    Delete {
        channel: ChannelId,
        message_id: MessageId,
    },
    OpenDirect {
        recipient: UserId,
        channel: ChannelId,
    },
}

#[derive(Default)]
struct State {
    calls: Vec<(Instant, RecordedCall)>,
    live: HashMap<MessageId, (ChannelId, String)>,
    direct: HashMap<UserId, ChannelId>,
    failures: VecDeque<ApiError>,
    attempts: usize,
}

pub struct RecordingApi {
    next_id: AtomicU64,
    state: Mutex<State>,
}

impl Default for RecordingApi {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingApi {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1_000),
            state: Mutex::new(State::default()),
        }
    }

    /// Make the next call (of any kind) fail with `error`. Queued failures
    /// are consumed in order.
    pub fn fail_next(&self, error: ApiError) {
        self.lock().failures.push_back(error);
    }

    /// Successful calls, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.iter().map(|(_, c)| c.clone()).collect()
    }

    /// Successful calls with the (tokio) instant they completed.
    pub fn timed_calls(&self) -> Vec<(Instant, RecordedCall)> {
        self.lock().calls.clone()
    }

    /// Every call attempt, including scripted failures.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    pub fn content_of(&self, message_id: MessageId) -> Option<String> {
        self.lock().live.get(&message_id).map(|(_, c)| c.clone())
    }

    pub fn is_live(&self, message_id: MessageId) -> bool {
        self.lock().live.contains_key(&message_id)
    }

    /// Content of every message created in `channel`, including deleted ones.
    pub fn created_in(&self, channel: ChannelId) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|(_, call)| match call {
                RecordedCall::Create {
                    channel: c,
                    content,
                    ..
                } if *c == channel => Some(content.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin(&self) -> Result<MutexGuard<'_, State>> {
        let mut state = self.lock();
        state.attempts += 1;
        match state.failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }

    fn allocate(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

#[async_trait]
impl MessagingApi for RecordingApi {
    async fn create_message(
        &self,
        channel: ChannelId,
        message: &OutboundMessage,
    ) -> Result<MessageId> {
        let mut state = self.begin()?;
        let message_id = MessageId::new(self.allocate());
        info!(
            channel_id = %channel,
            message_id = %message_id,
            content = %message.content,
            "recorded create"
        );
        state
            .live
            .insert(message_id, (channel, message.content.clone()));
        state.calls.push((Instant::now(), RecordedCall::Create {
            channel,
            message_id,
            content: message.content.clone(),
        }));
        Ok(message_id)
    }

    async fn edit_message(
        &self,
        channel: ChannelId,
        message_id: MessageId,
        message: &OutboundMessage,
    ) -> Result<()> {
        let mut state = self.begin()?;
        match state.live.get_mut(&message_id) {
            Some((c, content)) if *c == channel => *content = message.content.clone(),
            _ => return Err(ApiError::not_found(format!("unknown message {message_id}"))),
        }
        info!(
            channel_id = %channel,
            message_id = %message_id,
            content = %message.content,
            "recorded edit"
        );
        state.calls.push((Instant::now(), RecordedCall::Edit {
            channel,
            message_id,
            content: message.content.clone(),
        }));
        Ok(())
    }

    async fn delete_message(&self, channel: ChannelId, message_id: MessageId) -> Result<()> {
        let mut state = self.begin()?;
        if state.live.remove(&message_id).is_none() {
            return Err(ApiError::not_found(format!("unknown message {message_id}")));
        }
        info!(
            channel_id = %channel,
            message_id = %message_id,
            "recorded delete"
        );
        state.calls.push((Instant::now(), RecordedCall::Delete {
            channel,
            message_id,
        }));
        Ok(())
    }

    async fn open_direct_channel(&self, recipient: UserId) -> Result<ChannelId> {
        let mut state = self.begin()?;
        let channel = match state.direct.get(&recipient) {
            Some(channel) => *channel,
            None => {
                let channel = ChannelId::new(self.allocate());
                state.direct.insert(recipient, channel);
                channel
            },
        };
        state.calls.push((Instant::now(), RecordedCall::OpenDirect {
            recipient,
            channel,
        }));
        Ok(channel)
    }
}
