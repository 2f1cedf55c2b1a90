//! Paced, best-effort delivery of direct messages.

use std::{collections::HashMap, time::Duration};

use {
    beenbag_common::{ChannelId, OutboundMessage, UserId},
    tokio::{
        sync::{Mutex, mpsc},
        task::JoinHandle,
        time::Instant,
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use beenbag_metrics::{counter, gauge, outbox as outbox_metrics};

use crate::{Messenger, Result};

#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Pause between consecutive deliveries.
    pub min_delay: Duration,
}

impl OutboxConfig {
    /// Pace for a target rate. Rates below 0.1/s are clamped to 0.1/s.
    #[must_use]
    pub fn per_second(rate: f64) -> Self {
        let rate = if rate.is_finite() {
            rate.max(0.1)
        } else {
            0.1
        };
        Self {
            min_delay: Duration::from_secs_f64(1.0 / rate),
        }
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self::per_second(3.0)
    }
}

/// A queued direct message.
#[derive(Debug, Clone)]
pub struct OutboxItem {
    pub recipient: UserId,
    pub payload: OutboundMessage,
    pub enqueued_at: Instant,
}

/// Unbounded FIFO of direct messages drained by a single paced consumer.
pub struct DeliveryOutbox {
    tx: mpsc::UnboundedSender<OutboxItem>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DeliveryOutbox {
    /// Spawn the consumer task and return the producer side.
    pub fn start(messenger: Messenger, config: OutboxConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let consumer = Consumer {
            messenger,
            min_delay: config.min_delay,
            direct_channels: HashMap::new(),
        };
        let worker = tokio::spawn(consumer.run(rx, cancel.clone()));
        info!(
            min_delay_ms = config.min_delay.as_millis() as u64,
            "direct message outbox started"
        );
        Self {
            tx,
            cancel,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue a message for `recipient`. Never blocks; returns `false` only
    /// when the outbox has been shut down.
    pub fn enqueue(&self, recipient: UserId, payload: OutboundMessage) -> bool {
        let item = OutboxItem {
            recipient,
            payload,
            enqueued_at: Instant::now(),
        };
        match self.tx.send(item) {
            Ok(()) => {
                #[cfg(feature = "metrics")]
                {
                    counter!(outbox_metrics::ENQUEUED_TOTAL).increment(1);
                    gauge!(outbox_metrics::QUEUE_DEPTH).increment(1.0);
                }
                true
            },
            Err(_) => {
                debug!(recipient = %recipient, "outbox closed, dropping message");
                false
            },
        }
    }

    /// Stop the consumer. Queued items are discarded and an item in flight
    /// may be abandoned.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker
            && let Err(e) = worker.await
        {
            warn!(error = %e, "outbox consumer ended abnormally");
        }
    }
}

impl Drop for DeliveryOutbox {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Consumer {
    messenger: Messenger,
    min_delay: Duration,
    direct_channels: HashMap<UserId, ChannelId>,
}

impl Consumer {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<OutboxItem>, cancel: CancellationToken) {
        loop {
            let item = tokio::select! {
                () = cancel.cancelled() => break,
                item = rx.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            #[cfg(feature = "metrics")]
            gauge!(outbox_metrics::QUEUE_DEPTH).decrement(1.0);

            tokio::select! {
                () = cancel.cancelled() => break,
                () = self.deliver_logged(item) => {},
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.min_delay) => {},
            }
        }
        debug!("outbox consumer stopped");
    }

    async fn deliver_logged(&mut self, item: OutboxItem) {
        let recipient = item.recipient;
        let queued_ms = item.enqueued_at.elapsed().as_millis() as u64;
        match self.deliver(&item).await {
            Ok(()) => {
                debug!(recipient = %recipient, queued_ms, "direct message delivered");
                #[cfg(feature = "metrics")]
                counter!(outbox_metrics::DELIVERED_TOTAL).increment(1);
            },
            Err(e) => {
                warn!(recipient = %recipient, queued_ms, error = %e, "dropping direct message");
                #[cfg(feature = "metrics")]
                counter!(outbox_metrics::DROPPED_TOTAL).increment(1);
            },
        }
    }

    /// Send one direct message, resolving the recipient's channel once and
    /// forgetting it if the platform reports it gone.
    async fn deliver(&mut self, item: &OutboxItem) -> Result<()> {
        let channel = match self.direct_channels.get(&item.recipient) {
            Some(channel) => *channel,
            None => {
                let channel = self.messenger.open_direct_channel(item.recipient).await?;
                self.direct_channels.insert(item.recipient, channel);
                channel
            },
        };
        match self.messenger.create_message(channel, &item.payload).await {
            Ok(_) => Ok(()),
            Err(e) => {
                if e.is_not_found() {
                    self.direct_channels.remove(&item.recipient);
                }
                Err(e)
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            ApiError, GateConfig, RateLimitedGate,
            recording::{RecordedCall, RecordingApi},
        },
        std::sync::Arc,
    };

    fn outbox(api: &Arc<RecordingApi>, per_second: f64) -> DeliveryOutbox {
        let gate = Arc::new(RateLimitedGate::new(GateConfig {
            max_attempts: 1,
            ..GateConfig::default()
        }));
        let api: Arc<dyn crate::MessagingApi> = api.clone();
        let messenger = Messenger::new(api, gate);
        DeliveryOutbox::start(messenger, OutboxConfig::per_second(per_second))
    }

    fn sends(api: &RecordingApi) -> Vec<(Instant, String)> {
        api.timed_calls()
            .into_iter()
            .filter_map(|(at, call)| match call {
                RecordedCall::Create { content, .. } => Some((at, content)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn rate_is_clamped() {
        assert_eq!(OutboxConfig::per_second(0.0).min_delay, Duration::from_secs(10));
        assert_eq!(
            OutboxConfig::per_second(4.0).min_delay,
            Duration::from_millis(250)
        );
        assert_eq!(
            OutboxConfig::per_second(f64::NAN).min_delay,
            Duration::from_secs(10)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn deliveries_are_paced_in_fifo_order() {
        let api = Arc::new(RecordingApi::new());
        let outbox = outbox(&api, 2.0);

        for i in 0..5 {
            assert!(outbox.enqueue(UserId::new(1 + i % 2), OutboundMessage::text(format!("m{i}"))));
        }
        tokio::time::sleep(Duration::from_secs(5)).await;

        let sent = sends(&api);
        let order: Vec<&str> = sent.iter().map(|(_, c)| c.as_str()).collect();
        assert_eq!(order, ["m0", "m1", "m2", "m3", "m4"]);
        for pair in sent.windows(2) {
            assert!(pair[1].0 - pair[0].0 >= Duration::from_millis(500));
        }
        outbox.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_delivery_is_dropped_and_consumer_continues() {
        let api = Arc::new(RecordingApi::new());
        let outbox = outbox(&api, 10.0);

        api.fail_next(ApiError::permanent("dm disabled"));
        outbox.enqueue(UserId::new(1), OutboundMessage::text("lost"));
        outbox.enqueue(UserId::new(2), OutboundMessage::text("kept"));
        tokio::time::sleep(Duration::from_secs(1)).await;

        let sent: Vec<String> = sends(&api).into_iter().map(|(_, c)| c).collect();
        assert_eq!(sent, ["kept"]);
        outbox.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn direct_channel_is_resolved_once_per_recipient() {
        let api = Arc::new(RecordingApi::new());
        let outbox = outbox(&api, 10.0);

        for _ in 0..3 {
            outbox.enqueue(UserId::new(42), OutboundMessage::text("hi"));
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        let opens = api
            .calls()
            .into_iter()
            .filter(|c| matches!(c, RecordedCall::OpenDirect { .. }))
            .count();
        assert_eq!(opens, 1);
        assert_eq!(sends(&api).len(), 3);
        outbox.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_after_shutdown_is_rejected() {
        let api = Arc::new(RecordingApi::new());
        let outbox = outbox(&api, 1.0);
        outbox.shutdown().await;
        tokio::task::yield_now().await;
        assert!(!outbox.enqueue(UserId::new(1), OutboundMessage::text("late")));
    }
}
