//! One spawn scheduler per guild.

use std::{collections::HashMap, sync::Arc};

use {
    beenbag_common::GuildId,
    tokio::{sync::Mutex, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use beenbag_metrics::{gauge, spawns as spawn_metrics};

use crate::scheduler::{SchedulerContext, SpawnScheduler};

struct SchedulerHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    async fn stop(self, guild: GuildId) {
        self.cancel.cancel();
        self.join_cancelled(guild).await;
    }

    async fn join_cancelled(self, guild: GuildId) {
        if let Err(e) = self.join.await {
            warn!(guild_id = %guild, error = %e, "spawn scheduler ended abnormally");
        }
    }
}

/// Owns every running [`SpawnScheduler`].
///
/// The map lock only covers swapping handles: a replaced scheduler is
/// cancelled while the lock is held and awaited after it is released, so a
/// scheduler stuck in a slow call never blocks other guilds.
pub struct GuildSchedulerRegistry {
    ctx: Arc<SchedulerContext>,
    handles: Mutex<HashMap<GuildId, SchedulerHandle>>,
}

impl GuildSchedulerRegistry {
    pub fn new(ctx: Arc<SchedulerContext>) -> Self {
        Self {
            ctx,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Start (or replace) the scheduler for `guild`.
    pub async fn start(&self, guild: GuildId) {
        let previous = {
            let mut handles = self.handles.lock().await;
            let previous = handles.remove(&guild);
            if let Some(previous) = &previous {
                previous.cancel.cancel();
            }
            let cancel = CancellationToken::new();
            let scheduler = SpawnScheduler::new(guild, Arc::clone(&self.ctx));
            let join = tokio::spawn(scheduler.run(cancel.clone()));
            handles.insert(guild, SchedulerHandle { cancel, join });
            record_active(handles.len());
            previous
        };
        if let Some(previous) = previous {
            debug!(guild_id = %guild, "replacing spawn scheduler");
            previous.join_cancelled(guild).await;
        }
    }

    /// Stop the scheduler for `guild`, if one is running.
    pub async fn stop(&self, guild: GuildId) {
        let removed = {
            let mut handles = self.handles.lock().await;
            let removed = handles.remove(&guild);
            if let Some(handle) = &removed {
                handle.cancel.cancel();
            }
            record_active(handles.len());
            removed
        };
        if let Some(handle) = removed {
            handle.join_cancelled(guild).await;
            info!(guild_id = %guild, "spawn scheduler removed");
        }
    }

    /// Start every guild in `guilds`, replacing any running schedulers.
    pub async fn start_all(&self, guilds: impl IntoIterator<Item = GuildId>) {
        let mut started = 0usize;
        for guild in guilds {
            self.start(guild).await;
            started += 1;
        }
        info!(count = started, "spawn schedulers started");
    }

    /// Pick up changed spawn settings for `guild`.
    pub async fn restart(&self, guild: GuildId) {
        self.start(guild).await;
    }

    /// Stop every scheduler.
    pub async fn shutdown(&self) {
        let drained: Vec<(GuildId, SchedulerHandle)> =
            self.handles.lock().await.drain().collect();
        let count = drained.len();
        futures::future::join_all(
            drained
                .into_iter()
                .map(|(guild, handle)| handle.stop(guild)),
        )
        .await;
        record_active(0);
        info!(count, "spawn schedulers shut down");
    }

    pub async fn is_running(&self, guild: GuildId) -> bool {
        self.handles
            .lock()
            .await
            .get(&guild)
            .is_some_and(|h| !h.join.is_finished())
    }

    pub async fn len(&self) -> usize {
        self.handles.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
fn record_active(count: usize) {
    #[cfg(feature = "metrics")]
    gauge!(spawn_metrics::SCHEDULERS_ACTIVE).set(count as f64);
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            Result,
            catalog::{RarityTier, SpawnCatalog, SpawnEntity},
            channels::{SpawnChannelSource, StaticSpawnChannels},
            expiry::ExpiryWatcher,
            reveal::{RevealConfig, TextFrameRenderer},
            scheduler::SchedulerConfig,
            store_memory::InMemoryEncounterStore,
        },
        async_trait::async_trait,
        beenbag_channels::{
            ApiError, GateConfig, Messenger, RateLimitedGate,
            recording::{RecordedCall, RecordingApi},
        },
        beenbag_common::ChannelId,
        std::{
            sync::atomic::{AtomicUsize, Ordering},
            time::Duration,
        },
        tokio::time::Instant,
    };

    /// Counts lookups and never offers a channel, so schedulers just idle.
    #[derive(Default)]
    struct CountingChannels {
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl SpawnChannelSource for CountingChannels {
        async fn eligible_channels(&self, _guild: GuildId) -> Result<Vec<ChannelId>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    fn registry(channels: Arc<CountingChannels>) -> GuildSchedulerRegistry {
        registry_with(
            channels,
            Arc::new(RecordingApi::new()),
            Arc::new(InMemoryEncounterStore::new()),
        )
    }

    fn registry_with(
        channels: Arc<dyn SpawnChannelSource>,
        api: Arc<RecordingApi>,
        store: Arc<InMemoryEncounterStore>,
    ) -> GuildSchedulerRegistry {
        let messenger = Messenger::new(api, Arc::new(RateLimitedGate::new(GateConfig::default())));
        let catalog = SpawnCatalog::new(vec![SpawnEntity::new("Cow", 1)], vec![RarityTier {
            level: 1,
            name: "common".into(),
            stay: Duration::from_secs(180),
        }])
        .unwrap();
        GuildSchedulerRegistry::new(Arc::new(SchedulerContext {
            store: store.clone(),
            channels,
            catalog: Arc::new(catalog),
            messenger: messenger.clone(),
            watcher: ExpiryWatcher::new(store, messenger),
            renderer: Arc::new(TextFrameRenderer),
            config: SchedulerConfig {
                min_interval: Duration::from_secs(10),
                max_interval: Duration::from_secs(10),
                frame_dwell: Duration::from_secs(1),
                error_backoff: Duration::from_secs(1),
                one_active_per_channel: true,
                reveal: RevealConfig::default(),
            },
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn starting_twice_leaves_one_scheduler() {
        let channels = Arc::new(CountingChannels::default());
        let registry = registry(channels.clone());
        let guild = GuildId::new(1);

        registry.start(guild).await;
        registry.start(guild).await;
        assert_eq!(registry.len().await, 1);
        assert!(registry.is_running(guild).await);

        // One live loop polls once per 10s interval.
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(channels.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_starts_leave_one_scheduler() {
        let channels = Arc::new(CountingChannels::default());
        let registry = Arc::new(registry(channels.clone()));
        let guild = GuildId::new(7);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.start(guild).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.len().await, 1);
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(channels.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_and_shutdown() {
        let channels = Arc::new(CountingChannels::default());
        let registry = registry(channels.clone());

        registry
            .start_all([GuildId::new(1), GuildId::new(2), GuildId::new(3)])
            .await;
        assert_eq!(registry.len().await, 3);

        registry.stop(GuildId::new(2)).await;
        registry.stop(GuildId::new(99)).await;
        assert!(!registry.is_running(GuildId::new(2)).await);
        assert_eq!(registry.len().await, 2);

        registry.restart(GuildId::new(1)).await;
        assert_eq!(registry.len().await, 2);

        registry.shutdown().await;
        assert!(registry.is_empty().await);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(channels.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_a_throttled_post() {
        let guild = GuildId::new(1);
        let channels = StaticSpawnChannels::new();
        channels.set(guild, [ChannelId::new(10)]);
        channels.set(GuildId::new(2), [ChannelId::new(20)]);
        let api = Arc::new(RecordingApi::new());
        for _ in 0..4 {
            api.fail_next(ApiError::throttled(None, "429"));
        }
        let store = Arc::new(InMemoryEncounterStore::new());
        let registry = registry_with(Arc::new(channels), api.clone(), store.clone());

        registry.start(guild).await;
        // Idle 10s, then the first post is throttled and backing off.
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(api.attempts(), 1);

        let started = Instant::now();
        registry.start(GuildId::new(2)).await;
        registry.stop(guild).await;
        assert!(started.elapsed() < Duration::from_secs(1));

        assert!(!registry.is_running(guild).await);
        assert_eq!(api.attempts(), 1);
        assert!(store.is_empty());
        let posted = api
            .calls()
            .into_iter()
            .any(|c| matches!(c, RecordedCall::Create { .. }));
        assert!(!posted);
        registry.shutdown().await;
    }
}
