//! Wiring of the spawn subsystem from configuration.

use std::{sync::Arc, time::Duration};

use {
    beenbag_channels::{
        DeliveryOutbox, GateConfig, Messenger, MessagingApi, OutboxConfig, RateLimitedGate,
    },
    beenbag_config::{BeenbagConfig, DatabaseConfig},
    beenbag_spawns::{
        CatchAnnouncer, CatchReceipt, ClaimResolver, EncounterStore, ExpiryWatcher,
        GuildSchedulerRegistry, RewardSinks, SchedulerConfig, SchedulerContext, SpawnCatalog,
        SpawnChannelSource, TextFrameRenderer, connect, run_migrations,
    },
    sqlx::SqlitePool,
    tracing::info,
};

use crate::error::Result;

#[must_use]
pub fn gate_config(config: &beenbag_config::GateConfig) -> GateConfig {
    GateConfig {
        max_concurrency: config.max_concurrency,
        max_attempts: config.max_attempts,
        base_delay: Duration::from_millis(config.base_delay_ms),
        max_delay: Duration::from_millis(config.max_delay_ms),
    }
}

/// Open the database and bring its schema up to date.
pub async fn open_database(config: &DatabaseConfig) -> Result<SqlitePool> {
    let pool = connect(&config.url, config.max_connections).await?;
    run_migrations(&pool).await?;
    info!(url = %config.url, "database ready");
    Ok(pool)
}

/// The process-scoped spawn services, shared by the event handler and the
/// run lifecycle.
pub struct SpawnServices {
    pub store: Arc<dyn EncounterStore>,
    pub catalog: Arc<SpawnCatalog>,
    pub messenger: Messenger,
    pub watcher: ExpiryWatcher,
    pub registry: Arc<GuildSchedulerRegistry>,
    pub resolver: Arc<ClaimResolver>,
    pub outbox: Arc<DeliveryOutbox>,
}

impl SpawnServices {
    /// Build everything on top of one messaging API and one store. Must be
    /// called inside the runtime: the outbox consumer starts immediately.
    pub fn build(
        config: &BeenbagConfig,
        api: Arc<dyn MessagingApi>,
        store: Arc<dyn EncounterStore>,
        channels: Arc<dyn SpawnChannelSource>,
    ) -> Result<Self> {
        let catalog = Arc::new(SpawnCatalog::from_config(
            &config.spawns.entities,
            &config.spawns.rarities,
        )?);
        let gate = Arc::new(RateLimitedGate::new(gate_config(&config.gate)));
        let messenger = Messenger::new(api, gate);
        let outbox = Arc::new(DeliveryOutbox::start(
            messenger.clone(),
            OutboxConfig::per_second(config.outbox.per_second),
        ));
        let watcher = ExpiryWatcher::new(Arc::clone(&store), messenger.clone());

        let registry = Arc::new(GuildSchedulerRegistry::new(Arc::new(SchedulerContext {
            store: Arc::clone(&store),
            channels,
            catalog: Arc::clone(&catalog),
            messenger: messenger.clone(),
            watcher: watcher.clone(),
            renderer: Arc::new(TextFrameRenderer),
            config: SchedulerConfig::from_config(&config.spawns),
        })));

        let mut sinks = RewardSinks::new().with(Arc::new(CatchAnnouncer::new(messenger.clone())));
        if config.outbox.catch_receipts {
            sinks = sinks.with(Arc::new(CatchReceipt::new(Arc::clone(&outbox))));
        }
        let resolver = Arc::new(ClaimResolver::new(
            Arc::clone(&store),
            Arc::clone(&catalog),
            Arc::new(sinks),
        ));

        info!(
            entities = catalog.entities().len(),
            spawnable = catalog.spawnable_count(),
            catch_receipts = config.outbox.catch_receipts,
            "spawn services ready"
        );
        Ok(Self {
            store,
            catalog,
            messenger,
            watcher,
            registry,
            resolver,
            outbox,
        })
    }

    /// Stop schedulers first so nothing new is created, then pending
    /// watchers, then the outbox.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
        self.watcher.shutdown().await;
        self.outbox.shutdown().await;
        info!("spawn services stopped");
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        beenbag_channels::recording::{RecordedCall, RecordingApi},
        beenbag_common::{ChannelId, GuildId, UserId},
        beenbag_spawns::{
            InMemoryEncounterStore, InboundMessage, NewEncounter, SqliteEncounterStore,
            StaticSpawnChannels,
        },
    };

    fn services(
        config: &BeenbagConfig,
    ) -> (Arc<RecordingApi>, Arc<InMemoryEncounterStore>, SpawnServices) {
        let api = Arc::new(RecordingApi::new());
        let store = Arc::new(InMemoryEncounterStore::new());
        let services = SpawnServices::build(
            config,
            api.clone(),
            store.clone(),
            Arc::new(StaticSpawnChannels::new()),
        )
        .unwrap();
        (api, store, services)
    }

    #[test]
    fn gate_config_converts_units() {
        let gate = gate_config(&beenbag_config::GateConfig {
            max_concurrency: 2,
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 4_000,
        });
        assert_eq!(gate.base_delay, Duration::from_millis(250));
        assert_eq!(gate.max_delay, Duration::from_secs(4));
    }

    #[tokio::test]
    async fn default_config_builds_the_builtin_catalog() {
        let (_, _, services) = services(&BeenbagConfig::default());
        assert!(services.catalog.spawnable_count() > 0);
        assert!(services.registry.is_empty().await);
        services.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn receipts_are_wired_when_enabled() {
        let mut config = BeenbagConfig::default();
        config.outbox.catch_receipts = true;
        let (api, store, services) = services(&config);

        let now = chrono::Utc::now();
        store
            .create(&NewEncounter {
                guild_id: GuildId::new(1),
                channel_id: ChannelId::new(10),
                entity: "Creeper".into(),
                created_at: now,
                expires_at: now + chrono::Duration::seconds(60),
            })
            .await
            .unwrap();
        let outcome = services
            .resolver
            .handle(&InboundMessage {
                guild_id: GuildId::new(1),
                channel_id: ChannelId::new(10),
                author_id: UserId::new(3),
                author_name: "Sam".into(),
                text: "creeper".into(),
            })
            .await
            .unwrap();
        assert!(outcome.suppresses_dispatch());

        tokio::time::sleep(Duration::from_secs(1)).await;
        services.shutdown().await;
        assert_eq!(api.created_in(ChannelId::new(10)).len(), 1);
        assert_eq!(
            api.calls()
                .iter()
                .filter(|c| matches!(c, RecordedCall::OpenDirect { .. }))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn sqlite_database_opens_and_migrates() {
        let pool = open_database(&DatabaseConfig {
            url: "sqlite::memory:".into(),
            max_connections: 4,
        })
        .await
        .unwrap();
        let store = SqliteEncounterStore::with_pool(pool);
        assert!(store.list_all().await.unwrap().is_empty());
    }
}
