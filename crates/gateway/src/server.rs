//! Process lifecycle for `beenbag run`.
//!
//! 1. Validate config, install the metrics recorder
//! 2. Open the database and wire the spawn services
//! 3. Hand the gateway session to the reconnect supervisor
//! 4. On Ctrl-C (or a fatal gateway error) stop schedulers, watchers, and
//!    the outbox, in that order

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use {
    beenbag_channels::{Messenger, MessagingApi, RateLimitedGate, recording::RecordingApi},
    beenbag_common::{ChannelId, GuildId},
    beenbag_config::{BeenbagConfig, Severity, validate},
    beenbag_discord::{
        CacheSlot, DiscordApi, DiscordConnector, DiscordSpawnChannels, HandlerServices,
        SpawnEventHandler,
    },
    beenbag_metrics::{MetricsRecorderConfig, init_metrics},
    beenbag_spawns::{
        EncounterStore, ExpiryWatcher, InMemoryEncounterStore, ReconcileReport,
        SpawnChannelSource, SqliteEncounterStore, SqliteSpawnChannels, StaticSpawnChannels,
        sweep_expired,
    },
    chrono::Utc,
    secrecy::ExposeSecret,
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
};

use crate::{
    error::{Error, Result},
    metrics_export::spawn_textfile_exporter,
    services::{SpawnServices, gate_config, open_database},
    supervisor::{ReconnectSupervisor, SupervisorConfig},
};

/// How `run` talks to the outside world.
#[derive(Debug, Clone, Default)]
pub enum RunMode {
    /// Connect to Discord with the configured token and database.
    #[default]
    Live,
    /// No network and no database: calls are recorded and logged, and
    /// schedulers run for the given channels until Ctrl-C.
    DryRun { channels: Vec<(GuildId, ChannelId)> },
}

/// Fail on validation errors, log warnings.
pub fn check_config(config: &BeenbagConfig) -> Result<()> {
    let report = validate(config);
    for diagnostic in &report.diagnostics {
        match diagnostic.severity {
            Severity::Error => error!(path = %diagnostic.path, "{}", diagnostic.message),
            Severity::Warning => warn!(path = %diagnostic.path, "{}", diagnostic.message),
        }
    }
    if report.has_errors() {
        let report = report
            .diagnostics
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        return Err(Error::InvalidConfig { report });
    }
    Ok(())
}

/// Cancelled on Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown requested"),
            Err(e) => warn!(error = %e, "cannot listen for Ctrl-C; shutting down"),
        }
        trigger.cancel();
    });
    cancel
}

/// Run the bot until Ctrl-C or a fatal gateway error.
pub async fn run(config: BeenbagConfig, mode: RunMode) -> Result<()> {
    check_config(&config)?;

    let metrics = init_metrics(MetricsRecorderConfig {
        enabled: config.metrics.enabled,
        global_labels: config.metrics.labels.clone(),
    })?;
    let cancel = shutdown_token();
    let exporter = match (&config.metrics.textfile, config.metrics.enabled) {
        (Some(path), true) => Some(spawn_textfile_exporter(
            metrics,
            path.clone(),
            Duration::from_secs(config.metrics.export_interval_secs),
            cancel.child_token(),
        )),
        _ => None,
    };

    let result = match mode {
        RunMode::Live => run_live(&config, cancel.clone()).await,
        RunMode::DryRun { channels } => run_dry(&config, channels, cancel.clone()).await,
    };

    cancel.cancel();
    if let Some(exporter) = exporter
        && let Err(e) = exporter.await
    {
        warn!(error = %e, "metrics exporter ended abnormally");
    }
    result
}

async fn run_live(config: &BeenbagConfig, cancel: CancellationToken) -> Result<()> {
    let token = config.discord.token.clone().ok_or(Error::MissingToken)?;
    let pool = open_database(&config.database).await?;

    let api = Arc::new(DiscordApi::from_token(token.expose_secret()));
    let cache = CacheSlot::new();
    let channels: Arc<dyn SpawnChannelSource> = Arc::new(DiscordSpawnChannels::new(
        Arc::new(SqliteSpawnChannels::with_pool(pool.clone())),
        cache.clone(),
    ));
    let store = Arc::new(SqliteEncounterStore::with_pool(pool));
    let services = SpawnServices::build(config, api, store, channels)?;

    let handler = Arc::new(SpawnEventHandler::new(HandlerServices {
        registry: Arc::clone(&services.registry),
        resolver: Arc::clone(&services.resolver),
        store: Arc::clone(&services.store),
        watcher: services.watcher.clone(),
        cache,
        spawns_enabled: config.spawns.enabled,
    }));
    let supervisor = ReconnectSupervisor::new(
        Arc::new(DiscordConnector::new(token, handler)),
        SupervisorConfig::from_config(&config.supervisor),
    );

    info!(spawns_enabled = config.spawns.enabled, "beenbag running");
    let result = supervisor.run(cancel).await;
    services.shutdown().await;
    result.map_err(Error::from)
}

async fn run_dry(
    config: &BeenbagConfig,
    targets: Vec<(GuildId, ChannelId)>,
    cancel: CancellationToken,
) -> Result<()> {
    let api = Arc::new(RecordingApi::new());
    let channels = Arc::new(StaticSpawnChannels::new());
    let guilds: BTreeSet<GuildId> = targets.iter().map(|(guild, _)| *guild).collect();
    for guild in &guilds {
        channels.set(
            *guild,
            targets
                .iter()
                .filter(|(g, _)| g == guild)
                .map(|(_, channel)| *channel),
        );
    }

    let services = SpawnServices::build(
        config,
        api.clone(),
        Arc::new(InMemoryEncounterStore::new()),
        channels,
    )?;
    info!(guilds = guilds.len(), channels = targets.len(), "dry run started");
    services.registry.start_all(guilds).await;

    cancel.cancelled().await;
    services.shutdown().await;
    info!(calls = api.calls().len(), "dry run finished");
    Ok(())
}

/// Expire overdue encounters without opening a gateway session. Artifacts
/// are removed and escape notices posted over REST.
pub async fn sweep(config: &BeenbagConfig) -> Result<ReconcileReport> {
    let token = config.discord.token.clone().ok_or(Error::MissingToken)?;
    let store = Arc::new(SqliteEncounterStore::with_pool(
        open_database(&config.database).await?,
    ));
    let api = Arc::new(DiscordApi::from_token(token.expose_secret()));
    sweep_with(config, api, store).await
}

async fn sweep_with(
    config: &BeenbagConfig,
    api: Arc<dyn MessagingApi>,
    store: Arc<dyn EncounterStore>,
) -> Result<ReconcileReport> {
    let gate = Arc::new(RateLimitedGate::new(gate_config(&config.gate)));
    let watcher = ExpiryWatcher::new(Arc::clone(&store), Messenger::new(api, gate));
    Ok(sweep_expired(store.as_ref(), &watcher, Utc::now()).await?)
}
