//! The per-guild spawn loop.

use std::{sync::Arc, time::Duration};

use {
    beenbag_channels::Messenger,
    beenbag_common::{ChannelId, GuildId},
    beenbag_config::SpawnsConfig,
    chrono::Utc,
    rand::Rng,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use beenbag_metrics::{counter, spawns as spawn_metrics};

use crate::{
    Error, Result,
    catalog::SpawnCatalog,
    channels::SpawnChannelSource,
    error::Context,
    expiry::ExpiryWatcher,
    reveal::{FrameContext, FrameRenderer, RevealConfig, RevealPlan},
    store::EncounterStore,
    types::{Encounter, NewEncounter},
};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub min_interval: Duration,
    pub max_interval: Duration,
    /// How long each reveal frame stays up before the next edit.
    pub frame_dwell: Duration,
    /// Pause after a failed iteration.
    pub error_backoff: Duration,
    /// Skip channels that already hold an unexpired encounter.
    pub one_active_per_channel: bool,
    pub reveal: RevealConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_config(&SpawnsConfig::default())
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn from_config(config: &SpawnsConfig) -> Self {
        Self {
            min_interval: Duration::from_secs(config.min_interval_secs),
            max_interval: Duration::from_secs(config.max_interval_secs),
            frame_dwell: Duration::from_secs(config.frame_dwell_secs),
            error_backoff: Duration::from_secs(config.error_backoff_secs),
            one_active_per_channel: config.one_active_per_channel,
            reveal: RevealConfig {
                pixelate_chance: config.pixelate_chance,
                pixelate_levels: config.pixelate_levels.clone(),
                zoom_levels: config.zoom_levels.clone(),
            },
        }
    }

    fn idle_duration(&self, rng: &mut impl Rng) -> Duration {
        let (lo, hi) = if self.min_interval <= self.max_interval {
            (self.min_interval, self.max_interval)
        } else {
            (self.max_interval, self.min_interval)
        };
        let lo_ms = lo.as_millis() as u64;
        let hi_ms = hi.as_millis() as u64;
        Duration::from_millis(rng.random_range(lo_ms..=hi_ms))
    }
}

/// Everything a guild's spawn loop needs, shared by all guilds.
pub struct SchedulerContext {
    pub store: Arc<dyn EncounterStore>,
    pub channels: Arc<dyn SpawnChannelSource>,
    pub catalog: Arc<SpawnCatalog>,
    pub messenger: Messenger,
    pub watcher: ExpiryWatcher,
    pub renderer: Arc<dyn FrameRenderer>,
    pub config: SchedulerConfig,
}

/// What one pass of the loop did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    /// No eligible channel this time.
    NoChannel,
    Spawned {
        encounter_id: i64,
        channel_id: ChannelId,
        /// Frames shown, including the first one.
        frames_shown: usize,
        /// The artifact vanished mid-animation.
        ended_early: bool,
    },
    /// Cancelled mid-pass. `encounter_id` is set when a posted encounter
    /// was left to its watcher.
    Cancelled { encounter_id: Option<i64> },
}

/// Spawn loop for one guild: idle, pick a channel, create an encounter,
/// animate its reveal, repeat.
pub struct SpawnScheduler {
    guild: GuildId,
    ctx: Arc<SchedulerContext>,
}

impl SpawnScheduler {
    pub fn new(guild: GuildId, ctx: Arc<SchedulerContext>) -> Self {
        Self { guild, ctx }
    }

    /// Run until `cancel` fires. Iteration errors are logged and followed by
    /// the configured backoff; they never end the loop.
    pub async fn run(self, cancel: CancellationToken) {
        info!(guild_id = %self.guild, "spawn scheduler started");
        loop {
            let idle = {
                let mut rng = rand::rng();
                self.ctx.config.idle_duration(&mut rng)
            };
            debug!(guild_id = %self.guild, idle_secs = idle.as_secs(), "waiting for next spawn");
            if !sleep_or_cancel(idle, &cancel).await {
                break;
            }

            match self.iterate(&cancel).await {
                Ok(IterationOutcome::Cancelled { .. }) => break,
                Ok(outcome) => debug!(guild_id = %self.guild, ?outcome, "spawn iteration done"),
                Err(e) => {
                    warn!(guild_id = %self.guild, error = %e, "spawn iteration failed");
                    #[cfg(feature = "metrics")]
                    counter!(spawn_metrics::ITERATION_ERRORS_TOTAL).increment(1);
                    if !sleep_or_cancel(self.ctx.config.error_backoff, &cancel).await {
                        break;
                    }
                },
            }
        }
        info!(guild_id = %self.guild, "spawn scheduler stopped");
    }

    /// One pass without the leading idle wait.
    pub async fn iterate(&self, cancel: &CancellationToken) -> Result<IterationOutcome> {
        let ctx = &self.ctx;
        let Some(selected) = or_cancel(self.select_channel(), cancel).await else {
            return Ok(IterationOutcome::Cancelled { encounter_id: None });
        };
        let Some(channel) = selected? else {
            debug!(guild_id = %self.guild, "no eligible spawn channel");
            return Ok(IterationOutcome::NoChannel);
        };

        let (entity, tier, plan) = {
            let mut rng = rand::rng();
            let entity = ctx.catalog.choose(&mut rng)?.clone();
            let tier = ctx
                .catalog
                .tier(entity.rarity)
                .cloned()
                .ok_or_else(|| Error::unknown_rarity(&entity.name, entity.rarity))?;
            let plan = RevealPlan::choose(&ctx.config.reveal, &mut rng);
            (entity, tier, plan)
        };
        let first = plan.first().context("reveal plan has no frames")?;

        let created_at = Utc::now();
        let stay = chrono::Duration::from_std(tier.stay)
            .context("rarity stay out of range")?;
        let new = NewEncounter {
            guild_id: self.guild,
            channel_id: channel,
            entity: entity.name.clone(),
            created_at,
            expires_at: created_at + stay,
        };
        let id = ctx.store.create(&new).await?;

        let frame_count = plan.frames.len();
        let first_message = ctx.renderer.render(FrameContext {
            entity: &entity,
            tier: &tier,
            frame: first,
            index: 0,
            count: frame_count,
        });
        let posted =
            or_cancel(ctx.messenger.create_message(channel, &first_message), cancel).await;
        let artifact = match posted {
            Some(Ok(artifact)) => artifact,
            Some(Err(e)) => {
                self.discard_unposted(id).await;
                return Err(e.into());
            },
            None => {
                debug!(encounter_id = id, "cancelled before the encounter was posted");
                self.discard_unposted(id).await;
                return Ok(IterationOutcome::Cancelled { encounter_id: None });
            },
        };

        let mut encounter: Encounter = new.into_encounter(id);
        encounter.artifact_id = Some(artifact);
        ctx.watcher.watch(encounter);
        info!(
            guild_id = %self.guild,
            channel_id = %channel,
            encounter_id = id,
            entity = %entity.name,
            rarity = %tier.name,
            mode = ?plan.mode,
            "encounter spawned"
        );
        #[cfg(feature = "metrics")]
        counter!(spawn_metrics::ENCOUNTERS_CREATED_TOTAL).increment(1);

        ctx.store.set_artifact(id, artifact).await?;

        let mut frames_shown = 1;
        for (index, frame) in plan.remaining() {
            if !sleep_or_cancel(ctx.config.frame_dwell, cancel).await {
                return Ok(IterationOutcome::Cancelled {
                    encounter_id: Some(id),
                });
            }
            let message = ctx.renderer.render(FrameContext {
                entity: &entity,
                tier: &tier,
                frame,
                index,
                count: frame_count,
            });
            let edited =
                or_cancel(ctx.messenger.edit_message(channel, artifact, &message), cancel).await;
            let Some(edited) = edited else {
                return Ok(IterationOutcome::Cancelled {
                    encounter_id: Some(id),
                });
            };
            match edited {
                Ok(()) => frames_shown += 1,
                Err(e) if e.is_not_found() => {
                    debug!(encounter_id = id, "artifact gone, ending reveal");
                    return Ok(IterationOutcome::Spawned {
                        encounter_id: id,
                        channel_id: channel,
                        frames_shown,
                        ended_early: true,
                    });
                },
                Err(e) => return Err(e.into()),
            }
        }

        Ok(IterationOutcome::Spawned {
            encounter_id: id,
            channel_id: channel,
            frames_shown,
            ended_early: false,
        })
    }

    /// Drop the row of an encounter whose first frame never went out.
    async fn discard_unposted(&self, id: i64) {
        if let Err(e) = self.ctx.store.delete_if_exists(id).await {
            warn!(encounter_id = id, error = %e, "failed to remove unposted encounter");
        }
    }

    async fn select_channel(&self) -> Result<Option<ChannelId>> {
        let mut candidates = self.ctx.channels.eligible_channels(self.guild).await?;
        if self.ctx.config.one_active_per_channel {
            let now = Utc::now();
            let mut free = Vec::with_capacity(candidates.len());
            for channel in candidates {
                if self
                    .ctx
                    .store
                    .find_active_in_channel(channel, now)
                    .await?
                    .is_none()
                {
                    free.push(channel);
                } else {
                    debug!(channel_id = %channel, "channel already has an active encounter");
                }
            }
            candidates = free;
        }
        if candidates.is_empty() {
            return Ok(None);
        }
        let index = rand::rng().random_range(0..candidates.len());
        Ok(Some(candidates[index]))
    }
}

/// Run `fut` unless cancelled first. Returns `None` on cancel, dropping the
/// future along with any gate permit or backoff sleep it holds.
async fn or_cancel<T>(fut: impl Future<Output = T>, cancel: &CancellationToken) -> Option<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        value = fut => Some(value),
    }
}

/// Sleep for `duration` unless cancelled first. Returns `false` on cancel.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}
