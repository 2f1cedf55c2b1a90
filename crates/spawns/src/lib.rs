//! Ephemeral mob encounters: spawning, reveal animation, claims, expiry.
//!
//! Each guild runs one [`SpawnScheduler`] (owned by the
//! [`GuildSchedulerRegistry`]) that periodically posts an encounter in one of
//! the guild's spawn channels. The first matching chat message claims it
//! through [`ClaimResolver`]; otherwise its [`ExpiryWatcher`] lets it escape.
//! The store's `delete_if_exists` decides which of the two wins.

pub mod catalog;
pub mod channels;
pub mod claim;
pub mod error;
pub mod expiry;
pub mod reconcile;
pub mod registry;
pub mod reveal;
pub mod scheduler;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
pub mod types;

pub use {
    catalog::{RarityTier, SpawnCatalog, SpawnEntity, normalize_claim},
    channels::{SpawnChannelSource, SqliteSpawnChannels, StaticSpawnChannels},
    claim::{
        CatchAnnouncer, CatchReceipt, Claim, ClaimOutcome, ClaimResolver, RewardSink, RewardSinks,
    },
    error::{Error, Result},
    expiry::ExpiryWatcher,
    reconcile::{ReconcileReport, reconcile, sweep_expired},
    registry::GuildSchedulerRegistry,
    reveal::{
        FrameContext, FrameRenderer, RevealConfig, RevealFrame, RevealMode, RevealPlan,
        TextFrameRenderer,
    },
    scheduler::{IterationOutcome, SchedulerConfig, SchedulerContext, SpawnScheduler},
    store::EncounterStore,
    store_memory::InMemoryEncounterStore,
    store_sqlite::{SqliteEncounterStore, connect},
    types::{Encounter, InboundMessage, NewEncounter},
};

/// Run database migrations for encounters and spawn channels.
///
/// Creates the `encounters` and `guild_spawn_channels` tables. Call at
/// startup before [`SqliteEncounterStore::with_pool`] or
/// [`SqliteSpawnChannels::with_pool`].
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
