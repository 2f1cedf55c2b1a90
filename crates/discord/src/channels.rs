//! Spawn channels filtered by what the bot can actually post in.

use std::sync::{Arc, RwLock};

use {
    async_trait::async_trait,
    beenbag_common::{ChannelId, GuildId},
    beenbag_spawns::{Result, SpawnChannelSource},
    serenity::{
        all::{Cache, Guild, GuildChannel, Permissions},
        model::id,
    },
    tracing::debug,
};

/// The gateway cache, available once the first session is ready.
#[derive(Clone, Default)]
pub struct CacheSlot(Arc<RwLock<Option<Arc<Cache>>>>);

impl CacheSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, cache: Arc<Cache>) {
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = Some(cache);
    }

    pub fn get(&self) -> Option<Arc<Cache>> {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

const REQUIRED: Permissions = Permissions::VIEW_CHANNEL.union(Permissions::SEND_MESSAGES);
const REQUIRED_IN_THREAD: Permissions =
    Permissions::VIEW_CHANNEL.union(Permissions::SEND_MESSAGES_IN_THREADS);

fn permits(perms: Permissions) -> bool {
    perms.contains(REQUIRED)
}

/// Where a configured channel id sits in a cached guild.
enum Placement<'a, C> {
    Channel(&'a C),
    /// A thread, judged by its parent channel when that is cached.
    Thread { parent: Option<&'a C> },
    Missing,
}

fn locate(guild: &Guild, channel: ChannelId) -> Placement<'_, GuildChannel> {
    let channel = id::ChannelId::new(channel.get());
    if let Some(found) = guild.channels.get(&channel) {
        return Placement::Channel(found);
    }
    match guild.threads.iter().find(|t| t.id == channel) {
        Some(thread) => Placement::Thread {
            parent: thread.parent_id.and_then(|p| guild.channels.get(&p)),
        },
        None => Placement::Missing,
    }
}

/// `None` means the cache can't tell.
fn verdict<C>(
    placement: Placement<'_, C>,
    perms_in: impl Fn(&C) -> Permissions,
) -> Option<bool> {
    match placement {
        Placement::Channel(channel) => Some(permits(perms_in(channel))),
        Placement::Thread { parent: Some(parent) } => {
            Some(perms_in(parent).contains(REQUIRED_IN_THREAD))
        },
        Placement::Thread { parent: None } => None,
        Placement::Missing => Some(false),
    }
}

/// Channel verdict from the cache. `None` means the cache can't tell.
fn cached_verdict(cache: &Cache, guild: GuildId, channel: ChannelId) -> Option<bool> {
    let me = cache.current_user().id;
    let guild = cache.guild(id::GuildId::new(guild.get()))?;
    match locate(&guild, channel) {
        Placement::Missing => Some(false),
        placement => {
            let member = guild.members.get(&me)?;
            verdict(placement, |c| guild.user_permissions_in(c, member))
        },
    }
}

/// Wraps the configured channel list and drops channels the bot can no
/// longer see or post in.
pub struct DiscordSpawnChannels {
    configured: Arc<dyn SpawnChannelSource>,
    cache: CacheSlot,
}

impl DiscordSpawnChannels {
    pub fn new(configured: Arc<dyn SpawnChannelSource>, cache: CacheSlot) -> Self {
        Self { configured, cache }
    }
}

#[async_trait]
impl SpawnChannelSource for DiscordSpawnChannels {
    async fn eligible_channels(&self, guild: GuildId) -> Result<Vec<ChannelId>> {
        let configured = self.configured.eligible_channels(guild).await?;
        let Some(cache) = self.cache.get() else {
            return Ok(configured);
        };
        Ok(configured
            .into_iter()
            .filter(|&channel| match cached_verdict(&cache, guild, channel) {
                Some(false) => {
                    debug!(guild_id = %guild, channel_id = %channel, "spawn channel not postable");
                    false
                },
                Some(true) | None => true,
            })
            .collect())
    }
}
