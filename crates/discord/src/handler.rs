//! Discord event handler for serenity.
//!
//! Translates gateway events into registry, reconciliation, and claim calls.
//! The serenity callbacks only convert types; the `on_*` methods hold the
//! behavior so it can be driven without a live gateway.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use {
    beenbag_common::{ChannelId, GuildId, UserId},
    beenbag_spawns::{
        ClaimOutcome, ClaimResolver, EncounterStore, ExpiryWatcher, GuildSchedulerRegistry,
        InboundMessage, reconcile,
    },
    serenity::{
        all::{
            Context, EventHandler, GatewayIntents, Guild, Message, Ready, UnavailableGuild,
        },
        async_trait,
    },
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use beenbag_metrics::{counter, gateway as gateway_metrics};

use crate::channels::CacheSlot;

/// What the handler drives.
pub struct HandlerServices {
    pub registry: Arc<GuildSchedulerRegistry>,
    pub resolver: Arc<ClaimResolver>,
    pub store: Arc<dyn EncounterStore>,
    pub watcher: ExpiryWatcher,
    pub cache: CacheSlot,
    /// Start spawn loops on ready and guild join.
    pub spawns_enabled: bool,
}

/// Handler for Discord gateway events. Shared by every session the
/// supervisor opens.
pub struct SpawnEventHandler {
    services: HandlerServices,
    reconciled: AtomicBool,
}

impl SpawnEventHandler {
    pub fn new(services: HandlerServices) -> Self {
        Self {
            services,
            reconciled: AtomicBool::new(false),
        }
    }

    /// Required gateway intents for the bot.
    pub fn intents() -> GatewayIntents {
        GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT
    }

    /// Session is ready: reconcile leftovers once per process, then
    /// (re)start a scheduler for every guild.
    pub async fn on_ready(&self, guilds: Vec<GuildId>) {
        if !self.reconciled.swap(true, Ordering::SeqCst)
            && let Err(e) = reconcile(self.services.store.as_ref(), &self.services.watcher).await
        {
            warn!(error = %e, "encounter reconciliation failed");
            self.reconciled.store(false, Ordering::SeqCst);
        }

        if self.services.spawns_enabled {
            self.services.registry.start_all(guilds).await;
        } else {
            debug!("spawns disabled; not starting schedulers");
        }
    }

    pub async fn on_guild_joined(&self, guild: GuildId) {
        if self.services.spawns_enabled {
            info!(guild_id = %guild, "joined guild");
            self.services.registry.start(guild).await;
        }
    }

    pub async fn on_guild_left(&self, guild: GuildId) {
        info!(guild_id = %guild, "left guild");
        self.services.registry.stop(guild).await;
    }

    /// Offer a guild message to the claim resolver.
    pub async fn on_message(&self, message: &InboundMessage) -> ClaimOutcome {
        match self.services.resolver.handle(message).await {
            Ok(outcome) => {
                if let ClaimOutcome::AlreadyResolved = outcome {
                    debug!(
                        channel_id = %message.channel_id,
                        user_id = %message.author_id,
                        "claim arrived after resolution"
                    );
                }
                outcome
            },
            Err(e) => {
                warn!(channel_id = %message.channel_id, error = %e, "claim handling failed");
                ClaimOutcome::NoMatch
            },
        }
    }
}

fn inbound(msg: &Message, guild: GuildId) -> InboundMessage {
    InboundMessage {
        guild_id: guild,
        channel_id: ChannelId::new(msg.channel_id.get()),
        author_id: UserId::new(msg.author.id.get()),
        author_name: msg
            .author
            .global_name
            .clone()
            .unwrap_or_else(|| msg.author.name.clone()),
        text: msg.content.clone(),
    }
}

#[async_trait]
impl EventHandler for SpawnEventHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(
            bot_name = %ready.user.name,
            guilds = ready.guilds.len(),
            "discord bot ready"
        );
        self.services.cache.set(ctx.cache.clone());
        let guilds = ready
            .guilds
            .iter()
            .map(|g| GuildId::new(g.id.get()))
            .collect();
        self.on_ready(guilds).await;
    }

    async fn guild_create(&self, _ctx: Context, guild: Guild, is_new: Option<bool>) {
        if is_new == Some(true) {
            self.on_guild_joined(GuildId::new(guild.id.get())).await;
        }
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        // An outage also deletes the guild from the cache; keep spawning.
        if !incomplete.unavailable {
            self.on_guild_left(GuildId::new(incomplete.id.get())).await;
        }
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        // Skip bot messages, including our own frames and notices.
        if msg.author.bot {
            return;
        }
        let Some(guild) = msg.guild_id else {
            return;
        };
        #[cfg(feature = "metrics")]
        counter!(gateway_metrics::MESSAGES_RECEIVED_TOTAL).increment(1);
        let outcome = self.on_message(&inbound(&msg, GuildId::new(guild.get()))).await;
        if outcome.suppresses_dispatch() {
            debug!(message_id = msg.id.get(), "message consumed by claim");
        }
    }
}
