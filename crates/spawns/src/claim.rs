//! Resolving claim attempts from channel messages.

use std::sync::Arc;

use {
    async_trait::async_trait,
    beenbag_channels::{DeliveryOutbox, Messenger},
    beenbag_common::{OutboundMessage, UserId},
    chrono::Utc,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use beenbag_metrics::{counter, histogram, spawns as spawn_metrics};

use crate::{
    Result,
    catalog::{SpawnCatalog, normalize_claim},
    store::EncounterStore,
    types::{Encounter, InboundMessage},
};

/// A won claim, handed to the [`RewardSink`].
#[derive(Debug, Clone)]
pub struct Claim {
    pub encounter: Encounter,
    pub claimant: UserId,
    pub claimant_name: String,
    /// Tier name of the entity, e.g. "legendary".
    pub rarity: String,
}

#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// No active encounter in the channel, or the text names something else.
    NoMatch,
    /// The name matched but someone else (or the expiry) got there first.
    AlreadyResolved,
    Claimed(Claim),
}

impl ClaimOutcome {
    /// A won claim consumes the message; it is not dispatched further
    /// (e.g. as a command).
    #[must_use]
    pub fn suppresses_dispatch(&self) -> bool {
        matches!(self, Self::Claimed(_))
    }
}

/// Side effects of a winning claim.
#[async_trait]
pub trait RewardSink: Send + Sync {
    async fn on_claim(&self, claim: &Claim) -> Result<()>;
}

/// Announces catches in the encounter's channel.
pub struct CatchAnnouncer {
    messenger: Messenger,
}

impl CatchAnnouncer {
    pub fn new(messenger: Messenger) -> Self {
        Self { messenger }
    }
}

#[async_trait]
impl RewardSink for CatchAnnouncer {
    async fn on_claim(&self, claim: &Claim) -> Result<()> {
        let text = format!(
            "🏆 {} caught a {} {}!",
            claim.claimant_name, claim.rarity, claim.encounter.entity
        );
        if let Err(e) = self
            .messenger
            .create_message(claim.encounter.channel_id, &OutboundMessage::text(text))
            .await
        {
            warn!(
                encounter_id = claim.encounter.id,
                error = %e,
                "failed to announce catch"
            );
        }
        Ok(())
    }
}

/// DMs the winner a receipt through the [`DeliveryOutbox`].
pub struct CatchReceipt {
    outbox: Arc<DeliveryOutbox>,
}

impl CatchReceipt {
    pub fn new(outbox: Arc<DeliveryOutbox>) -> Self {
        Self { outbox }
    }
}

#[async_trait]
impl RewardSink for CatchReceipt {
    async fn on_claim(&self, claim: &Claim) -> Result<()> {
        let text = format!(
            "You caught a {} **{}** in <#{}>.",
            claim.rarity, claim.encounter.entity, claim.encounter.channel_id
        );
        if !self
            .outbox
            .enqueue(claim.claimant, OutboundMessage::text(text))
        {
            debug!(encounter_id = claim.encounter.id, "outbox closed; receipt dropped");
        }
        Ok(())
    }
}

/// Runs several sinks in order. One failing sink does not stop the rest.
#[derive(Default)]
pub struct RewardSinks {
    sinks: Vec<Arc<dyn RewardSink>>,
}

impl RewardSinks {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, sink: Arc<dyn RewardSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl RewardSink for RewardSinks {
    async fn on_claim(&self, claim: &Claim) -> Result<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.on_claim(claim).await {
                warn!(encounter_id = claim.encounter.id, error = %e, "reward sink failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

pub struct ClaimResolver {
    store: Arc<dyn EncounterStore>,
    catalog: Arc<SpawnCatalog>,
    sink: Arc<dyn RewardSink>,
}

impl ClaimResolver {
    pub fn new(
        store: Arc<dyn EncounterStore>,
        catalog: Arc<SpawnCatalog>,
        sink: Arc<dyn RewardSink>,
    ) -> Self {
        Self {
            store,
            catalog,
            sink,
        }
    }

    /// Treat `message` as a claim attempt on the channel's active encounter.
    ///
    /// Only one caller ever sees [`ClaimOutcome::Claimed`] for a given
    /// encounter: the store's `delete_if_exists` decides the winner.
    pub async fn handle(&self, message: &InboundMessage) -> Result<ClaimOutcome> {
        let attempt = normalize_claim(&message.text);
        if attempt.is_empty() {
            return Ok(ClaimOutcome::NoMatch);
        }

        let now = Utc::now();
        let Some(encounter) = self
            .store
            .find_active_in_channel(message.channel_id, now)
            .await?
        else {
            return Ok(ClaimOutcome::NoMatch);
        };

        if normalize_claim(&encounter.entity) != attempt {
            return Ok(ClaimOutcome::NoMatch);
        }

        if !self.store.delete_if_exists(encounter.id).await? {
            debug!(
                encounter_id = encounter.id,
                user_id = %message.author_id,
                "claim lost the race"
            );
            #[cfg(feature = "metrics")]
            counter!(spawn_metrics::CLAIM_RACES_LOST_TOTAL).increment(1);
            return Ok(ClaimOutcome::AlreadyResolved);
        }

        let waited = (now - encounter.created_at).num_milliseconds().max(0);
        info!(
            encounter_id = encounter.id,
            guild_id = %encounter.guild_id,
            channel_id = %encounter.channel_id,
            user_id = %message.author_id,
            entity = %encounter.entity,
            waited_ms = waited,
            "encounter claimed"
        );
        #[cfg(feature = "metrics")]
        {
            counter!(spawn_metrics::CLAIMS_TOTAL).increment(1);
            histogram!(spawn_metrics::TIME_TO_CLAIM_SECONDS).record(waited as f64 / 1000.0);
        }

        let rarity = self
            .catalog
            .tier_of(&encounter.entity)
            .map(|t| t.name.clone())
            .unwrap_or_default();
        let claim = Claim {
            encounter,
            claimant: message.author_id,
            claimant_name: message.author_name.clone(),
            rarity,
        };
        if let Err(e) = self.sink.on_claim(&claim).await {
            warn!(
                encounter_id = claim.encounter.id,
                error = %e,
                "reward sink failed; claim stands"
            );
        }
        Ok(ClaimOutcome::Claimed(claim))
    }
}
