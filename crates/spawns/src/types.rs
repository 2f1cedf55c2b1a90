use {
    beenbag_common::{ChannelId, GuildId, MessageId, UserId},
    chrono::{DateTime, Utc},
};

/// A live, claimable spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encounter {
    pub id: i64,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    /// Catalog name of the spawned entity.
    pub entity: String,
    /// Message showing the encounter, once it has been posted.
    pub artifact_id: Option<MessageId>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Encounter {
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Input for [`crate::EncounterStore::create`].
#[derive(Debug, Clone)]
pub struct NewEncounter {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub entity: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewEncounter {
    #[must_use]
    pub fn into_encounter(self, id: i64) -> Encounter {
        Encounter {
            id,
            guild_id: self.guild_id,
            channel_id: self.channel_id,
            entity: self.entity,
            artifact_id: None,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

/// A message seen in a guild channel.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    /// Display name used in announcements.
    pub author_name: String,
    pub text: String,
}
