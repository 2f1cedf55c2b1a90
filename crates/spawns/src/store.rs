//! Persistence trait for encounters.

use {
    async_trait::async_trait,
    beenbag_common::{ChannelId, MessageId},
    chrono::{DateTime, Utc},
};

use crate::{
    Result,
    types::{Encounter, NewEncounter},
};

/// Persistence backend for encounters.
///
/// `delete_if_exists` is the only arbiter of who resolves an encounter: it
/// must remove the row atomically and report `true` to exactly one caller no
/// matter how many race for the same id.
#[async_trait]
pub trait EncounterStore: Send + Sync {
    /// Insert a new encounter and return its generated id.
    async fn create(&self, encounter: &NewEncounter) -> Result<i64>;

    /// Record the message that shows the encounter.
    async fn set_artifact(&self, id: i64, artifact: MessageId) -> Result<()>;

    /// Oldest encounter in `channel` whose deadline is after `now`.
    async fn find_active_in_channel(
        &self,
        channel: ChannelId,
        now: DateTime<Utc>,
    ) -> Result<Option<Encounter>>;

    async fn get(&self, id: i64) -> Result<Option<Encounter>>;

    /// Remove the encounter. Returns `true` only for the caller that removed it.
    async fn delete_if_exists(&self, id: i64) -> Result<bool>;

    /// Every stored encounter, live or expired.
    async fn list_all(&self) -> Result<Vec<Encounter>>;
}
