//! In-memory store for tests and dry runs.

use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};

use {
    async_trait::async_trait,
    beenbag_common::{ChannelId, MessageId},
    chrono::{DateTime, Utc},
};

use crate::{
    Error, Result,
    store::EncounterStore,
    types::{Encounter, NewEncounter},
};

/// Encounters in a `BTreeMap` keyed by id. Removal happens under the map's
/// lock, so `delete_if_exists` is linearizable.
pub struct InMemoryEncounterStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    encounters: BTreeMap<i64, Encounter>,
}

impl InMemoryEncounterStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().encounters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryEncounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EncounterStore for InMemoryEncounterStore {
    async fn create(&self, encounter: &NewEncounter) -> Result<i64> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner
            .encounters
            .insert(id, encounter.clone().into_encounter(id));
        Ok(id)
    }

    async fn set_artifact(&self, id: i64, artifact: MessageId) -> Result<()> {
        let mut inner = self.lock();
        let encounter = inner
            .encounters
            .get_mut(&id)
            .ok_or_else(|| Error::encounter_not_found(id))?;
        encounter.artifact_id = Some(artifact);
        Ok(())
    }

    async fn find_active_in_channel(
        &self,
        channel: ChannelId,
        now: DateTime<Utc>,
    ) -> Result<Option<Encounter>> {
        let inner = self.lock();
        Ok(inner
            .encounters
            .values()
            .filter(|e| e.channel_id == channel && e.expires_at > now)
            .min_by_key(|e| (e.created_at, e.id))
            .cloned())
    }

    async fn get(&self, id: i64) -> Result<Option<Encounter>> {
        Ok(self.lock().encounters.get(&id).cloned())
    }

    async fn delete_if_exists(&self, id: i64) -> Result<bool> {
        Ok(self.lock().encounters.remove(&id).is_some())
    }

    async fn list_all(&self) -> Result<Vec<Encounter>> {
        let mut all: Vec<Encounter> = self.lock().encounters.values().cloned().collect();
        all.sort_by_key(|e| e.expires_at);
        Ok(all)
    }
}
