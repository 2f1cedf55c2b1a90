//! Per-encounter expiry timers.

use std::{sync::Arc, time::Duration};

use {
    beenbag_channels::Messenger,
    beenbag_common::OutboundMessage,
    chrono::Utc,
    tokio::time::Instant,
    tokio_util::{sync::CancellationToken, task::TaskTracker},
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use beenbag_metrics::{counter, spawns as spawn_metrics};

use crate::{Result, store::EncounterStore, types::Encounter};

/// Spawns one watcher task per encounter and owns them all.
///
/// Watchers live on a process-wide [`TaskTracker`] rather than inside a
/// guild's scheduler, so restarting a scheduler leaves its pending expiries
/// alone. [`ExpiryWatcher::shutdown`] is the only way to stop them early.
#[derive(Clone)]
pub struct ExpiryWatcher {
    store: Arc<dyn EncounterStore>,
    messenger: Messenger,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl ExpiryWatcher {
    pub fn new(store: Arc<dyn EncounterStore>, messenger: Messenger) -> Self {
        Self {
            store,
            messenger,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Watchers still waiting or cleaning up.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Start a watcher that fires at `encounter.expires_at`.
    ///
    /// The deadline is fixed now from the absolute expiry time, so a watcher
    /// started late (e.g. on reconciliation) fires at the stored moment or
    /// immediately if that moment has passed.
    pub fn watch(&self, encounter: Encounter) {
        let remaining = (encounter.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let deadline = Instant::now() + remaining;
        debug!(
            encounter_id = encounter.id,
            channel_id = %encounter.channel_id,
            remaining_secs = remaining.as_secs(),
            "expiry watcher armed"
        );

        let watcher = self.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                () = watcher.shutdown.cancelled() => {
                    debug!(encounter_id = encounter.id, "expiry watcher cancelled");
                    return;
                },
                () = tokio::time::sleep_until(deadline) => {},
            }
            if let Err(e) = watcher.expire(&encounter).await {
                warn!(encounter_id = encounter.id, error = %e, "expiry cleanup failed");
            }
        });
    }

    /// Resolve `encounter` as escaped if nobody claimed it first.
    ///
    /// Returns `Ok(false)` when the encounter was already gone. Cleanup of the
    /// channel is best effort: failures are logged, never returned.
    pub async fn expire(&self, encounter: &Encounter) -> Result<bool> {
        let artifact = match encounter.artifact_id {
            Some(id) => Some(id),
            None => self
                .store
                .get(encounter.id)
                .await?
                .and_then(|e| e.artifact_id),
        };

        if !self.store.delete_if_exists(encounter.id).await? {
            debug!(encounter_id = encounter.id, "encounter already resolved");
            return Ok(false);
        }

        info!(
            encounter_id = encounter.id,
            guild_id = %encounter.guild_id,
            channel_id = %encounter.channel_id,
            entity = %encounter.entity,
            "encounter escaped"
        );
        #[cfg(feature = "metrics")]
        counter!(spawn_metrics::EXPIRED_TOTAL).increment(1);

        if let Some(artifact) = artifact {
            match self
                .messenger
                .delete_message(encounter.channel_id, artifact)
                .await
            {
                Ok(()) => {},
                Err(e) if e.is_not_found() => {
                    debug!(encounter_id = encounter.id, "artifact already deleted");
                },
                Err(e) => {
                    warn!(encounter_id = encounter.id, error = %e, "failed to delete artifact");
                },
            }
        }

        let notice = OutboundMessage::text(format!(
            "**{}** escaped, maybe next time",
            encounter.entity
        ));
        if let Err(e) = self
            .messenger
            .create_message(encounter.channel_id, &notice)
            .await
        {
            warn!(encounter_id = encounter.id, error = %e, "failed to post escape notice");
        }
        Ok(true)
    }

    /// Cancel every pending watcher and wait for the ones mid-cleanup.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}
