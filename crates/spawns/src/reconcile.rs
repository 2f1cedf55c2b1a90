//! Startup cleanup of encounters left over from a previous run.

use {
    chrono::{DateTime, Utc},
    tracing::{debug, info, warn},
};

use crate::{Result, expiry::ExpiryWatcher, store::EncounterStore, types::Encounter};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Past-deadline encounters resolved as escaped.
    pub expired: usize,
    /// Live encounters that got a fresh watcher.
    pub rearmed: usize,
    /// Rows someone else resolved while the sweep ran.
    pub already_gone: usize,
    /// Rows whose expiry failed; they stay stored for the next pass.
    pub failed: usize,
}

/// Bring stored encounters back under watch after a restart.
///
/// Past-deadline rows go through the normal expiry path (row delete, then
/// artifact delete and escape notice), so a claim racing the sweep still
/// resolves exactly once. Live rows get a watcher for their remaining time.
pub async fn reconcile(
    store: &dyn EncounterStore,
    watcher: &ExpiryWatcher,
) -> Result<ReconcileReport> {
    let now = Utc::now();
    let mut report = ReconcileReport::default();
    for encounter in store.list_all().await? {
        if encounter.is_expired_at(now) {
            expire_one(watcher, &encounter, &mut report).await;
        } else {
            debug!(encounter_id = encounter.id, "re-arming expiry watcher");
            watcher.watch(encounter);
            report.rearmed += 1;
        }
    }
    info!(
        expired = report.expired,
        rearmed = report.rearmed,
        already_gone = report.already_gone,
        failed = report.failed,
        "encounter reconciliation done"
    );
    Ok(report)
}

/// Expire rows whose deadline passed before `now` through the watcher's
/// cleanup path. Live rows are left alone.
pub async fn sweep_expired(
    store: &dyn EncounterStore,
    watcher: &ExpiryWatcher,
    now: DateTime<Utc>,
) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();
    for encounter in store.list_all().await? {
        if encounter.is_expired_at(now) {
            expire_one(watcher, &encounter, &mut report).await;
        }
    }
    info!(
        expired = report.expired,
        already_gone = report.already_gone,
        failed = report.failed,
        "expired encounters swept"
    );
    Ok(report)
}

async fn expire_one(
    watcher: &ExpiryWatcher,
    encounter: &Encounter,
    report: &mut ReconcileReport,
) {
    match watcher.expire(encounter).await {
        Ok(true) => report.expired += 1,
        Ok(false) => report.already_gone += 1,
        Err(e) => {
            warn!(encounter_id = encounter.id, error = %e, "failed to expire stale encounter");
            report.failed += 1;
        },
    }
}
