//! Store snapshots, periodic and at shutdown.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::db::{Store, StoreError};

/// Snapshot the store every `period` until the task is aborted.
///
/// Failures are logged and the next tick tries again.
pub fn spawn_periodic_backup(store: Store, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match store.backup().await {
                Ok(path) => tracing::info!(path = %path.display(), "Store backup written"),
                Err(e) => tracing::error!(
                    error = %e,
                    directory = %store.backup_directory().display(),
                    "Store backup failed"
                ),
            }
        }
    })
}

/// Final snapshot and store close at shutdown, each bounded by `limit`.
///
/// Connections still running after the grace period may hold the store lock;
/// a step that cannot get it in time is skipped with a warning.
pub async fn finalize_store(store: &Store, limit: Duration) -> Result<(), StoreError> {
    match tokio::time::timeout(limit, store.backup()).await {
        Ok(Ok(path)) => tracing::info!(path = %path.display(), "Final store backup written"),
        Ok(Err(e)) => tracing::error!(error = %e, "Final store backup failed"),
        Err(_) => tracing::warn!(
            limit_secs = limit.as_secs(),
            "Final store backup skipped, store still busy"
        ),
    }

    match tokio::time::timeout(limit, store.shutdown()).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(limit_secs = limit.as_secs(), "Store close skipped, store still busy");
            Ok(())
        }
    }
}
