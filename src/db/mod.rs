//! Correlation store: a pluggable backend behind one global lock.
//!
//! Every read-then-write sequence (duplicate check then insert, scan then
//! delete) runs through a [`StoreGuard`], so at most one such sequence is in
//! flight at a time. Dropping the guard releases the lock.

pub mod memory;
pub mod sqlite;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};

use crate::models::event::{EventCorrelationRecord, NewEventRecord};

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("store is shut down")]
    Closed,
}

/// Storage capability set. Implementations need not serialise access
/// themselves; [`Store`] does that.
#[async_trait]
pub trait CorrelationBackend: Send + Sync {
    /// Persist a record, returning its assigned id.
    async fn insert(&self, record: &NewEventRecord) -> Result<i64, StoreError>;

    /// Remove a record by id, returning the number of rows removed.
    async fn delete(&self, id: i64) -> Result<u64, StoreError>;

    async fn list_all(&self) -> Result<Vec<EventCorrelationRecord>, StoreError>;

    /// Write a point-in-time snapshot into `directory`, returning its path.
    async fn backup(&self, directory: &Path) -> Result<PathBuf, StoreError>;

    async fn shutdown(&self) -> Result<(), StoreError>;
}

/// Shared handle to the correlation store.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn CorrelationBackend>,
    lock: Arc<Mutex<()>>,
    backup_directory: PathBuf,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("backup_directory", &self.backup_directory)
            .finish_non_exhaustive()
    }
}

impl Store {
    pub fn new(backend: Arc<dyn CorrelationBackend>, backup_directory: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            lock: Arc::new(Mutex::new(())),
            backup_directory: backup_directory.into(),
        }
    }

    /// Acquire the store lock for one read-modify-write unit.
    pub async fn lock(&self) -> StoreGuard<'_> {
        let held = self.lock.lock().await;
        tracing::trace!("Store lock acquired");
        StoreGuard {
            _held: held,
            backend: self.backend.as_ref(),
        }
    }

    /// Snapshot the store into the backup directory.
    pub async fn backup(&self) -> Result<PathBuf, StoreError> {
        let _guard = self.lock().await;
        tokio::fs::create_dir_all(&self.backup_directory).await?;
        self.backend.backup(&self.backup_directory).await
    }

    /// Wait for in-flight units to finish, then close the backend.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        let _guard = self.lock().await;
        self.backend.shutdown().await
    }

    pub fn backup_directory(&self) -> &Path {
        &self.backup_directory
    }
}

/// Exclusive access to the store; the lock is released on drop.
pub struct StoreGuard<'a> {
    _held: MutexGuard<'a, ()>,
    backend: &'a dyn CorrelationBackend,
}

impl StoreGuard<'_> {
    pub async fn insert(&self, record: &NewEventRecord) -> Result<i64, StoreError> {
        self.backend.insert(record).await
    }

    pub async fn delete(&self, id: i64) -> Result<u64, StoreError> {
        self.backend.delete(id).await
    }

    pub async fn list_all(&self) -> Result<Vec<EventCorrelationRecord>, StoreError> {
        self.backend.list_all().await
    }

    /// Record driving the given remote incident, if any.
    pub async fn find_by_incident_id(
        &self,
        incident_id: &str,
    ) -> Result<Option<EventCorrelationRecord>, StoreError> {
        if incident_id.is_empty() {
            return Ok(None);
        }
        let records = self.list_all().await?;
        Ok(records
            .into_iter()
            .find(|r| r.remote_incident_id == incident_id))
    }
}

impl Drop for StoreGuard<'_> {
    fn drop(&mut self) {
        tracing::trace!("Store lock released");
    }
}

/// Backup file name stamped with the current UTC time.
pub(crate) fn backup_file_name(extension: &str) -> String {
    format!(
        "backup-{}.{extension}",
        chrono::Utc::now().format("%Y-%m-%d-%H-%M-%S")
    )
}
