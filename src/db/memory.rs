//! In-process correlation store, snapshotted to JSON on backup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{backup_file_name, CorrelationBackend, StoreError};
use crate::models::event::{EventCorrelationRecord, NewEventRecord};

#[derive(Debug, Default)]
pub struct MemoryBackend {
    table: Mutex<Table>,
    closed: AtomicBool,
}

#[derive(Debug, Default)]
struct Table {
    next_id: i64,
    rows: BTreeMap<i64, EventCorrelationRecord>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> Result<std::sync::MutexGuard<'_, Table>, StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        // A poisoned table still holds consistent rows: every mutation is a
        // single map operation.
        Ok(self.table.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

#[async_trait]
impl CorrelationBackend for MemoryBackend {
    async fn insert(&self, record: &NewEventRecord) -> Result<i64, StoreError> {
        let mut table = self.table()?;
        table.next_id += 1;
        let id = table.next_id;
        table.rows.insert(id, record.clone().into_record(id));
        Ok(id)
    }

    async fn delete(&self, id: i64) -> Result<u64, StoreError> {
        let mut table = self.table()?;
        Ok(u64::from(table.rows.remove(&id).is_some()))
    }

    async fn list_all(&self) -> Result<Vec<EventCorrelationRecord>, StoreError> {
        let table = self.table()?;
        Ok(table.rows.values().cloned().collect())
    }

    async fn backup(&self, directory: &Path) -> Result<PathBuf, StoreError> {
        let snapshot = serde_json::to_vec_pretty(&self.list_all().await?)?;
        let target = directory.join(backup_file_name("json"));
        tokio::fs::write(&target, snapshot).await?;
        Ok(target)
    }

    async fn shutdown(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
