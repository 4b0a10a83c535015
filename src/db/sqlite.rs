//! SQLite-backed correlation store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use super::{backup_file_name, CorrelationBackend, StoreError};
use crate::models::event::{EventCorrelationRecord, NewEventRecord};

#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Open (creating if needed) the database at `path` and apply migrations.
    pub async fn connect(path: &str) -> Result<Self, StoreError> {
        let pool = create_pool(path).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!(path = %path, "SQLite correlation store ready");
        Ok(Self { pool })
    }
}

/// Create a SQLite connection pool.
pub async fn create_pool(path: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    // Access is already serialised by the store lock.
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
}

#[async_trait]
impl CorrelationBackend for SqliteBackend {
    async fn insert(&self, record: &NewEventRecord) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO events (
                site_name, problem_id, problem_type, hostname, service_name,
                service_display_name, content, notification_type,
                remote_policy_id, remote_incident_id, interacting_user_email, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.site_name)
        .bind(&record.problem_id)
        .bind(record.problem_type)
        .bind(&record.hostname)
        .bind(&record.service_name)
        .bind(&record.service_display_name)
        .bind(&record.content)
        .bind(record.notification_type)
        .bind(&record.remote_policy_id)
        .bind(&record.remote_incident_id)
        .bind(&record.interacting_user_email)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn delete(&self, id: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_all(&self) -> Result<Vec<EventCorrelationRecord>, StoreError> {
        let rows = sqlx::query_as::<_, EventCorrelationRecord>(
            r#"
            SELECT id, site_name, problem_id, problem_type, hostname, service_name,
                   service_display_name, content, notification_type,
                   remote_policy_id, remote_incident_id, interacting_user_email, created_at
            FROM events
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn backup(&self, directory: &Path) -> Result<PathBuf, StoreError> {
        let target = directory.join(backup_file_name("db"));
        // VACUUM INTO refuses to overwrite; a same-second rerun replaces the snapshot.
        match tokio::fs::remove_file(&target).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
        sqlx::query("VACUUM INTO ?")
            .bind(target.to_string_lossy().into_owned())
            .execute(&self.pool)
            .await?;
        Ok(target)
    }

    async fn shutdown(&self) -> Result<(), StoreError> {
        self.pool.close().await;
        Ok(())
    }
}
