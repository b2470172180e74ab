//! Step-work entry repository.

use crate::error::{Result, StoreError};
use crate::models::{StepEntry, SyncMeta, SyncStatus};
use async_trait::async_trait;
use bridge_traits::Clock;
use sqlx::{query, query_as, FromRow, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Step entry data access. One entry per `(owner_id, step_number)`.
#[async_trait]
pub trait StepEntryRepository: Send + Sync {
    /// Insert or replace; always resets the row to `pending`.
    async fn upsert(&self, entry: &StepEntry) -> Result<()>;

    /// Point lookup by natural key. `Ok(None)` when absent.
    async fn find_by_step(&self, owner_id: &str, step_number: i64) -> Result<Option<StepEntry>>;

    /// Point lookup by local id. `Ok(None)` when absent.
    async fn find_by_id(&self, local_id: &str) -> Result<Option<StepEntry>>;

    /// All live entries for a user, by step number.
    async fn list(&self, owner_id: &str) -> Result<Vec<StepEntry>>;

    /// Entries awaiting upload, oldest first.
    async fn list_pending(&self, owner_id: &str) -> Result<Vec<StepEntry>>;

    /// Delete: immediate removal if never synced, tombstone otherwise.
    async fn delete(&self, owner_id: &str, local_id: &str) -> Result<bool>;

    /// Pull-side upsert; pending-wins-over-pull enforced in SQL.
    async fn apply_remote(&self, entry: &StepEntry) -> Result<()>;
}

#[derive(Debug, FromRow)]
struct StepEntryRow {
    local_id: String,
    server_id: Option<String>,
    owner_id: String,
    step_number: i64,
    reflection: Option<String>,
    completed: i64,
    sync_status: String,
    synced_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
    retry_count: i64,
    deleted_at: Option<i64>,
}

impl TryFrom<StepEntryRow> for StepEntry {
    type Error = StoreError;

    fn try_from(row: StepEntryRow) -> Result<Self> {
        let sync_status =
            SyncStatus::from_str(&row.sync_status).map_err(|message| StoreError::InvalidData {
                column: "sync_status".to_string(),
                message,
            })?;

        Ok(StepEntry {
            meta: SyncMeta {
                local_id: row.local_id,
                server_id: row.server_id,
                owner_id: row.owner_id,
                sync_status,
                synced_at: row.synced_at,
                created_at: row.created_at,
                updated_at: row.updated_at,
                retry_count: row.retry_count,
                deleted_at: row.deleted_at,
            },
            step_number: row.step_number,
            reflection: row.reflection,
            completed: row.completed != 0,
        })
    }
}

/// SQLite implementation of [`StepEntryRepository`].
pub struct SqliteStepEntryRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteStepEntryRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl StepEntryRepository for SqliteStepEntryRepository {
    async fn upsert(&self, entry: &StepEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO step_entries (
                local_id, server_id, owner_id, step_number, reflection, completed,
                sync_status, synced_at, created_at, updated_at, retry_count, deleted_at
            ) VALUES (?, ?, ?, ?, ?, ?, 'pending', NULL, ?, ?, 0, NULL)
            ON CONFLICT(owner_id, step_number) DO UPDATE SET
                reflection = excluded.reflection,
                completed = excluded.completed,
                sync_status = 'pending',
                synced_at = NULL,
                updated_at = excluded.updated_at,
                deleted_at = NULL
            ON CONFLICT(local_id) DO UPDATE SET
                reflection = excluded.reflection,
                completed = excluded.completed,
                sync_status = 'pending',
                synced_at = NULL,
                updated_at = excluded.updated_at,
                deleted_at = NULL
            "#,
        )
        .bind(&entry.meta.local_id)
        .bind(&entry.meta.server_id)
        .bind(&entry.meta.owner_id)
        .bind(entry.step_number)
        .bind(&entry.reflection)
        .bind(entry.completed)
        .bind(entry.meta.created_at)
        .bind(entry.meta.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_step(&self, owner_id: &str, step_number: i64) -> Result<Option<StepEntry>> {
        let row = query_as::<_, StepEntryRow>(
            "SELECT * FROM step_entries \
             WHERE owner_id = ? AND step_number = ? AND deleted_at IS NULL",
        )
        .bind(owner_id)
        .bind(step_number)
        .fetch_optional(&self.pool)
        .await?;

        row.map(StepEntry::try_from).transpose()
    }

    async fn find_by_id(&self, local_id: &str) -> Result<Option<StepEntry>> {
        let row = query_as::<_, StepEntryRow>(
            "SELECT * FROM step_entries WHERE local_id = ? AND deleted_at IS NULL",
        )
        .bind(local_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(StepEntry::try_from).transpose()
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<StepEntry>> {
        let rows = query_as::<_, StepEntryRow>(
            "SELECT * FROM step_entries \
             WHERE owner_id = ? AND deleted_at IS NULL \
             ORDER BY step_number ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StepEntry::try_from).collect()
    }

    async fn list_pending(&self, owner_id: &str) -> Result<Vec<StepEntry>> {
        let rows = query_as::<_, StepEntryRow>(
            "SELECT * FROM step_entries \
             WHERE owner_id = ? AND sync_status = 'pending' AND deleted_at IS NULL \
             ORDER BY created_at ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StepEntry::try_from).collect()
    }

    async fn delete(&self, owner_id: &str, local_id: &str) -> Result<bool> {
        let now = self.clock.unix_timestamp_millis();
        let mut tx = self.pool.begin().await?;

        let removed = query(
            "DELETE FROM step_entries \
             WHERE owner_id = ? AND local_id = ? AND server_id IS NULL",
        )
        .bind(owner_id)
        .bind(local_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if removed > 0 {
            tx.commit().await?;
            return Ok(true);
        }

        let tombstoned = query(
            "UPDATE step_entries \
             SET deleted_at = ?, sync_status = 'pending', synced_at = NULL, updated_at = ? \
             WHERE owner_id = ? AND local_id = ? AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(now)
        .bind(owner_id)
        .bind(local_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(tombstoned > 0)
    }

    async fn apply_remote(&self, entry: &StepEntry) -> Result<()> {
        let server_id = entry.meta.server_id.as_deref().ok_or_else(|| {
            StoreError::InvalidData {
                column: "server_id".to_string(),
                message: "pulled record is missing its remote id".to_string(),
            }
        })?;
        let now = self.clock.unix_timestamp_millis();

        sqlx::query(
            r#"
            INSERT INTO step_entries (
                local_id, server_id, owner_id, step_number, reflection, completed,
                sync_status, synced_at, created_at, updated_at, retry_count, deleted_at
            ) VALUES (?, ?, ?, ?, ?, ?, 'synced', ?, ?, ?, 0, NULL)
            ON CONFLICT(owner_id, step_number) DO UPDATE SET
                server_id = excluded.server_id,
                reflection = excluded.reflection,
                completed = excluded.completed,
                sync_status = 'synced',
                synced_at = excluded.synced_at,
                updated_at = excluded.updated_at,
                retry_count = 0
            WHERE step_entries.sync_status NOT IN ('pending', 'syncing')
              AND step_entries.deleted_at IS NULL
            ON CONFLICT(local_id) DO UPDATE SET
                server_id = excluded.server_id,
                reflection = excluded.reflection,
                completed = excluded.completed,
                sync_status = 'synced',
                synced_at = excluded.synced_at,
                updated_at = excluded.updated_at,
                retry_count = 0
            WHERE step_entries.sync_status NOT IN ('pending', 'syncing')
              AND step_entries.deleted_at IS NULL
            "#,
        )
        .bind(server_id)
        .bind(server_id)
        .bind(&entry.meta.owner_id)
        .bind(entry.step_number)
        .bind(&entry.reflection)
        .bind(entry.completed)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
