//! Routine repository.

use crate::error::{Result, StoreError};
use crate::models::{Routine, SyncMeta, SyncStatus};
use async_trait::async_trait;
use bridge_traits::Clock;
use sqlx::{query, query_as, FromRow, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Routine data access. Keyed by local id; pulled records are matched by
/// `server_id`.
#[async_trait]
pub trait RoutineRepository: Send + Sync {
    /// Insert or replace by local id; always resets the row to `pending`.
    async fn upsert(&self, routine: &Routine) -> Result<()>;

    /// Point lookup by local id. `Ok(None)` when absent.
    async fn find_by_id(&self, local_id: &str) -> Result<Option<Routine>>;

    /// All live routines for a user.
    async fn list(&self, owner_id: &str) -> Result<Vec<Routine>>;

    /// Routines awaiting upload, oldest first.
    async fn list_pending(&self, owner_id: &str) -> Result<Vec<Routine>>;

    /// Delete: immediate removal if never synced, tombstone otherwise.
    async fn delete(&self, owner_id: &str, local_id: &str) -> Result<bool>;

    /// Pull-side upsert; pending-wins-over-pull enforced in SQL.
    async fn apply_remote(&self, routine: &Routine) -> Result<()>;
}

#[derive(Debug, FromRow)]
struct RoutineRow {
    local_id: String,
    server_id: Option<String>,
    owner_id: String,
    name: String,
    time_of_day: Option<String>,
    weekdays: String,
    enabled: i64,
    sync_status: String,
    synced_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
    retry_count: i64,
    deleted_at: Option<i64>,
}

impl TryFrom<RoutineRow> for Routine {
    type Error = StoreError;

    fn try_from(row: RoutineRow) -> Result<Self> {
        let sync_status =
            SyncStatus::from_str(&row.sync_status).map_err(|message| StoreError::InvalidData {
                column: "sync_status".to_string(),
                message,
            })?;

        Ok(Routine {
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
            name: row.name,
            time_of_day: row.time_of_day,
            weekdays: serde_json::from_str(&row.weekdays)?,
            enabled: row.enabled != 0,
        })
    }
}

/// SQLite implementation of [`RoutineRepository`].
pub struct SqliteRoutineRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteRoutineRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl RoutineRepository for SqliteRoutineRepository {
    async fn upsert(&self, routine: &Routine) -> Result<()> {
        let weekdays = serde_json::to_string(&routine.weekdays)?;

        sqlx::query(
            r#"
            INSERT INTO routines (
                local_id, server_id, owner_id, name, time_of_day, weekdays, enabled,
                sync_status, synced_at, created_at, updated_at, retry_count, deleted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', NULL, ?, ?, 0, NULL)
            ON CONFLICT(local_id) DO UPDATE SET
                name = excluded.name,
                time_of_day = excluded.time_of_day,
                weekdays = excluded.weekdays,
                enabled = excluded.enabled,
                sync_status = 'pending',
                synced_at = NULL,
                updated_at = excluded.updated_at,
                deleted_at = NULL
            "#,
        )
        .bind(&routine.meta.local_id)
        .bind(&routine.meta.server_id)
        .bind(&routine.meta.owner_id)
        .bind(&routine.name)
        .bind(&routine.time_of_day)
        .bind(&weekdays)
        .bind(routine.enabled)
        .bind(routine.meta.created_at)
        .bind(routine.meta.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, local_id: &str) -> Result<Option<Routine>> {
        let row = query_as::<_, RoutineRow>(
            "SELECT * FROM routines WHERE local_id = ? AND deleted_at IS NULL",
        )
        .bind(local_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Routine::try_from).transpose()
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<Routine>> {
        let rows = query_as::<_, RoutineRow>(
            "SELECT * FROM routines \
             WHERE owner_id = ? AND deleted_at IS NULL \
             ORDER BY created_at ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Routine::try_from).collect()
    }

    async fn list_pending(&self, owner_id: &str) -> Result<Vec<Routine>> {
        let rows = query_as::<_, RoutineRow>(
            "SELECT * FROM routines \
             WHERE owner_id = ? AND sync_status = 'pending' AND deleted_at IS NULL \
             ORDER BY created_at ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Routine::try_from).collect()
    }

    async fn delete(&self, owner_id: &str, local_id: &str) -> Result<bool> {
        let now = self.clock.unix_timestamp_millis();
        let mut tx = self.pool.begin().await?;

        let removed = query(
            "DELETE FROM routines \
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
            "UPDATE routines \
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

    async fn apply_remote(&self, routine: &Routine) -> Result<()> {
        let server_id = routine.meta.server_id.as_deref().ok_or_else(|| {
            StoreError::InvalidData {
                column: "server_id".to_string(),
                message: "pulled record is missing its remote id".to_string(),
            }
        })?;
        let weekdays = serde_json::to_string(&routine.weekdays)?;
        let now = self.clock.unix_timestamp_millis();

        sqlx::query(
            r#"
            INSERT INTO routines (
                local_id, server_id, owner_id, name, time_of_day, weekdays, enabled,
                sync_status, synced_at, created_at, updated_at, retry_count, deleted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 'synced', ?, ?, ?, 0, NULL)
            ON CONFLICT(server_id) WHERE server_id IS NOT NULL DO UPDATE SET
                name = excluded.name,
                time_of_day = excluded.time_of_day,
                weekdays = excluded.weekdays,
                enabled = excluded.enabled,
                sync_status = 'synced',
                synced_at = excluded.synced_at,
                updated_at = excluded.updated_at,
                retry_count = 0
            WHERE routines.sync_status NOT IN ('pending', 'syncing')
              AND routines.deleted_at IS NULL
            ON CONFLICT(local_id) DO UPDATE SET
                server_id = excluded.server_id,
                name = excluded.name,
                time_of_day = excluded.time_of_day,
                weekdays = excluded.weekdays,
                enabled = excluded.enabled,
                sync_status = 'synced',
                synced_at = excluded.synced_at,
                updated_at = excluded.updated_at,
                retry_count = 0
            WHERE routines.sync_status NOT IN ('pending', 'syncing')
              AND routines.deleted_at IS NULL
            "#,
        )
        .bind(server_id)
        .bind(server_id)
        .bind(&routine.meta.owner_id)
        .bind(&routine.name)
        .bind(&routine.time_of_day)
        .bind(&weekdays)
        .bind(routine.enabled)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
