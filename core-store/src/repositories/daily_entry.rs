//! Daily check-in entry repository.

use crate::error::{Result, StoreError};
use crate::models::{DailyEntry, SyncMeta, SyncStatus};
use async_trait::async_trait;
use bridge_traits::Clock;
use sqlx::{query, query_as, FromRow, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Daily entry data access.
///
/// One entry per `(owner_id, entry_date)`; the UI write path always resets
/// the row to `pending`.
#[async_trait]
pub trait DailyEntryRepository: Send + Sync {
    /// Insert or replace by natural key or primary key.
    ///
    /// Always resets `sync_status` to `pending` and clears `synced_at`. A
    /// conflicting row is replaced, never duplicated, and an existing
    /// `server_id` is preserved.
    async fn upsert(&self, entry: &DailyEntry) -> Result<()>;

    /// Point lookup by natural key. `Ok(None)` when absent.
    async fn find_by_date(&self, owner_id: &str, entry_date: &str) -> Result<Option<DailyEntry>>;

    /// Point lookup by local id. `Ok(None)` when absent.
    async fn find_by_id(&self, local_id: &str) -> Result<Option<DailyEntry>>;

    /// All live (non-tombstoned) entries for a user, newest date first.
    async fn list(&self, owner_id: &str) -> Result<Vec<DailyEntry>>;

    /// Entries awaiting upload (`pending` only), oldest first.
    async fn list_pending(&self, owner_id: &str) -> Result<Vec<DailyEntry>>;

    /// Delete an entry.
    ///
    /// A never-synced row is removed immediately; a row with a `server_id`
    /// is tombstoned so the push phase can issue the remote delete.
    ///
    /// Returns `Ok(false)` if nothing was deleted.
    async fn delete(&self, owner_id: &str, local_id: &str) -> Result<bool>;

    /// Apply a record fetched during a pull phase.
    ///
    /// Inserts or updates with `sync_status = synced`, but never touches a
    /// row that is currently `pending`/`syncing` or tombstoned, since those
    /// carry newer local edits (pending-wins-over-pull).
    async fn apply_remote(&self, entry: &DailyEntry) -> Result<()>;
}

#[derive(Debug, FromRow)]
struct DailyEntryRow {
    local_id: String,
    server_id: Option<String>,
    owner_id: String,
    entry_date: String,
    mood_score: Option<i64>,
    craving_score: Option<i64>,
    notes: Option<String>,
    gratitudes: String,
    sync_status: String,
    synced_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
    retry_count: i64,
    deleted_at: Option<i64>,
}

impl TryFrom<DailyEntryRow> for DailyEntry {
    type Error = StoreError;

    fn try_from(row: DailyEntryRow) -> Result<Self> {
        let sync_status =
            SyncStatus::from_str(&row.sync_status).map_err(|message| StoreError::InvalidData {
                column: "sync_status".to_string(),
                message,
            })?;

        Ok(DailyEntry {
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
            entry_date: row.entry_date,
            mood_score: row.mood_score,
            craving_score: row.craving_score,
            notes: row.notes,
            gratitudes: serde_json::from_str(&row.gratitudes)?,
        })
    }
}

/// SQLite implementation of [`DailyEntryRepository`].
pub struct SqliteDailyEntryRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteDailyEntryRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl DailyEntryRepository for SqliteDailyEntryRepository {
    async fn upsert(&self, entry: &DailyEntry) -> Result<()> {
        let gratitudes = serde_json::to_string(&entry.gratitudes)?;

        sqlx::query(
            r#"
            INSERT INTO daily_entries (
                local_id, server_id, owner_id, entry_date,
                mood_score, craving_score, notes, gratitudes,
                sync_status, synced_at, created_at, updated_at, retry_count, deleted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', NULL, ?, ?, 0, NULL)
            ON CONFLICT(owner_id, entry_date) DO UPDATE SET
                mood_score = excluded.mood_score,
                craving_score = excluded.craving_score,
                notes = excluded.notes,
                gratitudes = excluded.gratitudes,
                sync_status = 'pending',
                synced_at = NULL,
                updated_at = excluded.updated_at,
                deleted_at = NULL
            ON CONFLICT(local_id) DO UPDATE SET
                mood_score = excluded.mood_score,
                craving_score = excluded.craving_score,
                notes = excluded.notes,
                gratitudes = excluded.gratitudes,
                sync_status = 'pending',
                synced_at = NULL,
                updated_at = excluded.updated_at,
                deleted_at = NULL
            "#,
        )
        .bind(&entry.meta.local_id)
        .bind(&entry.meta.server_id)
        .bind(&entry.meta.owner_id)
        .bind(&entry.entry_date)
        .bind(entry.mood_score)
        .bind(entry.craving_score)
        .bind(&entry.notes)
        .bind(&gratitudes)
        .bind(entry.meta.created_at)
        .bind(entry.meta.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_date(&self, owner_id: &str, entry_date: &str) -> Result<Option<DailyEntry>> {
        let row = query_as::<_, DailyEntryRow>(
            "SELECT * FROM daily_entries \
             WHERE owner_id = ? AND entry_date = ? AND deleted_at IS NULL",
        )
        .bind(owner_id)
        .bind(entry_date)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DailyEntry::try_from).transpose()
    }

    async fn find_by_id(&self, local_id: &str) -> Result<Option<DailyEntry>> {
        let row = query_as::<_, DailyEntryRow>(
            "SELECT * FROM daily_entries WHERE local_id = ? AND deleted_at IS NULL",
        )
        .bind(local_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DailyEntry::try_from).transpose()
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<DailyEntry>> {
        let rows = query_as::<_, DailyEntryRow>(
            "SELECT * FROM daily_entries \
             WHERE owner_id = ? AND deleted_at IS NULL \
             ORDER BY entry_date DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DailyEntry::try_from).collect()
    }

    async fn list_pending(&self, owner_id: &str) -> Result<Vec<DailyEntry>> {
        let rows = query_as::<_, DailyEntryRow>(
            "SELECT * FROM daily_entries \
             WHERE owner_id = ? AND sync_status = 'pending' AND deleted_at IS NULL \
             ORDER BY created_at ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DailyEntry::try_from).collect()
    }

    async fn delete(&self, owner_id: &str, local_id: &str) -> Result<bool> {
        let now = self.clock.unix_timestamp_millis();
        let mut tx = self.pool.begin().await?;

        // Never-synced rows have nothing to delete remotely
        let removed = query(
            "DELETE FROM daily_entries \
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
            "UPDATE daily_entries \
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

    async fn apply_remote(&self, entry: &DailyEntry) -> Result<()> {
        let server_id = entry.meta.server_id.as_deref().ok_or_else(|| {
            StoreError::InvalidData {
                column: "server_id".to_string(),
                message: "pulled record is missing its remote id".to_string(),
            }
        })?;
        let gratitudes = serde_json::to_string(&entry.gratitudes)?;
        let now = self.clock.unix_timestamp_millis();

        sqlx::query(
            r#"
            INSERT INTO daily_entries (
                local_id, server_id, owner_id, entry_date,
                mood_score, craving_score, notes, gratitudes,
                sync_status, synced_at, created_at, updated_at, retry_count, deleted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'synced', ?, ?, ?, 0, NULL)
            ON CONFLICT(owner_id, entry_date) DO UPDATE SET
                server_id = excluded.server_id,
                mood_score = excluded.mood_score,
                craving_score = excluded.craving_score,
                notes = excluded.notes,
                gratitudes = excluded.gratitudes,
                sync_status = 'synced',
                synced_at = excluded.synced_at,
                updated_at = excluded.updated_at,
                retry_count = 0
            WHERE daily_entries.sync_status NOT IN ('pending', 'syncing')
              AND daily_entries.deleted_at IS NULL
            ON CONFLICT(local_id) DO UPDATE SET
                server_id = excluded.server_id,
                mood_score = excluded.mood_score,
                craving_score = excluded.craving_score,
                notes = excluded.notes,
                gratitudes = excluded.gratitudes,
                sync_status = 'synced',
                synced_at = excluded.synced_at,
                updated_at = excluded.updated_at,
                retry_count = 0
            WHERE daily_entries.sync_status NOT IN ('pending', 'syncing')
              AND daily_entries.deleted_at IS NULL
            "#,
        )
        .bind(server_id)
        .bind(server_id)
        .bind(&entry.meta.owner_id)
        .bind(&entry.entry_date)
        .bind(entry.mood_score)
        .bind(entry.craving_score)
        .bind(&entry.notes)
        .bind(&gratitudes)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
