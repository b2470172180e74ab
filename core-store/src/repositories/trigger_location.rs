//! Trigger location repository.

use crate::error::{Result, StoreError};
use crate::models::{SyncMeta, SyncStatus, TriggerLocation};
use async_trait::async_trait;
use bridge_traits::Clock;
use sqlx::{query, query_as, FromRow, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Trigger location data access. Keyed by local id; pulled records are
/// matched by `server_id`.
#[async_trait]
pub trait TriggerLocationRepository: Send + Sync {
    /// Insert or replace by local id; always resets the row to `pending`.
    async fn upsert(&self, location: &TriggerLocation) -> Result<()>;

    /// Point lookup by local id. `Ok(None)` when absent.
    async fn find_by_id(&self, local_id: &str) -> Result<Option<TriggerLocation>>;

    /// All live locations for a user.
    async fn list(&self, owner_id: &str) -> Result<Vec<TriggerLocation>>;

    /// Locations awaiting upload, oldest first.
    async fn list_pending(&self, owner_id: &str) -> Result<Vec<TriggerLocation>>;

    /// Delete: immediate removal if never synced, tombstone otherwise.
    async fn delete(&self, owner_id: &str, local_id: &str) -> Result<bool>;

    /// Pull-side upsert; pending-wins-over-pull enforced in SQL.
    async fn apply_remote(&self, location: &TriggerLocation) -> Result<()>;
}

#[derive(Debug, FromRow)]
struct TriggerLocationRow {
    local_id: String,
    server_id: Option<String>,
    owner_id: String,
    name: String,
    latitude: f64,
    longitude: f64,
    radius_meters: f64,
    sync_status: String,
    synced_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
    retry_count: i64,
    deleted_at: Option<i64>,
}

impl TryFrom<TriggerLocationRow> for TriggerLocation {
    type Error = StoreError;

    fn try_from(row: TriggerLocationRow) -> Result<Self> {
        let sync_status =
            SyncStatus::from_str(&row.sync_status).map_err(|message| StoreError::InvalidData {
                column: "sync_status".to_string(),
                message,
            })?;

        Ok(TriggerLocation {
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
            latitude: row.latitude,
            longitude: row.longitude,
            radius_meters: row.radius_meters,
        })
    }
}

/// SQLite implementation of [`TriggerLocationRepository`].
pub struct SqliteTriggerLocationRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteTriggerLocationRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl TriggerLocationRepository for SqliteTriggerLocationRepository {
    async fn upsert(&self, location: &TriggerLocation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trigger_locations (
                local_id, server_id, owner_id, name, latitude, longitude, radius_meters,
                sync_status, synced_at, created_at, updated_at, retry_count, deleted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', NULL, ?, ?, 0, NULL)
            ON CONFLICT(local_id) DO UPDATE SET
                name = excluded.name,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                radius_meters = excluded.radius_meters,
                sync_status = 'pending',
                synced_at = NULL,
                updated_at = excluded.updated_at,
                deleted_at = NULL
            "#,
        )
        .bind(&location.meta.local_id)
        .bind(&location.meta.server_id)
        .bind(&location.meta.owner_id)
        .bind(&location.name)
        .bind(location.latitude)
        .bind(location.longitude)
        .bind(location.radius_meters)
        .bind(location.meta.created_at)
        .bind(location.meta.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, local_id: &str) -> Result<Option<TriggerLocation>> {
        let row = query_as::<_, TriggerLocationRow>(
            "SELECT * FROM trigger_locations WHERE local_id = ? AND deleted_at IS NULL",
        )
        .bind(local_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TriggerLocation::try_from).transpose()
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<TriggerLocation>> {
        let rows = query_as::<_, TriggerLocationRow>(
            "SELECT * FROM trigger_locations \
             WHERE owner_id = ? AND deleted_at IS NULL \
             ORDER BY name ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TriggerLocation::try_from).collect()
    }

    async fn list_pending(&self, owner_id: &str) -> Result<Vec<TriggerLocation>> {
        let rows = query_as::<_, TriggerLocationRow>(
            "SELECT * FROM trigger_locations \
             WHERE owner_id = ? AND sync_status = 'pending' AND deleted_at IS NULL \
             ORDER BY created_at ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TriggerLocation::try_from).collect()
    }

    async fn delete(&self, owner_id: &str, local_id: &str) -> Result<bool> {
        let now = self.clock.unix_timestamp_millis();
        let mut tx = self.pool.begin().await?;

        let removed = query(
            "DELETE FROM trigger_locations \
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
            "UPDATE trigger_locations \
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

    async fn apply_remote(&self, location: &TriggerLocation) -> Result<()> {
        let server_id = location.meta.server_id.as_deref().ok_or_else(|| {
            StoreError::InvalidData {
                column: "server_id".to_string(),
                message: "pulled record is missing its remote id".to_string(),
            }
        })?;
        let now = self.clock.unix_timestamp_millis();

        sqlx::query(
            r#"
            INSERT INTO trigger_locations (
                local_id, server_id, owner_id, name, latitude, longitude, radius_meters,
                sync_status, synced_at, created_at, updated_at, retry_count, deleted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 'synced', ?, ?, ?, 0, NULL)
            ON CONFLICT(server_id) WHERE server_id IS NOT NULL DO UPDATE SET
                name = excluded.name,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                radius_meters = excluded.radius_meters,
                sync_status = 'synced',
                synced_at = excluded.synced_at,
                updated_at = excluded.updated_at,
                retry_count = 0
            WHERE trigger_locations.sync_status NOT IN ('pending', 'syncing')
              AND trigger_locations.deleted_at IS NULL
            ON CONFLICT(local_id) DO UPDATE SET
                server_id = excluded.server_id,
                name = excluded.name,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                radius_meters = excluded.radius_meters,
                sync_status = 'synced',
                synced_at = excluded.synced_at,
                updated_at = excluded.updated_at,
                retry_count = 0
            WHERE trigger_locations.sync_status NOT IN ('pending', 'syncing')
              AND trigger_locations.deleted_at IS NULL
            "#,
        )
        .bind(server_id)
        .bind(server_id)
        .bind(&location.meta.owner_id)
        .bind(&location.name)
        .bind(location.latitude)
        .bind(location.longitude)
        .bind(location.radius_meters)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
