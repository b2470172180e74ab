//! Device token repository.

use crate::error::{Result, StoreError};
use crate::models::{DeviceToken, SyncMeta, SyncStatus};
use async_trait::async_trait;
use bridge_traits::Clock;
use sqlx::{query, query_as, FromRow, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Device token data access. One row per `(owner_id, token)`.
#[async_trait]
pub trait DeviceTokenRepository: Send + Sync {
    /// Insert or replace; always resets the row to `pending`.
    async fn upsert(&self, token: &DeviceToken) -> Result<()>;

    /// Point lookup by local id. `Ok(None)` when absent.
    async fn find_by_id(&self, local_id: &str) -> Result<Option<DeviceToken>>;

    /// All live tokens for a user.
    async fn list(&self, owner_id: &str) -> Result<Vec<DeviceToken>>;

    /// Tokens awaiting upload, oldest first.
    async fn list_pending(&self, owner_id: &str) -> Result<Vec<DeviceToken>>;

    /// Delete: immediate removal if never synced, tombstone otherwise.
    async fn delete(&self, owner_id: &str, local_id: &str) -> Result<bool>;

    /// Pull-side upsert; pending-wins-over-pull enforced in SQL.
    async fn apply_remote(&self, token: &DeviceToken) -> Result<()>;
}

#[derive(Debug, FromRow)]
struct DeviceTokenRow {
    local_id: String,
    server_id: Option<String>,
    owner_id: String,
    token: String,
    platform: String,
    sync_status: String,
    synced_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
    retry_count: i64,
    deleted_at: Option<i64>,
}

impl TryFrom<DeviceTokenRow> for DeviceToken {
    type Error = StoreError;

    fn try_from(row: DeviceTokenRow) -> Result<Self> {
        let sync_status =
            SyncStatus::from_str(&row.sync_status).map_err(|message| StoreError::InvalidData {
                column: "sync_status".to_string(),
                message,
            })?;

        Ok(DeviceToken {
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
            token: row.token,
            platform: row.platform,
        })
    }
}

/// SQLite implementation of [`DeviceTokenRepository`].
pub struct SqliteDeviceTokenRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteDeviceTokenRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl DeviceTokenRepository for SqliteDeviceTokenRepository {
    async fn upsert(&self, token: &DeviceToken) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO device_tokens (
                local_id, server_id, owner_id, token, platform,
                sync_status, synced_at, created_at, updated_at, retry_count, deleted_at
            ) VALUES (?, ?, ?, ?, ?, 'pending', NULL, ?, ?, 0, NULL)
            ON CONFLICT(owner_id, token) DO UPDATE SET
                platform = excluded.platform,
                sync_status = 'pending',
                synced_at = NULL,
                updated_at = excluded.updated_at,
                deleted_at = NULL
            ON CONFLICT(local_id) DO UPDATE SET
                token = excluded.token,
                platform = excluded.platform,
                sync_status = 'pending',
                synced_at = NULL,
                updated_at = excluded.updated_at,
                deleted_at = NULL
            "#,
        )
        .bind(&token.meta.local_id)
        .bind(&token.meta.server_id)
        .bind(&token.meta.owner_id)
        .bind(&token.token)
        .bind(&token.platform)
        .bind(token.meta.created_at)
        .bind(token.meta.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, local_id: &str) -> Result<Option<DeviceToken>> {
        let row = query_as::<_, DeviceTokenRow>(
            "SELECT * FROM device_tokens WHERE local_id = ? AND deleted_at IS NULL",
        )
        .bind(local_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DeviceToken::try_from).transpose()
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<DeviceToken>> {
        let rows = query_as::<_, DeviceTokenRow>(
            "SELECT * FROM device_tokens \
             WHERE owner_id = ? AND deleted_at IS NULL \
             ORDER BY created_at ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DeviceToken::try_from).collect()
    }

    async fn list_pending(&self, owner_id: &str) -> Result<Vec<DeviceToken>> {
        let rows = query_as::<_, DeviceTokenRow>(
            "SELECT * FROM device_tokens \
             WHERE owner_id = ? AND sync_status = 'pending' AND deleted_at IS NULL \
             ORDER BY created_at ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DeviceToken::try_from).collect()
    }

    async fn delete(&self, owner_id: &str, local_id: &str) -> Result<bool> {
        let now = self.clock.unix_timestamp_millis();
        let mut tx = self.pool.begin().await?;

        let removed = query(
            "DELETE FROM device_tokens \
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
            "UPDATE device_tokens \
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

    async fn apply_remote(&self, token: &DeviceToken) -> Result<()> {
        let server_id = token.meta.server_id.as_deref().ok_or_else(|| {
            StoreError::InvalidData {
                column: "server_id".to_string(),
                message: "pulled record is missing its remote id".to_string(),
            }
        })?;
        let now = self.clock.unix_timestamp_millis();

        sqlx::query(
            r#"
            INSERT INTO device_tokens (
                local_id, server_id, owner_id, token, platform,
                sync_status, synced_at, created_at, updated_at, retry_count, deleted_at
            ) VALUES (?, ?, ?, ?, ?, 'synced', ?, ?, ?, 0, NULL)
            ON CONFLICT(owner_id, token) DO UPDATE SET
                server_id = excluded.server_id,
                platform = excluded.platform,
                sync_status = 'synced',
                synced_at = excluded.synced_at,
                updated_at = excluded.updated_at,
                retry_count = 0
            WHERE device_tokens.sync_status NOT IN ('pending', 'syncing')
              AND device_tokens.deleted_at IS NULL
            ON CONFLICT(local_id) DO UPDATE SET
                server_id = excluded.server_id,
                token = excluded.token,
                platform = excluded.platform,
                sync_status = 'synced',
                synced_at = excluded.synced_at,
                updated_at = excluded.updated_at,
                retry_count = 0
            WHERE device_tokens.sync_status NOT IN ('pending', 'syncing')
              AND device_tokens.deleted_at IS NULL
            "#,
        )
        .bind(server_id)
        .bind(server_id)
        .bind(&token.meta.owner_id)
        .bind(&token.token)
        .bind(&token.platform)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
