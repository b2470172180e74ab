//! Action plan repository.

use crate::error::{Result, StoreError};
use crate::models::{ActionPlan, SyncMeta, SyncStatus};
use async_trait::async_trait;
use bridge_traits::Clock;
use sqlx::{query, query_as, FromRow, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Action plan data access. Keyed by local id; pulled records are matched
/// against the local mirror by `server_id`.
#[async_trait]
pub trait ActionPlanRepository: Send + Sync {
    /// Insert or replace by local id; always resets the row to `pending`.
    async fn upsert(&self, plan: &ActionPlan) -> Result<()>;

    /// Point lookup by local id. `Ok(None)` when absent.
    async fn find_by_id(&self, local_id: &str) -> Result<Option<ActionPlan>>;

    /// All live plans for a user, newest first.
    async fn list(&self, owner_id: &str) -> Result<Vec<ActionPlan>>;

    /// Plans awaiting upload, oldest first.
    async fn list_pending(&self, owner_id: &str) -> Result<Vec<ActionPlan>>;

    /// Delete: immediate removal if never synced, tombstone otherwise.
    async fn delete(&self, owner_id: &str, local_id: &str) -> Result<bool>;

    /// Pull-side upsert; pending-wins-over-pull enforced in SQL.
    async fn apply_remote(&self, plan: &ActionPlan) -> Result<()>;
}

#[derive(Debug, FromRow)]
struct ActionPlanRow {
    local_id: String,
    server_id: Option<String>,
    owner_id: String,
    title: String,
    situation: Option<String>,
    steps: String,
    is_active: i64,
    sync_status: String,
    synced_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
    retry_count: i64,
    deleted_at: Option<i64>,
}

impl TryFrom<ActionPlanRow> for ActionPlan {
    type Error = StoreError;

    fn try_from(row: ActionPlanRow) -> Result<Self> {
        let sync_status =
            SyncStatus::from_str(&row.sync_status).map_err(|message| StoreError::InvalidData {
                column: "sync_status".to_string(),
                message,
            })?;

        Ok(ActionPlan {
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
            title: row.title,
            situation: row.situation,
            steps: serde_json::from_str(&row.steps)?,
            is_active: row.is_active != 0,
        })
    }
}

/// SQLite implementation of [`ActionPlanRepository`].
pub struct SqliteActionPlanRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteActionPlanRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl ActionPlanRepository for SqliteActionPlanRepository {
    async fn upsert(&self, plan: &ActionPlan) -> Result<()> {
        let steps = serde_json::to_string(&plan.steps)?;

        sqlx::query(
            r#"
            INSERT INTO action_plans (
                local_id, server_id, owner_id, title, situation, steps, is_active,
                sync_status, synced_at, created_at, updated_at, retry_count, deleted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', NULL, ?, ?, 0, NULL)
            ON CONFLICT(local_id) DO UPDATE SET
                title = excluded.title,
                situation = excluded.situation,
                steps = excluded.steps,
                is_active = excluded.is_active,
                sync_status = 'pending',
                synced_at = NULL,
                updated_at = excluded.updated_at,
                deleted_at = NULL
            "#,
        )
        .bind(&plan.meta.local_id)
        .bind(&plan.meta.server_id)
        .bind(&plan.meta.owner_id)
        .bind(&plan.title)
        .bind(&plan.situation)
        .bind(&steps)
        .bind(plan.is_active)
        .bind(plan.meta.created_at)
        .bind(plan.meta.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, local_id: &str) -> Result<Option<ActionPlan>> {
        let row = query_as::<_, ActionPlanRow>(
            "SELECT * FROM action_plans WHERE local_id = ? AND deleted_at IS NULL",
        )
        .bind(local_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ActionPlan::try_from).transpose()
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<ActionPlan>> {
        let rows = query_as::<_, ActionPlanRow>(
            "SELECT * FROM action_plans \
             WHERE owner_id = ? AND deleted_at IS NULL \
             ORDER BY created_at DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ActionPlan::try_from).collect()
    }

    async fn list_pending(&self, owner_id: &str) -> Result<Vec<ActionPlan>> {
        let rows = query_as::<_, ActionPlanRow>(
            "SELECT * FROM action_plans \
             WHERE owner_id = ? AND sync_status = 'pending' AND deleted_at IS NULL \
             ORDER BY created_at ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ActionPlan::try_from).collect()
    }

    async fn delete(&self, owner_id: &str, local_id: &str) -> Result<bool> {
        let now = self.clock.unix_timestamp_millis();
        let mut tx = self.pool.begin().await?;

        let removed = query(
            "DELETE FROM action_plans \
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
            "UPDATE action_plans \
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

    async fn apply_remote(&self, plan: &ActionPlan) -> Result<()> {
        let server_id = plan.meta.server_id.as_deref().ok_or_else(|| {
            StoreError::InvalidData {
                column: "server_id".to_string(),
                message: "pulled record is missing its remote id".to_string(),
            }
        })?;
        let steps = serde_json::to_string(&plan.steps)?;
        let now = self.clock.unix_timestamp_millis();

        sqlx::query(
            r#"
            INSERT INTO action_plans (
                local_id, server_id, owner_id, title, situation, steps, is_active,
                sync_status, synced_at, created_at, updated_at, retry_count, deleted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 'synced', ?, ?, ?, 0, NULL)
            ON CONFLICT(server_id) WHERE server_id IS NOT NULL DO UPDATE SET
                title = excluded.title,
                situation = excluded.situation,
                steps = excluded.steps,
                is_active = excluded.is_active,
                sync_status = 'synced',
                synced_at = excluded.synced_at,
                updated_at = excluded.updated_at,
                retry_count = 0
            WHERE action_plans.sync_status NOT IN ('pending', 'syncing')
              AND action_plans.deleted_at IS NULL
            ON CONFLICT(local_id) DO UPDATE SET
                server_id = excluded.server_id,
                title = excluded.title,
                situation = excluded.situation,
                steps = excluded.steps,
                is_active = excluded.is_active,
                sync_status = 'synced',
                synced_at = excluded.synced_at,
                updated_at = excluded.updated_at,
                retry_count = 0
            WHERE action_plans.sync_status NOT IN ('pending', 'syncing')
              AND action_plans.deleted_at IS NULL
            "#,
        )
        .bind(server_id)
        .bind(server_id)
        .bind(&plan.meta.owner_id)
        .bind(&plan.title)
        .bind(&plan.situation)
        .bind(&steps)
        .bind(plan.is_active)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
