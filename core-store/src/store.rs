//! # Local Store Facade
//!
//! [`LocalStore`] owns the connection pool and exposes two surfaces:
//!
//! - typed repository accessors for the UI write/read path, and
//! - the entity-agnostic operations the reconciliation engine drives: the
//!   status transitions (`mark_syncing` / `mark_synced` / `mark_error`),
//!   physical removal (`remove`), and the Pending Index (`collect_pending`).
//!
//! Status transitions are single atomic UPDATEs and idempotent: re-applying
//! a transition that already happened is a no-op, not an error. Table names
//! are interpolated from [`EntityKind::table`] only, never from input.

use crate::error::{Result, StoreError};
use crate::models::{EntityKind, PendingMode, PendingOp, PendingRecord};
use crate::repositories::{
    SqliteActionPlanRepository, SqliteDailyEntryRepository, SqliteDeviceTokenRepository,
    SqliteRoutineRepository, SqliteStepEntryRepository, SqliteTriggerLocationRepository,
};
use bridge_traits::Clock;
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use tracing::debug;

/// Durable, queryable mirror of entity state, independent of network state.
#[derive(Clone)]
pub struct LocalStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    daily_entries: Arc<SqliteDailyEntryRepository>,
    step_entries: Arc<SqliteStepEntryRepository>,
    action_plans: Arc<SqliteActionPlanRepository>,
    routines: Arc<SqliteRoutineRepository>,
    trigger_locations: Arc<SqliteTriggerLocationRepository>,
    device_tokens: Arc<SqliteDeviceTokenRepository>,
}

impl LocalStore {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self {
            daily_entries: Arc::new(SqliteDailyEntryRepository::new(
                pool.clone(),
                clock.clone(),
            )),
            step_entries: Arc::new(SqliteStepEntryRepository::new(pool.clone(), clock.clone())),
            action_plans: Arc::new(SqliteActionPlanRepository::new(pool.clone(), clock.clone())),
            routines: Arc::new(SqliteRoutineRepository::new(pool.clone(), clock.clone())),
            trigger_locations: Arc::new(SqliteTriggerLocationRepository::new(
                pool.clone(),
                clock.clone(),
            )),
            device_tokens: Arc::new(SqliteDeviceTokenRepository::new(
                pool.clone(),
                clock.clone(),
            )),
            pool,
            clock,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Repository accessors
    // =========================================================================

    pub fn daily_entries(&self) -> Arc<SqliteDailyEntryRepository> {
        self.daily_entries.clone()
    }

    pub fn step_entries(&self) -> Arc<SqliteStepEntryRepository> {
        self.step_entries.clone()
    }

    pub fn action_plans(&self) -> Arc<SqliteActionPlanRepository> {
        self.action_plans.clone()
    }

    pub fn routines(&self) -> Arc<SqliteRoutineRepository> {
        self.routines.clone()
    }

    pub fn trigger_locations(&self) -> Arc<SqliteTriggerLocationRepository> {
        self.trigger_locations.clone()
    }

    pub fn device_tokens(&self) -> Arc<SqliteDeviceTokenRepository> {
        self.device_tokens.clone()
    }

    // =========================================================================
    // Status transitions (push phase)
    // =========================================================================

    /// Transition a row to `syncing` ahead of its upload.
    ///
    /// Only `pending`/`error` rows transition; anything else is a no-op.
    pub async fn mark_syncing(&self, kind: EntityKind, local_id: &str) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET sync_status = 'syncing', updated_at = ? \
             WHERE local_id = ? AND sync_status IN ('pending', 'error')",
            kind.table()
        );

        sqlx::query(&sql)
            .bind(self.clock.unix_timestamp_millis())
            .bind(local_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Record a successful round-trip.
    ///
    /// The remote id is stored unconditionally; the status only transitions
    /// from `syncing`, so a UI edit that demoted the row to `pending`
    /// mid-upload is not clobbered and will be re-uploaded.
    pub async fn mark_synced(
        &self,
        kind: EntityKind,
        local_id: &str,
        server_id: &str,
    ) -> Result<()> {
        if server_id.is_empty() {
            return Err(StoreError::InvalidData {
                column: "server_id".to_string(),
                message: "a synced row must carry a non-empty remote id".to_string(),
            });
        }

        let now = self.clock.unix_timestamp_millis();
        let sql = format!(
            "UPDATE {} SET \
                server_id = ?, \
                sync_status = CASE WHEN sync_status = 'syncing' THEN 'synced' ELSE sync_status END, \
                synced_at = CASE WHEN sync_status = 'syncing' THEN ? ELSE synced_at END, \
                retry_count = 0, \
                updated_at = ? \
             WHERE local_id = ?",
            kind.table()
        );

        sqlx::query(&sql)
            .bind(server_id)
            .bind(now)
            .bind(now)
            .bind(local_id)
            .execute(&self.pool)
            .await?;

        debug!(entity = %kind, local_id, server_id, "Record marked synced");
        Ok(())
    }

    /// Record a failed upload: `syncing` → `error`, retry count incremented.
    ///
    /// A row demoted to `pending` by a concurrent UI edit is left alone; it
    /// re-enters the pending index on its own.
    pub async fn mark_error(&self, kind: EntityKind, local_id: &str) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET sync_status = 'error', retry_count = retry_count + 1, updated_at = ? \
             WHERE local_id = ? AND sync_status = 'syncing'",
            kind.table()
        );

        sqlx::query(&sql)
            .bind(self.clock.unix_timestamp_millis())
            .bind(local_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Physically remove a row. Used after a tombstone's remote delete is
    /// confirmed.
    pub async fn remove(&self, kind: EntityKind, local_id: &str) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE local_id = ?", kind.table());

        sqlx::query(&sql).bind(local_id).execute(&self.pool).await?;

        Ok(())
    }

    // =========================================================================
    // Pending Index
    // =========================================================================

    /// Collect the push worklist: every row awaiting upload across all entity
    /// tables, ordered by entity priority then `created_at` FIFO within a
    /// type, so a user's earliest unsynced action is not starved.
    ///
    /// Rows in `pending` or `error` are eligible. Under
    /// [`PendingMode::Scheduled`], `error` rows whose retry count has reached
    /// the cap are excluded; [`PendingMode::Forced`] includes them.
    pub async fn collect_pending(
        &self,
        owner_id: &str,
        mode: PendingMode,
    ) -> Result<Vec<PendingRecord>> {
        #[derive(FromRow)]
        struct PendingRow {
            local_id: String,
            server_id: Option<String>,
            created_at: i64,
            deleted_at: Option<i64>,
        }

        let mut records = Vec::new();

        for kind in EntityKind::ALL {
            let sql = match mode {
                PendingMode::Scheduled { .. } => format!(
                    "SELECT local_id, server_id, created_at, deleted_at FROM {} \
                     WHERE owner_id = ? \
                       AND (sync_status = 'pending' \
                            OR (sync_status = 'error' AND retry_count < ?)) \
                     ORDER BY created_at ASC",
                    kind.table()
                ),
                PendingMode::Forced => format!(
                    "SELECT local_id, server_id, created_at, deleted_at FROM {} \
                     WHERE owner_id = ? AND sync_status IN ('pending', 'error') \
                     ORDER BY created_at ASC",
                    kind.table()
                ),
            };

            let mut query = sqlx::query_as::<_, PendingRow>(&sql).bind(owner_id);
            if let PendingMode::Scheduled { max_retries } = mode {
                query = query.bind(max_retries);
            }

            let rows = query.fetch_all(&self.pool).await?;
            records.extend(rows.into_iter().map(|row| PendingRecord {
                kind,
                local_id: row.local_id,
                server_id: row.server_id,
                created_at: row.created_at,
                op: if row.deleted_at.is_some() {
                    PendingOp::Delete
                } else {
                    PendingOp::Upsert
                },
            }));
        }

        debug!(owner_id, count = records.len(), "Collected pending index");
        Ok(records)
    }
}
