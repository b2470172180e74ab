//! # Core Store
//!
//! The Local Store: an embedded SQLite mirror of user-owned records that
//! keeps the app fully usable offline. One table per entity type; every row
//! carries its business fields plus sync metadata (`sync_status`,
//! `server_id`, `synced_at`), so pending work is always derived live from
//! row status instead of a separate queue.
//!
//! This crate is pure storage: no network calls originate here. The
//! reconciliation engine drives the status transitions and the Pending
//! Index through the [`LocalStore`](store::LocalStore) facade; the UI reads
//! and writes through the typed repositories.

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;
pub mod store;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{Result, StoreError};
pub use models::{
    ActionPlan, DailyEntry, DeviceToken, EntityKind, PendingMode, PendingOp, PendingRecord,
    Routine, StepEntry, SyncMeta, SyncStatus, TriggerLocation,
};
pub use store::LocalStore;
