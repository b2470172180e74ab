//! Repository layer: one trait + SQLite implementation per entity table.
//!
//! Repositories are pure storage accessors; no network calls originate here.
//! Each one exposes the UI write path (`upsert`, `delete`), point lookups and
//! listings, and the pull-side `apply_remote` that enforces the
//! pending-wins-over-pull conflict policy in SQL.

pub mod action_plan;
pub mod daily_entry;
pub mod device_token;
pub mod routine;
pub mod step_entry;
pub mod trigger_location;

pub use action_plan::{ActionPlanRepository, SqliteActionPlanRepository};
pub use daily_entry::{DailyEntryRepository, SqliteDailyEntryRepository};
pub use device_token::{DeviceTokenRepository, SqliteDeviceTokenRepository};
pub use routine::{RoutineRepository, SqliteRoutineRepository};
pub use step_entry::{SqliteStepEntryRepository, StepEntryRepository};
pub use trigger_location::{SqliteTriggerLocationRepository, TriggerLocationRepository};
