//! Entity models and sync metadata for the local store.
//!
//! Every model embeds [`SyncMeta`]: the storage identity (`local_id`), the
//! remote identity (`server_id`), and the per-record sync-state machine
//! (`sync_status`). Collection-valued fields (`gratitudes`, `steps`,
//! `weekdays`) are native `Vec`s here; they are serialized to JSON text only
//! at the repository boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// Sync Status
// =============================================================================

/// Per-record sync state. Governs eligibility for the push phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Local changes not yet confirmed on the remote store
    Pending,
    /// Currently being uploaded by a push phase
    Syncing,
    /// Round-tripped successfully; `server_id` and `synced_at` are set
    Synced,
    /// Last push attempt failed; retried on a later cycle
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Synced => "synced",
            SyncStatus::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "syncing" => Ok(SyncStatus::Syncing),
            "synced" => Ok(SyncStatus::Synced),
            "error" => Ok(SyncStatus::Error),
            other => Err(format!("unknown sync status: {other}")),
        }
    }
}

// =============================================================================
// Entity Kind
// =============================================================================

/// Tag identifying an entity table.
///
/// [`EntityKind::ALL`] lists the kinds in push priority order: the entity the
/// user most directly depends on (daily check-ins) comes first, secondary
/// entities later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    DailyEntry,
    StepEntry,
    ActionPlan,
    Routine,
    TriggerLocation,
    DeviceToken,
}

impl EntityKind {
    /// All kinds, in push priority order.
    pub const ALL: [EntityKind; 6] = [
        EntityKind::DailyEntry,
        EntityKind::StepEntry,
        EntityKind::ActionPlan,
        EntityKind::Routine,
        EntityKind::TriggerLocation,
        EntityKind::DeviceToken,
    ];

    /// The backing table name.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::DailyEntry => "daily_entries",
            EntityKind::StepEntry => "step_entries",
            EntityKind::ActionPlan => "action_plans",
            EntityKind::Routine => "routines",
            EntityKind::TriggerLocation => "trigger_locations",
            EntityKind::DeviceToken => "device_tokens",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::DailyEntry => "daily_entry",
            EntityKind::StepEntry => "step_entry",
            EntityKind::ActionPlan => "action_plan",
            EntityKind::Routine => "routine",
            EntityKind::TriggerLocation => "trigger_location",
            EntityKind::DeviceToken => "device_token",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily_entry" => Ok(EntityKind::DailyEntry),
            "step_entry" => Ok(EntityKind::StepEntry),
            "action_plan" => Ok(EntityKind::ActionPlan),
            "routine" => Ok(EntityKind::Routine),
            "trigger_location" => Ok(EntityKind::TriggerLocation),
            "device_token" => Ok(EntityKind::DeviceToken),
            other => Err(format!("unknown entity kind: {other}")),
        }
    }
}

// =============================================================================
// Sync Metadata
// =============================================================================

/// Sync metadata shared by every entity model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMeta {
    /// Local store primary key. A server-issued id once synced, or a
    /// `temp_*` id before the first successful push. Never changes after
    /// creation so UI references keep resolving.
    pub local_id: String,
    /// Remote-assigned identifier, set once the row round-trips a push.
    pub server_id: Option<String>,
    /// The authenticated user this record belongs to.
    pub owner_id: String,
    /// Per-record sync state.
    pub sync_status: SyncStatus,
    /// Unix ms of the last successful reconciliation.
    pub synced_at: Option<i64>,
    /// Unix ms, set locally at creation.
    pub created_at: i64,
    /// Unix ms, maintained locally.
    pub updated_at: i64,
    /// Consecutive push failures; reset to zero on success.
    pub retry_count: i64,
    /// Tombstone marker: set when a synced row is deleted locally and its
    /// remote delete has not yet been pushed.
    pub deleted_at: Option<i64>,
}

impl SyncMeta {
    /// Metadata for a freshly created local record: `pending` status and a
    /// temporary identifier of the form `temp_<unix-millis>_<8-hex>`.
    pub fn new_local(owner_id: impl Into<String>, now_ms: i64) -> Self {
        Self {
            local_id: generate_temp_id(now_ms),
            server_id: None,
            owner_id: owner_id.into(),
            sync_status: SyncStatus::Pending,
            synced_at: None,
            created_at: now_ms,
            updated_at: now_ms,
            retry_count: 0,
            deleted_at: None,
        }
    }

    /// Metadata for a record applied from a pull: `synced` status, local id
    /// equal to the remote id.
    pub fn from_remote(owner_id: impl Into<String>, server_id: impl Into<String>) -> Self {
        let server_id = server_id.into();
        Self {
            local_id: server_id.clone(),
            server_id: Some(server_id),
            owner_id: owner_id.into(),
            sync_status: SyncStatus::Synced,
            synced_at: None,
            created_at: 0,
            updated_at: 0,
            retry_count: 0,
            deleted_at: None,
        }
    }

    /// True if the row is a tombstone awaiting a remote delete.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Generate a temporary local identifier: `temp_<unix-millis>_<8-hex>`.
pub fn generate_temp_id(now_ms: i64) -> String {
    let suffix = &Uuid::new_v4().simple().to_string()[..8];
    format!("temp_{now_ms}_{suffix}")
}

// =============================================================================
// Entity Models
// =============================================================================

/// One daily check-in per user per calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyEntry {
    #[serde(flatten)]
    pub meta: SyncMeta,
    /// Calendar date (ISO 8601, e.g. "2024-01-26"). Natural key with owner.
    pub entry_date: String,
    pub mood_score: Option<i64>,
    pub craving_score: Option<i64>,
    pub notes: Option<String>,
    pub gratitudes: Vec<String>,
}

/// One step-work entry per user per program step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEntry {
    #[serde(flatten)]
    pub meta: SyncMeta,
    /// Program step number. Natural key with owner.
    pub step_number: i64,
    pub reflection: Option<String>,
    pub completed: bool,
}

/// A coping/action plan with ordered steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    #[serde(flatten)]
    pub meta: SyncMeta,
    pub title: String,
    pub situation: Option<String>,
    pub steps: Vec<String>,
    pub is_active: bool,
}

/// A recurring routine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Routine {
    #[serde(flatten)]
    pub meta: SyncMeta,
    pub name: String,
    /// Time of day (e.g. "08:30").
    pub time_of_day: Option<String>,
    /// Weekday tags (e.g. "mon", "tue").
    pub weekdays: Vec<String>,
    pub enabled: bool,
}

/// A geofenced trigger location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerLocation {
    #[serde(flatten)]
    pub meta: SyncMeta,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
}

/// A push-notification device token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceToken {
    #[serde(flatten)]
    pub meta: SyncMeta,
    /// Opaque platform token. Natural key with owner.
    pub token: String,
    /// Platform tag (e.g. "ios", "android").
    pub platform: String,
}

// =============================================================================
// Pending Index
// =============================================================================

/// The operation a pending row needs pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingOp {
    /// Create or update, depending on whether a `server_id` exists.
    Upsert,
    /// Remote delete of a tombstoned row.
    Delete,
}

/// One entry in the push worklist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRecord {
    pub kind: EntityKind,
    pub local_id: String,
    pub server_id: Option<String>,
    pub created_at: i64,
    pub op: PendingOp,
}

/// Filter applied when collecting the pending index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingMode {
    /// Scheduled cycle: rows in `error` whose retry count has reached the
    /// cap are excluded.
    Scheduled { max_retries: i64 },
    /// Forced cycle ("sync now", reconnect, foreground): everything eligible
    /// is included, capped rows too.
    Forced,
}

// =============================================================================
// Tests
// =============================================================================
