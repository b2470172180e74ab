//! Per-entity translators between local rows and wire payloads.
//!
//! Wire payloads carry only business fields; sync metadata never crosses the
//! remote boundary. Pulled payloads are parsed leniently (missing optional
//! fields default) so a newer server schema does not break older clients.

use crate::error::Result;
use crate::registry::EntityTranslator;
use crate::remote::RemoteRecord;
use async_trait::async_trait;
use core_store::repositories::{
    ActionPlanRepository, DailyEntryRepository, DeviceTokenRepository, RoutineRepository,
    StepEntryRepository, TriggerLocationRepository,
};
use core_store::{
    ActionPlan, DailyEntry, DeviceToken, EntityKind, LocalStore, Routine, StepEntry, SyncMeta,
    TriggerLocation,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Translator instance for the given entity kind.
pub fn translator_for(kind: EntityKind) -> Arc<dyn EntityTranslator> {
    match kind {
        EntityKind::DailyEntry => Arc::new(DailyEntryTranslator),
        EntityKind::StepEntry => Arc::new(StepEntryTranslator),
        EntityKind::ActionPlan => Arc::new(ActionPlanTranslator),
        EntityKind::Routine => Arc::new(RoutineTranslator),
        EntityKind::TriggerLocation => Arc::new(TriggerLocationTranslator),
        EntityKind::DeviceToken => Arc::new(DeviceTokenTranslator),
    }
}

// =============================================================================
// Daily entries
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct DailyEntryPayload {
    entry_date: String,
    #[serde(default)]
    mood_score: Option<i64>,
    #[serde(default)]
    craving_score: Option<i64>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    gratitudes: Vec<String>,
}

pub struct DailyEntryTranslator;

#[async_trait]
impl EntityTranslator for DailyEntryTranslator {
    fn kind(&self) -> EntityKind {
        EntityKind::DailyEntry
    }

    async fn load_payload(&self, store: &LocalStore, local_id: &str) -> Result<Option<Value>> {
        let Some(entry) = store.daily_entries().find_by_id(local_id).await? else {
            return Ok(None);
        };

        let payload = DailyEntryPayload {
            entry_date: entry.entry_date,
            mood_score: entry.mood_score,
            craving_score: entry.craving_score,
            notes: entry.notes,
            gratitudes: entry.gratitudes,
        };
        Ok(Some(serde_json::to_value(payload)?))
    }

    async fn apply_remote(
        &self,
        store: &LocalStore,
        owner_id: &str,
        record: &RemoteRecord,
    ) -> Result<()> {
        let payload: DailyEntryPayload = serde_json::from_value(record.payload.clone())?;

        let entry = DailyEntry {
            meta: SyncMeta::from_remote(owner_id, &record.id),
            entry_date: payload.entry_date,
            mood_score: payload.mood_score,
            craving_score: payload.craving_score,
            notes: payload.notes,
            gratitudes: payload.gratitudes,
        };
        store.daily_entries().apply_remote(&entry).await?;
        Ok(())
    }
}

// =============================================================================
// Step entries
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct StepEntryPayload {
    step_number: i64,
    #[serde(default)]
    reflection: Option<String>,
    #[serde(default)]
    completed: bool,
}

pub struct StepEntryTranslator;

#[async_trait]
impl EntityTranslator for StepEntryTranslator {
    fn kind(&self) -> EntityKind {
        EntityKind::StepEntry
    }

    async fn load_payload(&self, store: &LocalStore, local_id: &str) -> Result<Option<Value>> {
        let Some(entry) = store.step_entries().find_by_id(local_id).await? else {
            return Ok(None);
        };

        let payload = StepEntryPayload {
            step_number: entry.step_number,
            reflection: entry.reflection,
            completed: entry.completed,
        };
        Ok(Some(serde_json::to_value(payload)?))
    }

    async fn apply_remote(
        &self,
        store: &LocalStore,
        owner_id: &str,
        record: &RemoteRecord,
    ) -> Result<()> {
        let payload: StepEntryPayload = serde_json::from_value(record.payload.clone())?;

        let entry = StepEntry {
            meta: SyncMeta::from_remote(owner_id, &record.id),
            step_number: payload.step_number,
            reflection: payload.reflection,
            completed: payload.completed,
        };
        store.step_entries().apply_remote(&entry).await?;
        Ok(())
    }
}

// =============================================================================
// Action plans
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct ActionPlanPayload {
    title: String,
    #[serde(default)]
    situation: Option<String>,
    #[serde(default)]
    steps: Vec<String>,
    #[serde(default = "default_true")]
    is_active: bool,
}

fn default_true() -> bool {
    true
}

pub struct ActionPlanTranslator;

#[async_trait]
impl EntityTranslator for ActionPlanTranslator {
    fn kind(&self) -> EntityKind {
        EntityKind::ActionPlan
    }

    async fn load_payload(&self, store: &LocalStore, local_id: &str) -> Result<Option<Value>> {
        let Some(plan) = store.action_plans().find_by_id(local_id).await? else {
            return Ok(None);
        };

        let payload = ActionPlanPayload {
            title: plan.title,
            situation: plan.situation,
            steps: plan.steps,
            is_active: plan.is_active,
        };
        Ok(Some(serde_json::to_value(payload)?))
    }

    async fn apply_remote(
        &self,
        store: &LocalStore,
        owner_id: &str,
        record: &RemoteRecord,
    ) -> Result<()> {
        let payload: ActionPlanPayload = serde_json::from_value(record.payload.clone())?;

        let plan = ActionPlan {
            meta: SyncMeta::from_remote(owner_id, &record.id),
            title: payload.title,
            situation: payload.situation,
            steps: payload.steps,
            is_active: payload.is_active,
        };
        store.action_plans().apply_remote(&plan).await?;
        Ok(())
    }
}

// =============================================================================
// Routines
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct RoutinePayload {
    name: String,
    #[serde(default)]
    time_of_day: Option<String>,
    #[serde(default)]
    weekdays: Vec<String>,
    #[serde(default = "default_true")]
    enabled: bool,
}

pub struct RoutineTranslator;

#[async_trait]
impl EntityTranslator for RoutineTranslator {
    fn kind(&self) -> EntityKind {
        EntityKind::Routine
    }

    async fn load_payload(&self, store: &LocalStore, local_id: &str) -> Result<Option<Value>> {
        let Some(routine) = store.routines().find_by_id(local_id).await? else {
            return Ok(None);
        };

        let payload = RoutinePayload {
            name: routine.name,
            time_of_day: routine.time_of_day,
            weekdays: routine.weekdays,
            enabled: routine.enabled,
        };
        Ok(Some(serde_json::to_value(payload)?))
    }

    async fn apply_remote(
        &self,
        store: &LocalStore,
        owner_id: &str,
        record: &RemoteRecord,
    ) -> Result<()> {
        let payload: RoutinePayload = serde_json::from_value(record.payload.clone())?;

        let routine = Routine {
            meta: SyncMeta::from_remote(owner_id, &record.id),
            name: payload.name,
            time_of_day: payload.time_of_day,
            weekdays: payload.weekdays,
            enabled: payload.enabled,
        };
        store.routines().apply_remote(&routine).await?;
        Ok(())
    }
}

// =============================================================================
// Trigger locations
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct TriggerLocationPayload {
    name: String,
    latitude: f64,
    longitude: f64,
    radius_meters: f64,
}

pub struct TriggerLocationTranslator;

#[async_trait]
impl EntityTranslator for TriggerLocationTranslator {
    fn kind(&self) -> EntityKind {
        EntityKind::TriggerLocation
    }

    async fn load_payload(&self, store: &LocalStore, local_id: &str) -> Result<Option<Value>> {
        let Some(location) = store.trigger_locations().find_by_id(local_id).await? else {
            return Ok(None);
        };

        let payload = TriggerLocationPayload {
            name: location.name,
            latitude: location.latitude,
            longitude: location.longitude,
            radius_meters: location.radius_meters,
        };
        Ok(Some(serde_json::to_value(payload)?))
    }

    async fn apply_remote(
        &self,
        store: &LocalStore,
        owner_id: &str,
        record: &RemoteRecord,
    ) -> Result<()> {
        let payload: TriggerLocationPayload = serde_json::from_value(record.payload.clone())?;

        let location = TriggerLocation {
            meta: SyncMeta::from_remote(owner_id, &record.id),
            name: payload.name,
            latitude: payload.latitude,
            longitude: payload.longitude,
            radius_meters: payload.radius_meters,
        };
        store.trigger_locations().apply_remote(&location).await?;
        Ok(())
    }
}

// =============================================================================
// Device tokens
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct DeviceTokenPayload {
    token: String,
    platform: String,
}

pub struct DeviceTokenTranslator;

#[async_trait]
impl EntityTranslator for DeviceTokenTranslator {
    fn kind(&self) -> EntityKind {
        EntityKind::DeviceToken
    }

    async fn load_payload(&self, store: &LocalStore, local_id: &str) -> Result<Option<Value>> {
        let Some(token) = store.device_tokens().find_by_id(local_id).await? else {
            return Ok(None);
        };

        let payload = DeviceTokenPayload {
            token: token.token,
            platform: token.platform,
        };
        Ok(Some(serde_json::to_value(payload)?))
    }

    async fn apply_remote(
        &self,
        store: &LocalStore,
        owner_id: &str,
        record: &RemoteRecord,
    ) -> Result<()> {
        let payload: DeviceTokenPayload = serde_json::from_value(record.payload.clone())?;

        let token = DeviceToken {
            meta: SyncMeta::from_remote(owner_id, &record.id),
            token: payload.token,
            platform: payload.platform,
        };
        store.device_tokens().apply_remote(&token).await?;
        Ok(())
    }
}
