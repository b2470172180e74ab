//! End-to-end reconciliation cycles against a real in-memory database and an
//! in-process fake backend with failure injection.

use async_trait::async_trait;
use bridge_traits::SystemClock;
use core_runtime::events::EventBus;
use core_store::repositories::{
    ActionPlanRepository, DailyEntryRepository, TriggerLocationRepository,
};
use core_store::{
    create_test_pool, ActionPlan, DailyEntry, EntityKind, LocalStore, SyncMeta, SyncStatus,
    TriggerLocation,
};
use core_sync::{
    translator_for, CycleMode, CycleOutcome, EntityBinding, EntityRegistry, ReconciliationEngine,
    RemoteCollection, RemoteRecord, Result, SyncConfig, SyncError,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// =============================================================================
// Fake backend
// =============================================================================

/// In-memory stand-in for one remote collection. Supports injected create
/// failures and a pull delay, and records every call in a shared log.
struct FakeRemote {
    name: &'static str,
    records: Mutex<BTreeMap<String, Value>>,
    next_id: AtomicU64,
    create_failures: AtomicUsize,
    fail_title: Mutex<Option<String>>,
    list_delay: Mutex<Option<Duration>>,
    log: Arc<Mutex<Vec<String>>>,
}

impl FakeRemote {
    fn new(name: &'static str, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name,
            records: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            create_failures: AtomicUsize::new(0),
            fail_title: Mutex::new(None),
            list_delay: Mutex::new(None),
            log,
        }
    }

    fn fail_next_creates(&self, count: usize) {
        self.create_failures.store(count, Ordering::SeqCst);
    }

    /// Fail creates whose payload `title` matches, leaving others alone.
    fn fail_creates_titled(&self, title: &str) {
        *self.fail_title.lock().unwrap() = Some(title.to_string());
    }

    fn delay_lists(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = Some(delay);
    }

    fn seed(&self, id: &str, payload: Value) {
        self.records.lock().unwrap().insert(id.to_string(), payload);
    }

    fn stored(&self, id: &str) -> Option<Value> {
        self.records.lock().unwrap().get(id).cloned()
    }

    fn record(&self, call: &str) {
        self.log.lock().unwrap().push(format!("{}:{}", call, self.name));
    }
}

#[async_trait]
impl RemoteCollection for FakeRemote {
    async fn create(&self, _owner_id: &str, payload: Value) -> Result<RemoteRecord> {
        self.record("create");

        if let Some(title) = self.fail_title.lock().unwrap().as_deref() {
            if payload.get("title").and_then(Value::as_str) == Some(title) {
                return Err(SyncError::Remote(format!("rejected '{title}'")));
            }
        }
        let remaining = self.create_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.create_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(SyncError::Remote("injected create failure".to_string()));
        }

        let id = format!("srv-{}-{}", self.name, self.next_id.fetch_add(1, Ordering::SeqCst));
        self.records.lock().unwrap().insert(id.clone(), payload.clone());
        Ok(RemoteRecord { id, payload })
    }

    async fn update(&self, server_id: &str, payload: Value) -> Result<RemoteRecord> {
        self.record("update");
        self.records
            .lock()
            .unwrap()
            .insert(server_id.to_string(), payload.clone());
        Ok(RemoteRecord {
            id: server_id.to_string(),
            payload,
        })
    }

    async fn delete(&self, server_id: &str) -> Result<()> {
        self.record("delete");
        self.records.lock().unwrap().remove(server_id);
        Ok(())
    }

    async fn list_recent(&self, _owner_id: &str, limit: u32) -> Result<Vec<RemoteRecord>> {
        self.record("list");
        let delay = *self.list_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .take(limit as usize)
            .map(|(id, payload)| RemoteRecord {
                id: id.clone(),
                payload: payload.clone(),
            })
            .collect())
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    store: LocalStore,
    engine: Arc<ReconciliationEngine>,
    remotes: HashMap<EntityKind, Arc<FakeRemote>>,
    log: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    async fn new() -> Self {
        Self::with_config(SyncConfig::default()).await
    }

    async fn with_config(config: SyncConfig) -> Self {
        let store = LocalStore::new(create_test_pool().await.unwrap(), Arc::new(SystemClock));
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut remotes = HashMap::new();
        let mut bindings = Vec::new();
        for kind in EntityKind::ALL {
            let remote = Arc::new(FakeRemote::new(kind.table(), log.clone()));
            bindings.push(EntityBinding {
                kind,
                remote: remote.clone(),
                translator: translator_for(kind),
            });
            remotes.insert(kind, remote);
        }

        let engine = Arc::new(ReconciliationEngine::new(
            "user-1",
            store.clone(),
            Arc::new(EntityRegistry::new(bindings)),
            EventBus::default(),
            config,
        ));

        Self {
            store,
            engine,
            remotes,
            log,
        }
    }

    fn remote(&self, kind: EntityKind) -> &FakeRemote {
        &self.remotes[&kind]
    }

    async fn cycle(&self, mode: CycleMode) -> CycleOutcome {
        self.engine.run_cycle(mode).await.unwrap()
    }

    fn completed(outcome: CycleOutcome) -> (u64, u64, u64) {
        match outcome {
            CycleOutcome::Completed(stats) => (stats.pulled, stats.pushed, stats.failed),
            CycleOutcome::Skipped => panic!("cycle was skipped"),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

fn daily_entry(date: &str, notes: &str) -> DailyEntry {
    DailyEntry {
        meta: SyncMeta::new_local("user-1", 1_000),
        entry_date: date.to_string(),
        mood_score: Some(7),
        craving_score: Some(2),
        notes: Some(notes.to_string()),
        gratitudes: vec!["sobriety".to_string()],
    }
}

fn action_plan(title: &str, created_at: i64) -> ActionPlan {
    ActionPlan {
        meta: SyncMeta::new_local("user-1", created_at),
        title: title.to_string(),
        situation: None,
        steps: vec!["call sponsor".to_string()],
        is_active: true,
    }
}

fn trigger_location(name: &str) -> TriggerLocation {
    TriggerLocation {
        meta: SyncMeta::new_local("user-1", 2_000),
        name: name.to_string(),
        latitude: 37.77,
        longitude: -122.42,
        radius_meters: 150.0,
    }
}

// =============================================================================
// Offline create, then reconnect
// =============================================================================

#[tokio::test]
async fn offline_create_uploads_on_next_cycle() {
    let h = Harness::new().await;

    let entry = daily_entry("2024-01-26", "rough morning");
    h.store.daily_entries().upsert(&entry).await.unwrap();
    assert!(entry.meta.local_id.starts_with("temp_"));

    let (_, pushed, failed) = Harness::completed(h.cycle(CycleMode::Forced).await);
    assert_eq!(pushed, 1);
    assert_eq!(failed, 0);

    let found = h
        .store
        .daily_entries()
        .find_by_id(&entry.meta.local_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.meta.sync_status, SyncStatus::Synced);
    assert!(found.meta.synced_at.is_some());
    // the provisional local id survives; only server_id is filled in
    assert_eq!(found.meta.local_id, entry.meta.local_id);
    let server_id = found.meta.server_id.unwrap();
    assert!(h.remote(EntityKind::DailyEntry).stored(&server_id).is_some());
}

#[tokio::test]
async fn second_cycle_updates_instead_of_creating() {
    let h = Harness::new().await;

    let entry = daily_entry("2024-01-26", "first draft");
    h.store.daily_entries().upsert(&entry).await.unwrap();
    h.cycle(CycleMode::Forced).await;

    // a UI edit demotes the synced row back to pending
    let mut edited = h
        .store
        .daily_entries()
        .find_by_id(&entry.meta.local_id)
        .await
        .unwrap()
        .unwrap();
    edited.notes = Some("second draft".to_string());
    h.store.daily_entries().upsert(&edited).await.unwrap();

    h.cycle(CycleMode::Forced).await;

    let creates = h
        .calls()
        .iter()
        .filter(|c| c.starts_with("create:"))
        .count();
    let updates = h
        .calls()
        .iter()
        .filter(|c| c.starts_with("update:"))
        .count();
    assert_eq!(creates, 1);
    assert_eq!(updates, 1);

    let server_id = edited.meta.server_id.unwrap();
    let stored = h.remote(EntityKind::DailyEntry).stored(&server_id).unwrap();
    assert_eq!(stored["notes"], "second draft");
}

// =============================================================================
// Push priority order
// =============================================================================

#[tokio::test]
async fn daily_entries_push_before_trigger_locations() {
    let h = Harness::new().await;

    // inserted in reverse priority order on purpose
    h.store
        .trigger_locations()
        .upsert(&trigger_location("old bar"))
        .await
        .unwrap();
    h.store
        .daily_entries()
        .upsert(&daily_entry("2024-01-26", "checked in"))
        .await
        .unwrap();

    let (_, pushed, _) = Harness::completed(h.cycle(CycleMode::Forced).await);
    assert_eq!(pushed, 2);

    let calls = h.calls();
    let entry_pos = calls
        .iter()
        .position(|c| c == "create:daily_entries")
        .unwrap();
    let location_pos = calls
        .iter()
        .position(|c| c == "create:trigger_locations")
        .unwrap();
    assert!(entry_pos < location_pos);
}

// =============================================================================
// Failure, retry, and the retry cap
// =============================================================================

#[tokio::test]
async fn failed_push_retries_on_next_cycle() {
    let h = Harness::new().await;
    h.remote(EntityKind::ActionPlan).fail_next_creates(1);

    let plan = action_plan("avoid old haunts", 1_000);
    h.store.action_plans().upsert(&plan).await.unwrap();

    let (_, pushed, failed) = Harness::completed(h.cycle(CycleMode::Forced).await);
    assert_eq!(pushed, 0);
    assert_eq!(failed, 1);

    let found = h
        .store
        .action_plans()
        .find_by_id(&plan.meta.local_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.meta.sync_status, SyncStatus::Error);
    assert_eq!(found.meta.retry_count, 1);

    let (_, pushed, failed) = Harness::completed(h.cycle(CycleMode::Forced).await);
    assert_eq!(pushed, 1);
    assert_eq!(failed, 0);

    let found = h
        .store
        .action_plans()
        .find_by_id(&plan.meta.local_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.meta.sync_status, SyncStatus::Synced);
    assert_eq!(found.meta.retry_count, 0);
}

#[tokio::test]
async fn scheduled_cycles_skip_capped_rows_but_forced_retries() {
    let config = SyncConfig {
        max_retries: 1,
        ..SyncConfig::default()
    };
    let h = Harness::with_config(config).await;
    h.remote(EntityKind::ActionPlan).fail_next_creates(1);

    let plan = action_plan("avoid old haunts", 1_000);
    h.store.action_plans().upsert(&plan).await.unwrap();

    // first failure brings the row to the cap
    let (_, _, failed) = Harness::completed(h.cycle(CycleMode::Scheduled).await);
    assert_eq!(failed, 1);

    // scheduled cycles now leave it alone
    let (_, pushed, failed) = Harness::completed(h.cycle(CycleMode::Scheduled).await);
    assert_eq!(pushed, 0);
    assert_eq!(failed, 0);

    // an explicit sync retries regardless of the cap
    let (_, pushed, _) = Harness::completed(h.cycle(CycleMode::Forced).await);
    assert_eq!(pushed, 1);
}

#[tokio::test]
async fn one_failing_record_does_not_block_the_rest() {
    let h = Harness::new().await;
    h.remote(EntityKind::ActionPlan)
        .fail_creates_titled("doomed");

    h.store
        .action_plans()
        .upsert(&action_plan("doomed", 1_000))
        .await
        .unwrap();
    h.store
        .action_plans()
        .upsert(&action_plan("fine", 2_000))
        .await
        .unwrap();

    let (_, pushed, failed) = Harness::completed(h.cycle(CycleMode::Forced).await);
    assert_eq!(pushed, 1);
    assert_eq!(failed, 1);

    let plans = h.store.action_plans().list("user-1").await.unwrap();
    let statuses: Vec<(String, SyncStatus)> = plans
        .into_iter()
        .map(|p| (p.title, p.meta.sync_status))
        .collect();
    assert!(statuses.contains(&("doomed".to_string(), SyncStatus::Error)));
    assert!(statuses.contains(&("fine".to_string(), SyncStatus::Synced)));
}

// =============================================================================
// Pull semantics
// =============================================================================

#[tokio::test]
async fn pull_populates_empty_store() {
    let h = Harness::new().await;
    h.remote(EntityKind::DailyEntry).seed(
        "srv-1",
        json!({ "entry_date": "2024-01-20", "mood_score": 5 }),
    );

    let (pulled, _, _) = Harness::completed(h.cycle(CycleMode::Scheduled).await);
    assert_eq!(pulled, 1);

    let found = h
        .store
        .daily_entries()
        .find_by_id("srv-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.meta.sync_status, SyncStatus::Synced);
    assert_eq!(found.meta.server_id.as_deref(), Some("srv-1"));
    assert_eq!(found.entry_date, "2024-01-20");
}

#[tokio::test]
async fn local_pending_edit_wins_over_pulled_record() {
    let h = Harness::new().await;

    let entry = daily_entry("2024-01-26", "local truth");
    h.store.daily_entries().upsert(&entry).await.unwrap();
    // the server holds a stale copy of the same day
    h.remote(EntityKind::DailyEntry).seed(
        "srv-1",
        json!({ "entry_date": "2024-01-26", "notes": "stale remote copy" }),
    );

    h.cycle(CycleMode::Forced).await;

    let found = h
        .store
        .daily_entries()
        .find_by_date("user-1", "2024-01-26")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.notes.as_deref(), Some("local truth"));
    assert_eq!(found.meta.sync_status, SyncStatus::Synced);

    // and the push phase propagated the local edit outward
    let server_id = found.meta.server_id.unwrap();
    let stored = h.remote(EntityKind::DailyEntry).stored(&server_id).unwrap();
    assert_eq!(stored["notes"], "local truth");
}

#[tokio::test]
async fn repeated_pull_of_same_record_is_idempotent() {
    let h = Harness::new().await;
    h.remote(EntityKind::DailyEntry).seed(
        "srv-1",
        json!({ "entry_date": "2024-01-20", "mood_score": 5 }),
    );

    h.cycle(CycleMode::Scheduled).await;
    h.cycle(CycleMode::Scheduled).await;

    let entries = h.store.daily_entries().list("user-1").await.unwrap();
    assert_eq!(entries.len(), 1);
}

// =============================================================================
// Deletes
// =============================================================================

#[tokio::test]
async fn deleting_a_synced_row_propagates_and_removes_it() {
    let h = Harness::new().await;

    let entry = daily_entry("2024-01-26", "to be removed");
    h.store.daily_entries().upsert(&entry).await.unwrap();
    h.cycle(CycleMode::Forced).await;

    let synced = h
        .store
        .daily_entries()
        .find_by_id(&entry.meta.local_id)
        .await
        .unwrap()
        .unwrap();
    let server_id = synced.meta.server_id.unwrap();

    let deleted = h
        .store
        .daily_entries()
        .delete("user-1", &entry.meta.local_id)
        .await
        .unwrap();
    assert!(deleted);

    let (_, pushed, failed) = Harness::completed(h.cycle(CycleMode::Forced).await);
    assert_eq!(pushed, 1);
    assert_eq!(failed, 0);

    assert!(h.remote(EntityKind::DailyEntry).stored(&server_id).is_none());
    let entries = h.store.daily_entries().list("user-1").await.unwrap();
    assert!(entries.is_empty());
}

// =============================================================================
// Concurrency
// =============================================================================

// Runs under real time: sqlx executes SQLite work on its own threads, and
// paused time auto-advances past the pool acquire timeout while they run.
#[tokio::test]
async fn concurrent_cycles_run_exactly_once() {
    let h = Harness::new().await;
    h.remote(EntityKind::DailyEntry)
        .delay_lists(Duration::from_millis(50));

    let (first, second) = tokio::join!(
        h.engine.run_cycle(CycleMode::Forced),
        h.engine.run_cycle(CycleMode::Forced)
    );

    let outcomes = [first.unwrap(), second.unwrap()];
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, CycleOutcome::Completed(_)))
            .count(),
        1
    );
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| **o == CycleOutcome::Skipped)
            .count(),
        1
    );
}
