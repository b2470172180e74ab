//! # Reconciliation Engine
//!
//! Runs one sync cycle to completion without overlap: a **pull phase**
//! (remote → local, per entity type, isolated) followed by a **push phase**
//! (local → remote, consuming the pending index in priority/FIFO order).
//!
//! One engine instance exists per user session. The single-flight guard is
//! an `AtomicBool` compare-and-set: a losing `run_cycle` call returns
//! [`CycleOutcome::Skipped`] immediately and performs no remote I/O, so
//! callers that need a guaranteed sync must retry later rather than assume
//! the call executed.

use crate::error::{Result, SyncError};
use crate::registry::{EntityBinding, EntityRegistry};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, RecordEvent, SyncEvent};
use core_store::{LocalStore, PendingMode, PendingOp, PendingRecord};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Bounded timeout applied to every remote call.
    pub call_timeout: Duration,
    /// Maximum records fetched per entity type during a pull phase.
    pub pull_limit: u32,
    /// Retry cap for `error` rows on scheduled cycles.
    pub max_retries: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            pull_limit: 50,
            max_retries: 5,
        }
    }
}

impl From<&CoreConfig> for SyncConfig {
    fn from(config: &CoreConfig) -> Self {
        Self {
            call_timeout: config.call_timeout,
            pull_limit: config.pull_limit,
            max_retries: config.max_retries as i64,
        }
    }
}

/// How a cycle was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleMode {
    /// Periodic timer tick; capped `error` rows are excluded.
    Scheduled,
    /// Reconnect, foreground transition, or explicit "sync now"; capped
    /// rows are retried too.
    Forced,
}

/// Counters for one completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleStats {
    /// Remote records applied during the pull phase.
    pub pulled: u64,
    /// Local records uploaded (or remote-deleted) during the push phase.
    pub pushed: u64,
    /// Records that ended the cycle in `error` status.
    pub failed: u64,
    /// Wall-clock cycle duration.
    pub duration: Duration,
}

/// Result of a `run_cycle` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle was already in flight; nothing ran.
    Skipped,
    /// The cycle ran to completion (individual records may still have
    /// failed; see [`CycleStats::failed`]).
    Completed(CycleStats),
}

enum PushOutcome {
    Uploaded { server_id: String },
    Deleted,
    /// The row vanished between the pending-index snapshot and the upload.
    Vanished,
}

/// Releases the single-flight guard on every exit path.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Orchestrates pull-then-push reconciliation for one user session.
pub struct ReconciliationEngine {
    owner_id: String,
    store: LocalStore,
    registry: Arc<EntityRegistry>,
    events: EventBus,
    config: SyncConfig,
    in_flight: AtomicBool,
}

impl ReconciliationEngine {
    pub fn new(
        owner_id: impl Into<String>,
        store: LocalStore,
        registry: Arc<EntityRegistry>,
        events: EventBus,
        config: SyncConfig,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            store,
            registry,
            events,
            config,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Run one reconciliation cycle: pull for every registered entity type,
    /// then push the pending index.
    ///
    /// Record-level push failures and entity-level pull failures are
    /// absorbed into the cycle (status transitions and logs); only failures
    /// of the cycle itself, such as the local store erroring, propagate.
    pub async fn run_cycle(&self, mode: CycleMode) -> Result<CycleOutcome> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(owner_id = %self.owner_id, "Sync cycle already in flight; skipping");
            self.events
                .emit(CoreEvent::Sync(SyncEvent::CycleSkipped {
                    owner_id: self.owner_id.clone(),
                }))
                .ok();
            return Ok(CycleOutcome::Skipped);
        }
        let _guard = InFlightGuard(&self.in_flight);

        let forced = mode == CycleMode::Forced;
        info!(owner_id = %self.owner_id, forced, "Sync cycle started");
        self.events
            .emit(CoreEvent::Sync(SyncEvent::CycleStarted {
                owner_id: self.owner_id.clone(),
                forced,
            }))
            .ok();

        let started = Instant::now();
        match self.execute(mode).await {
            Ok((pulled, pushed, failed)) => {
                let stats = CycleStats {
                    pulled,
                    pushed,
                    failed,
                    duration: started.elapsed(),
                };
                info!(
                    owner_id = %self.owner_id,
                    pulled, pushed, failed,
                    duration_ms = stats.duration.as_millis() as u64,
                    "Sync cycle completed"
                );
                self.events
                    .emit(CoreEvent::Sync(SyncEvent::CycleCompleted {
                        owner_id: self.owner_id.clone(),
                        pulled,
                        pushed,
                        failed,
                        duration_ms: stats.duration.as_millis() as u64,
                    }))
                    .ok();
                Ok(CycleOutcome::Completed(stats))
            }
            Err(e) => {
                warn!(owner_id = %self.owner_id, error = %e, "Sync cycle failed");
                self.events
                    .emit(CoreEvent::Sync(SyncEvent::CycleFailed {
                        owner_id: self.owner_id.clone(),
                        message: e.to_string(),
                    }))
                    .ok();
                Err(e)
            }
        }
    }

    async fn execute(&self, mode: CycleMode) -> Result<(u64, u64, u64)> {
        let pulled = self.pull_phase().await;
        let (pushed, failed) = self.push_phase(mode).await?;
        Ok((pulled, pushed, failed))
    }

    /// Pull remote state into the local store, one entity type at a time.
    /// A failing entity type is logged and isolated from the others.
    async fn pull_phase(&self) -> u64 {
        let mut pulled = 0u64;

        for binding in self.registry.iter() {
            let fetched = timeout(
                self.config.call_timeout,
                binding
                    .remote
                    .list_recent(&self.owner_id, self.config.pull_limit),
            )
            .await;

            let records = match fetched {
                Ok(Ok(records)) => records,
                Ok(Err(e)) => {
                    warn!(entity = %binding.kind, error = %e, "Pull failed for entity type");
                    continue;
                }
                Err(_) => {
                    warn!(entity = %binding.kind, "Pull timed out for entity type");
                    continue;
                }
            };

            debug!(entity = %binding.kind, count = records.len(), "Applying pulled records");
            for record in records {
                if record.id.is_empty() {
                    warn!(entity = %binding.kind, "Pulled record has no id; skipping");
                    continue;
                }
                match binding
                    .translator
                    .apply_remote(&self.store, &self.owner_id, &record)
                    .await
                {
                    Ok(()) => pulled += 1,
                    Err(e) => {
                        warn!(
                            entity = %binding.kind,
                            server_id = %record.id,
                            error = %e,
                            "Failed to apply pulled record"
                        );
                    }
                }
            }
        }

        pulled
    }

    /// Upload the pending index in order. One bad record never blocks the
    /// rest of the queue.
    async fn push_phase(&self, mode: CycleMode) -> Result<(u64, u64)> {
        let pending_mode = match mode {
            CycleMode::Forced => PendingMode::Forced,
            CycleMode::Scheduled => PendingMode::Scheduled {
                max_retries: self.config.max_retries,
            },
        };
        let worklist = self.store.collect_pending(&self.owner_id, pending_mode).await?;

        let mut pushed = 0u64;
        let mut failed = 0u64;

        for record in worklist {
            let Some(binding) = self.registry.get(record.kind) else {
                warn!(entity = %record.kind, "No binding registered; record left pending");
                continue;
            };

            self.store.mark_syncing(record.kind, &record.local_id).await?;

            match self.push_record(&record, binding).await {
                Ok(PushOutcome::Uploaded { server_id }) => {
                    self.store
                        .mark_synced(record.kind, &record.local_id, &server_id)
                        .await?;
                    pushed += 1;
                    self.events
                        .emit(CoreEvent::Record(RecordEvent::Synced {
                            entity: record.kind.as_str().to_string(),
                            local_id: record.local_id.clone(),
                            server_id,
                        }))
                        .ok();
                }
                Ok(PushOutcome::Deleted) => {
                    self.store.remove(record.kind, &record.local_id).await?;
                    pushed += 1;
                    self.events
                        .emit(CoreEvent::Record(RecordEvent::Deleted {
                            entity: record.kind.as_str().to_string(),
                            local_id: record.local_id.clone(),
                        }))
                        .ok();
                }
                Ok(PushOutcome::Vanished) => {
                    debug!(entity = %record.kind, local_id = %record.local_id, "Row vanished before upload");
                }
                Err(e) => {
                    warn!(
                        entity = %record.kind,
                        local_id = %record.local_id,
                        error = %e,
                        "Push failed for record"
                    );
                    self.store.mark_error(record.kind, &record.local_id).await?;
                    failed += 1;
                    self.events
                        .emit(CoreEvent::Record(RecordEvent::PushFailed {
                            entity: record.kind.as_str().to_string(),
                            local_id: record.local_id.clone(),
                            message: e.to_string(),
                        }))
                        .ok();
                }
            }
        }

        Ok((pushed, failed))
    }

    async fn push_record(
        &self,
        record: &PendingRecord,
        binding: &EntityBinding,
    ) -> Result<PushOutcome> {
        match record.op {
            PendingOp::Delete => {
                if let Some(server_id) = &record.server_id {
                    timeout(self.config.call_timeout, binding.remote.delete(server_id))
                        .await
                        .map_err(|_| SyncError::Timeout(self.config.call_timeout))??;
                }
                // a tombstone with no remote identity has nothing to delete remotely
                Ok(PushOutcome::Deleted)
            }
            PendingOp::Upsert => {
                let Some(payload) = binding
                    .translator
                    .load_payload(&self.store, &record.local_id)
                    .await?
                else {
                    return Ok(PushOutcome::Vanished);
                };

                let result = match &record.server_id {
                    None => {
                        timeout(
                            self.config.call_timeout,
                            binding.remote.create(&self.owner_id, payload),
                        )
                        .await
                    }
                    Some(server_id) => {
                        timeout(
                            self.config.call_timeout,
                            binding.remote.update(server_id, payload),
                        )
                        .await
                    }
                };

                let remote = result.map_err(|_| SyncError::Timeout(self.config.call_timeout))??;
                if remote.id.is_empty() {
                    // a synced row must always carry a server id
                    return Err(SyncError::MissingRemoteId);
                }
                Ok(PushOutcome::Uploaded { server_id: remote.id })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::translator_for;
    use crate::remote::{RemoteCollection, RemoteRecord};
    use async_trait::async_trait;
    use bridge_traits::SystemClock;
    use core_store::repositories::DailyEntryRepository;
    use core_store::{create_test_pool, DailyEntry, EntityKind, SyncMeta, SyncStatus};
    use serde_json::{json, Value};

    mockall::mock! {
        pub Remote {}

        #[async_trait]
        impl RemoteCollection for Remote {
            async fn create(&self, owner_id: &str, payload: Value) -> Result<RemoteRecord>;
            async fn update(&self, server_id: &str, payload: Value) -> Result<RemoteRecord>;
            async fn delete(&self, server_id: &str) -> Result<()>;
            async fn list_recent(&self, owner_id: &str, limit: u32) -> Result<Vec<RemoteRecord>>;
        }
    }

    /// Remote whose pull hangs long enough for a second cycle to race it.
    struct SlowRemote;

    #[async_trait]
    impl RemoteCollection for SlowRemote {
        async fn create(&self, _owner_id: &str, payload: Value) -> Result<RemoteRecord> {
            Ok(RemoteRecord {
                id: "srv-slow".to_string(),
                payload,
            })
        }

        async fn update(&self, server_id: &str, payload: Value) -> Result<RemoteRecord> {
            Ok(RemoteRecord {
                id: server_id.to_string(),
                payload,
            })
        }

        async fn delete(&self, _server_id: &str) -> Result<()> {
            Ok(())
        }

        async fn list_recent(&self, _owner_id: &str, _limit: u32) -> Result<Vec<RemoteRecord>> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(vec![])
        }
    }

    async fn store() -> LocalStore {
        LocalStore::new(create_test_pool().await.unwrap(), Arc::new(SystemClock))
    }

    fn engine_with(store: LocalStore, remote: Arc<dyn RemoteCollection>) -> ReconciliationEngine {
        let registry = EntityRegistry::new(vec![EntityBinding {
            kind: EntityKind::DailyEntry,
            remote,
            translator: translator_for(EntityKind::DailyEntry),
        }]);
        ReconciliationEngine::new(
            "user-1",
            store,
            Arc::new(registry),
            EventBus::default(),
            SyncConfig::default(),
        )
    }

    fn pending_entry(owner: &str, date: &str) -> DailyEntry {
        DailyEntry {
            meta: SyncMeta::new_local(owner, 100),
            entry_date: date.to_string(),
            mood_score: Some(6),
            craving_score: None,
            notes: None,
            gratitudes: vec![],
        }
    }

    // Runs under real time: sqlx executes SQLite work on its own threads, and
    // paused time auto-advances past the pool acquire timeout while they run.
    #[tokio::test]
    async fn concurrent_cycles_single_flight() {
        let engine = Arc::new(engine_with(store().await, Arc::new(SlowRemote)));

        let (first, second) =
            tokio::join!(engine.run_cycle(CycleMode::Forced), engine.run_cycle(CycleMode::Forced));

        let outcomes = [first.unwrap(), second.unwrap()];
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, CycleOutcome::Completed(_))));
        assert!(outcomes.iter().any(|o| *o == CycleOutcome::Skipped));
    }

    #[tokio::test]
    async fn guard_is_released_after_a_cycle() {
        let engine = engine_with(store().await, Arc::new(SlowRemote));

        assert!(matches!(
            engine.run_cycle(CycleMode::Forced).await.unwrap(),
            CycleOutcome::Completed(_)
        ));
        assert!(matches!(
            engine.run_cycle(CycleMode::Forced).await.unwrap(),
            CycleOutcome::Completed(_)
        ));
    }

    #[tokio::test]
    async fn empty_remote_id_is_a_failure() {
        let store = store().await;
        let entry = pending_entry("user-1", "2024-01-26");
        store.daily_entries().upsert(&entry).await.unwrap();

        let mut remote = MockRemote::new();
        remote.expect_list_recent().returning(|_, _| Ok(vec![]));
        remote.expect_create().returning(|_, payload| {
            Ok(RemoteRecord {
                id: String::new(),
                payload,
            })
        });

        let engine = engine_with(store.clone(), Arc::new(remote));
        let outcome = engine.run_cycle(CycleMode::Forced).await.unwrap();

        match outcome {
            CycleOutcome::Completed(stats) => {
                assert_eq!(stats.pushed, 0);
                assert_eq!(stats.failed, 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let found = store
            .daily_entries()
            .find_by_id(&entry.meta.local_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.meta.sync_status, SyncStatus::Error);
    }

    #[tokio::test]
    async fn pull_failure_does_not_abort_push() {
        let store = store().await;
        let entry = pending_entry("user-1", "2024-01-26");
        store.daily_entries().upsert(&entry).await.unwrap();

        let mut remote = MockRemote::new();
        remote
            .expect_list_recent()
            .returning(|_, _| Err(SyncError::Remote("boom".to_string())));
        remote.expect_create().returning(|_, payload| {
            Ok(RemoteRecord {
                id: "srv-1".to_string(),
                payload,
            })
        });

        let engine = engine_with(store.clone(), Arc::new(remote));
        let outcome = engine.run_cycle(CycleMode::Forced).await.unwrap();

        match outcome {
            CycleOutcome::Completed(stats) => {
                assert_eq!(stats.pulled, 0);
                assert_eq!(stats.pushed, 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_dispatched_when_server_id_exists() {
        let store = store().await;
        let mut entry = pending_entry("user-1", "2024-01-26");
        entry.meta.server_id = Some("srv-7".to_string());
        store.daily_entries().upsert(&entry).await.unwrap();

        let mut remote = MockRemote::new();
        remote.expect_list_recent().returning(|_, _| Ok(vec![]));
        remote
            .expect_update()
            .withf(|server_id, _| server_id == "srv-7")
            .times(1)
            .returning(|server_id, payload| {
                Ok(RemoteRecord {
                    id: server_id.to_string(),
                    payload,
                })
            });

        let engine = engine_with(store.clone(), Arc::new(remote));
        engine.run_cycle(CycleMode::Forced).await.unwrap();

        let found = store
            .daily_entries()
            .find_by_id(&entry.meta.local_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.meta.sync_status, SyncStatus::Synced);
    }
}
