//! # Trigger Controller
//!
//! Decides *when* a sync cycle fires, without touching sync state itself.
//!
//! Triggers:
//! - offline → online transition: forced cycle (reconnection is the
//!   highest-value moment to flush pending writes)
//! - background → foreground transition while online: forced cycle
//! - periodic timer while online: scheduled cycle
//! - online → offline: ticks are suppressed until connectivity returns
//!
//! `start`/`stop` tie the controller to the user session. Stopping cancels
//! the trigger loop but never force-cancels an in-flight cycle; the
//! engine's single-flight guard makes overlapping triggers no-ops.

use crate::engine::{CycleMode, ReconciliationEngine};
use crate::error::{Result, SyncError};
use bridge_traits::{LifecycleObserver, LifecycleState, NetworkMonitor};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default periodic sync interval.
pub const DEFAULT_TRIGGER_INTERVAL: Duration = Duration::from_secs(300);

/// Observes connectivity and lifecycle signals and invokes the engine.
pub struct TriggerController {
    engine: Arc<ReconciliationEngine>,
    network: Arc<dyn NetworkMonitor>,
    lifecycle: Arc<dyn LifecycleObserver>,
    interval: Duration,
    cancel: Mutex<Option<CancellationToken>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TriggerController {
    pub fn new(
        engine: Arc<ReconciliationEngine>,
        network: Arc<dyn NetworkMonitor>,
        lifecycle: Arc<dyn LifecycleObserver>,
        interval: Duration,
    ) -> Self {
        Self {
            engine,
            network,
            lifecycle,
            interval,
            cancel: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// Start the trigger loop for the session.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AlreadyStarted`] on a second call without an
    /// intervening [`stop`](Self::stop), or a bridge error if the host
    /// streams cannot be subscribed.
    pub async fn start(&self) -> Result<()> {
        {
            let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner());
            if handle.is_some() {
                return Err(SyncError::AlreadyStarted);
            }
        }

        let mut net_stream = self.network.subscribe_changes().await?;
        let mut life_stream = self.lifecycle.subscribe_changes().await?;

        let mut online = match self.network.get_network_info().await {
            Ok(info) => info.is_online(),
            Err(e) => {
                warn!(error = %e, "Could not read initial network state; assuming offline");
                false
            }
        };
        let mut state = match self.lifecycle.get_state().await {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "Could not read initial lifecycle state; assuming foreground");
                LifecycleState::Foreground
            }
        };

        let token = CancellationToken::new();
        let loop_token = token.clone();
        let engine = self.engine.clone();
        let interval = self.interval;

        info!(owner_id = %engine.owner_id(), online, "Trigger controller started");

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // an interval's first tick is immediate; the periodic trigger
            // should first fire one full interval from now
            ticker.reset();

            let mut net_open = true;
            let mut life_open = true;

            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,

                    _ = ticker.tick(), if online => {
                        run_cycle_logged(&engine, CycleMode::Scheduled).await;
                    }

                    info = net_stream.next(), if net_open => match info {
                        Some(info) => {
                            let now_online = info.is_online();
                            if now_online && !online {
                                debug!("Connectivity restored; forcing a sync cycle");
                                online = true;
                                ticker.reset();
                                run_cycle_logged(&engine, CycleMode::Forced).await;
                            } else if !now_online && online {
                                debug!("Connectivity lost; suppressing periodic sync");
                                online = false;
                            }
                        }
                        None => net_open = false,
                    },

                    new_state = life_stream.next(), if life_open => match new_state {
                        Some(new_state) => {
                            let was_background = state == LifecycleState::Background;
                            state = new_state;
                            if was_background && new_state == LifecycleState::Foreground && online {
                                debug!("App foregrounded while online; forcing a sync cycle");
                                run_cycle_logged(&engine, CycleMode::Forced).await;
                            }
                        }
                        None => life_open = false,
                    },
                }
            }

            debug!("Trigger loop exited");
        });

        *self.cancel.lock().unwrap_or_else(|e| e.into_inner()) = Some(token);
        *self.handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(())
    }

    /// Stop the trigger loop and wait for it to exit. A cycle already in
    /// flight finishes (or fails) naturally.
    pub async fn stop(&self) {
        let token = self.cancel.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(token) = token {
            token.cancel();
        }

        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            handle.await.ok();
        }

        info!(owner_id = %self.engine.owner_id(), "Trigger controller stopped");
    }
}

async fn run_cycle_logged(engine: &ReconciliationEngine, mode: CycleMode) {
    if let Err(e) = engine.run_cycle(mode).await {
        warn!(owner_id = %engine.owner_id(), error = %e, "Triggered sync cycle failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::translator_for;
    use crate::engine::SyncConfig;
    use crate::registry::{EntityBinding, EntityRegistry};
    use crate::remote::{RemoteCollection, RemoteRecord};
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{
        LifecycleChangeStream, NetworkChangeStream, NetworkInfo, NetworkStatus, SystemClock,
    };
    use core_runtime::events::EventBus;
    use core_store::{create_test_pool, EntityKind, LocalStore};
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    struct CountingRemote {
        cycles: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RemoteCollection for CountingRemote {
        async fn create(&self, _owner_id: &str, payload: Value) -> crate::error::Result<RemoteRecord> {
            Ok(RemoteRecord {
                id: "srv".to_string(),
                payload,
            })
        }

        async fn update(&self, server_id: &str, payload: Value) -> crate::error::Result<RemoteRecord> {
            Ok(RemoteRecord {
                id: server_id.to_string(),
                payload,
            })
        }

        async fn delete(&self, _server_id: &str) -> crate::error::Result<()> {
            Ok(())
        }

        async fn list_recent(
            &self,
            _owner_id: &str,
            _limit: u32,
        ) -> crate::error::Result<Vec<RemoteRecord>> {
            // one list call per cycle with a single registered entity
            self.cycles.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }
    }

    struct ChannelNetStream(mpsc::UnboundedReceiver<NetworkInfo>);

    #[async_trait]
    impl NetworkChangeStream for ChannelNetStream {
        async fn next(&mut self) -> Option<NetworkInfo> {
            self.0.recv().await
        }
    }

    struct TestMonitor {
        initial: NetworkInfo,
        rx: Mutex<Option<mpsc::UnboundedReceiver<NetworkInfo>>>,
    }

    #[async_trait]
    impl NetworkMonitor for TestMonitor {
        async fn get_network_info(&self) -> BridgeResult<NetworkInfo> {
            Ok(self.initial.clone())
        }

        async fn subscribe_changes(&self) -> BridgeResult<Box<dyn NetworkChangeStream>> {
            let rx = self
                .rx
                .lock()
                .unwrap()
                .take()
                .expect("subscribe_changes called twice");
            Ok(Box::new(ChannelNetStream(rx)))
        }
    }

    struct ChannelLifeStream(mpsc::UnboundedReceiver<LifecycleState>);

    #[async_trait]
    impl LifecycleChangeStream for ChannelLifeStream {
        async fn next(&mut self) -> Option<LifecycleState> {
            self.0.recv().await
        }
    }

    struct TestObserver {
        initial: LifecycleState,
        rx: Mutex<Option<mpsc::UnboundedReceiver<LifecycleState>>>,
    }

    #[async_trait]
    impl LifecycleObserver for TestObserver {
        async fn get_state(&self) -> BridgeResult<LifecycleState> {
            Ok(self.initial)
        }

        async fn subscribe_changes(&self) -> BridgeResult<Box<dyn LifecycleChangeStream>> {
            let rx = self
                .rx
                .lock()
                .unwrap()
                .take()
                .expect("subscribe_changes called twice");
            Ok(Box::new(ChannelLifeStream(rx)))
        }
    }

    fn info(status: NetworkStatus) -> NetworkInfo {
        NetworkInfo {
            status,
            network_type: None,
            is_metered: false,
        }
    }

    struct Harness {
        controller: TriggerController,
        cycles: Arc<AtomicUsize>,
        net_tx: mpsc::UnboundedSender<NetworkInfo>,
        life_tx: mpsc::UnboundedSender<LifecycleState>,
    }

    async fn harness(initially_online: bool, initial_state: LifecycleState) -> Harness {
        let cycles = Arc::new(AtomicUsize::new(0));
        let remote = Arc::new(CountingRemote {
            cycles: cycles.clone(),
        });

        // sqlx opens SQLite connections on blocking threads; under paused time
        // the runtime auto-advances past the pool acquire timeout, so create
        // the pool with time running. All callers use `start_paused = true`.
        tokio::time::resume();
        let store = LocalStore::new(create_test_pool().await.unwrap(), Arc::new(SystemClock));
        tokio::time::pause();
        let registry = EntityRegistry::new(vec![EntityBinding {
            kind: EntityKind::DailyEntry,
            remote,
            translator: translator_for(EntityKind::DailyEntry),
        }]);
        let engine = Arc::new(ReconciliationEngine::new(
            "user-1",
            store,
            Arc::new(registry),
            EventBus::default(),
            SyncConfig::default(),
        ));

        let (net_tx, net_rx) = mpsc::unbounded_channel();
        let (life_tx, life_rx) = mpsc::unbounded_channel();

        let status = if initially_online {
            NetworkStatus::Connected
        } else {
            NetworkStatus::Disconnected
        };
        let monitor = Arc::new(TestMonitor {
            initial: info(status),
            rx: Mutex::new(Some(net_rx)),
        });
        let observer = Arc::new(TestObserver {
            initial: initial_state,
            rx: Mutex::new(Some(life_rx)),
        });

        Harness {
            controller: TriggerController::new(
                engine,
                monitor,
                observer,
                DEFAULT_TRIGGER_INTERVAL,
            ),
            cycles,
            net_tx,
            life_tx,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_forces_a_cycle() {
        let h = harness(false, LifecycleState::Foreground).await;
        h.controller.start().await.unwrap();
        settle().await;
        assert_eq!(h.cycles.load(Ordering::SeqCst), 0);

        h.net_tx.send(info(NetworkStatus::Connected)).unwrap();
        settle().await;
        assert_eq!(h.cycles.load(Ordering::SeqCst), 1);

        h.controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_ticks_only_while_online() {
        let h = harness(true, LifecycleState::Foreground).await;
        h.controller.start().await.unwrap();
        settle().await;
        assert_eq!(h.cycles.load(Ordering::SeqCst), 0);

        tokio::time::sleep(DEFAULT_TRIGGER_INTERVAL + Duration::from_secs(1)).await;
        assert_eq!(h.cycles.load(Ordering::SeqCst), 1);

        tokio::time::sleep(DEFAULT_TRIGGER_INTERVAL).await;
        assert_eq!(h.cycles.load(Ordering::SeqCst), 2);

        h.net_tx.send(info(NetworkStatus::Disconnected)).unwrap();
        settle().await;
        tokio::time::sleep(DEFAULT_TRIGGER_INTERVAL * 3).await;
        assert_eq!(h.cycles.load(Ordering::SeqCst), 2);

        h.controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn foreground_while_online_forces_a_cycle() {
        let h = harness(true, LifecycleState::Background).await;
        h.controller.start().await.unwrap();
        settle().await;

        h.life_tx.send(LifecycleState::Foreground).unwrap();
        settle().await;
        assert_eq!(h.cycles.load(Ordering::SeqCst), 1);

        h.controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn foreground_while_offline_does_nothing() {
        let h = harness(false, LifecycleState::Background).await;
        h.controller.start().await.unwrap();
        settle().await;

        h.life_tx.send(LifecycleState::Foreground).unwrap();
        settle().await;
        assert_eq!(h.cycles.load(Ordering::SeqCst), 0);

        h.controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_the_loop_and_double_start_errors() {
        let h = harness(true, LifecycleState::Foreground).await;
        h.controller.start().await.unwrap();
        assert!(matches!(
            h.controller.start().await,
            Err(SyncError::AlreadyStarted)
        ));

        h.controller.stop().await;
        tokio::time::sleep(DEFAULT_TRIGGER_INTERVAL * 2).await;
        assert_eq!(h.cycles.load(Ordering::SeqCst), 0);
    }
}
