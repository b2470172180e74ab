//! # Core Sync
//!
//! Offline-first reconciliation between the Local Store and a remote
//! authoritative backend.
//!
//! - [`engine`]: the [`ReconciliationEngine`], which runs one pull phase then
//!   one push phase per cycle, single-flight guarded, with per-record status
//!   transitions.
//! - [`registry`]: typed per-entity dispatch ([`EntityBinding`] pairing a
//!   remote collection with a payload translator).
//! - [`adapters`]: the translators for each entity type.
//! - [`trigger`]: the [`TriggerController`], which turns connectivity,
//!   lifecycle and timer signals into cycle runs.
//! - [`http`]: a reqwest REST transport satisfying [`RemoteCollection`].
//!
//! ## Wiring
//!
//! ```rust,ignore
//! let store = LocalStore::new(pool, config.clock.clone());
//! let registry = Arc::new(EntityRegistry::new(
//!     EntityKind::ALL
//!         .into_iter()
//!         .map(|kind| EntityBinding {
//!             kind,
//!             remote: remote_for(kind),
//!             translator: translator_for(kind),
//!         })
//!         .collect(),
//! ));
//! let engine = Arc::new(ReconciliationEngine::new(
//!     owner_id, store, registry, events, SyncConfig::from(&config),
//! ));
//! let triggers = TriggerController::new(
//!     engine.clone(),
//!     config.network_monitor.clone(),
//!     config.lifecycle_observer.clone(),
//!     config.sync_interval,
//! );
//! triggers.start().await?;
//! ```
//!
//! An explicit "sync now" action is `engine.run_cycle(CycleMode::Forced)`.

pub mod adapters;
pub mod engine;
pub mod error;
pub mod http;
pub mod registry;
pub mod remote;
pub mod trigger;

pub use adapters::translator_for;
pub use engine::{CycleMode, CycleOutcome, CycleStats, ReconciliationEngine, SyncConfig};
pub use error::{Result, SyncError};
pub use http::HttpRemoteCollection;
pub use registry::{EntityBinding, EntityRegistry, EntityTranslator};
pub use remote::{RemoteCollection, RemoteRecord};
pub use trigger::{TriggerController, DEFAULT_TRIGGER_INTERVAL};
