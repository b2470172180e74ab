//! # Core Runtime
//!
//! Shared runtime infrastructure for the Recovery Companion Core:
//!
//! - **Events** (`events`): typed event bus over `tokio::sync::broadcast`,
//!   used by the sync engine to surface cycle and per-record outcomes to the
//!   UI without coupling it to sync internals.
//! - **Logging** (`logging`): `tracing`/`tracing-subscriber` setup with
//!   env-filter support.
//! - **Config** (`config`): fail-fast builder hosts use to assemble the core
//!   with their platform bridge implementations.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventSeverity, RecordEvent, SyncEvent};
pub use logging::{init_logging, LogFormat, LoggingConfig};
