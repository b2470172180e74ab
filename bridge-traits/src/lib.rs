//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the core library and platform-specific
//! implementations. Each trait represents a capability the sync core requires but
//! that must be implemented differently per host (iOS, Android, desktop):
//!
//! - [`NetworkMonitor`](network::NetworkMonitor) - Connectivity status and change stream
//! - [`LifecycleObserver`](lifecycle::LifecycleObserver) - App foreground/background transitions
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! The sync core uses these to decide *when* to reconcile: a reconnect or a
//! return to foreground triggers an immediate cycle, while the periodic timer
//! only runs when the host reports connectivity.
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Platform
//! implementations should convert their native errors and provide actionable
//! messages (e.g. which system API was unavailable).
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared across async
//! tasks behind `Arc`.

pub mod error;
pub mod lifecycle;
pub mod network;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use lifecycle::{LifecycleChangeStream, LifecycleObserver, LifecycleState};
pub use network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use time::{Clock, SystemClock};
