//! # Core Configuration Module
//!
//! Builder for assembling the core with host-provided bridges and sync
//! settings. Validation is fail-fast: a missing required bridge produces an
//! actionable error at build time instead of a panic deep inside a sync
//! cycle.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/data/recovery.db")
//!     .api_base_url("https://api.example.com")
//!     .network_monitor(Arc::new(HostNetworkMonitor::new()))
//!     .lifecycle_observer(Arc::new(HostLifecycleObserver::new()))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, LifecycleObserver, NetworkMonitor, SystemClock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default periodic sync interval (5 minutes).
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Default per-call remote timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound for pull-phase collection fetches.
pub const DEFAULT_PULL_LIMIT: u32 = 50;

/// Default retry cap for rows stuck in `error` (scheduled cycles only).
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Core configuration for the Recovery Companion Core.
///
/// Use [`CoreConfig::builder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Base URL of the remote backend
    pub api_base_url: String,

    /// Periodic sync interval while online and in session
    pub sync_interval: Duration,

    /// Bounded timeout applied to every remote call
    pub call_timeout: Duration,

    /// Maximum records fetched per entity type during a pull phase
    pub pull_limit: u32,

    /// Retry cap for `error` rows on scheduled cycles
    pub max_retries: u32,

    /// Network connectivity monitor (required)
    pub network_monitor: Arc<dyn NetworkMonitor>,

    /// App lifecycle observer (required)
    pub lifecycle_observer: Arc<dyn LifecycleObserver>,

    /// Time source (defaults to the system clock)
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("api_base_url", &self.api_base_url)
            .field("sync_interval", &self.sync_interval)
            .field("call_timeout", &self.call_timeout)
            .field("pull_limit", &self.pull_limit)
            .field("max_retries", &self.max_retries)
            .field("network_monitor", &"NetworkMonitor { ... }")
            .field("lifecycle_observer", &"LifecycleObserver { ... }")
            .finish()
    }
}

impl CoreConfig {
    /// Start building a configuration.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    api_base_url: Option<String>,
    sync_interval: Option<Duration>,
    call_timeout: Option<Duration>,
    pull_limit: Option<u32>,
    max_retries: Option<u32>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    lifecycle_observer: Option<Arc<dyn LifecycleObserver>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    /// Path to the SQLite database file
    pub fn database_path(mut self, path: impl AsRef<Path>) -> Self {
        self.database_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Base URL of the remote backend
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// Periodic sync interval (default: 5 minutes)
    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Per-call remote timeout (default: 30 seconds)
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Bound for pull-phase fetches per entity type (default: 50)
    pub fn pull_limit(mut self, limit: u32) -> Self {
        self.pull_limit = Some(limit);
        self
    }

    /// Retry cap for `error` rows on scheduled cycles (default: 5)
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Host network monitor (required)
    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    /// Host lifecycle observer (required)
    pub fn lifecycle_observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.lifecycle_observer = Some(observer);
        self
    }

    /// Time source override (tests)
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapabilityMissing`] for a missing required bridge and
    /// [`Error::InvalidConfig`] for missing or malformed settings.
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self
            .database_path
            .ok_or_else(|| Error::InvalidConfig("database_path is required".to_string()))?;

        let api_base_url = self
            .api_base_url
            .ok_or_else(|| Error::InvalidConfig("api_base_url is required".to_string()))?;
        if !api_base_url.starts_with("http://") && !api_base_url.starts_with("https://") {
            return Err(Error::InvalidConfig(
                "api_base_url must include http:// or https://".to_string(),
            ));
        }

        let network_monitor = self.network_monitor.ok_or_else(|| Error::CapabilityMissing {
            capability: "NetworkMonitor".to_string(),
            message: "Inject the platform network monitor so sync can react to \
                      connectivity transitions."
                .to_string(),
        })?;

        let lifecycle_observer = self.lifecycle_observer.ok_or_else(|| Error::CapabilityMissing {
            capability: "LifecycleObserver".to_string(),
            message: "Inject the platform lifecycle observer so sync can react to \
                      foreground transitions."
                .to_string(),
        })?;

        Ok(CoreConfig {
            database_path,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            sync_interval: self.sync_interval.unwrap_or(DEFAULT_SYNC_INTERVAL),
            call_timeout: self.call_timeout.unwrap_or(DEFAULT_CALL_TIMEOUT),
            pull_limit: self.pull_limit.unwrap_or(DEFAULT_PULL_LIMIT),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            network_monitor,
            lifecycle_observer,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{
        LifecycleChangeStream, LifecycleState, NetworkChangeStream, NetworkInfo, NetworkStatus,
    };

    struct StubMonitor;

    #[async_trait::async_trait]
    impl NetworkMonitor for StubMonitor {
        async fn get_network_info(&self) -> BridgeResult<NetworkInfo> {
            Ok(NetworkInfo {
                status: NetworkStatus::Connected,
                network_type: None,
                is_metered: false,
            })
        }

        async fn subscribe_changes(&self) -> BridgeResult<Box<dyn NetworkChangeStream>> {
            Err(bridge_traits::BridgeError::NotAvailable("stub".into()))
        }
    }

    struct StubObserver;

    #[async_trait::async_trait]
    impl LifecycleObserver for StubObserver {
        async fn get_state(&self) -> BridgeResult<LifecycleState> {
            Ok(LifecycleState::Foreground)
        }

        async fn subscribe_changes(&self) -> BridgeResult<Box<dyn LifecycleChangeStream>> {
            Err(bridge_traits::BridgeError::NotAvailable("stub".into()))
        }
    }

    #[test]
    fn build_fails_without_bridges() {
        let result = CoreConfig::builder()
            .database_path("/tmp/test.db")
            .api_base_url("https://api.example.com")
            .build();

        assert!(matches!(result, Err(Error::CapabilityMissing { .. })));
    }

    #[test]
    fn build_rejects_bad_url() {
        let result = CoreConfig::builder()
            .database_path("/tmp/test.db")
            .api_base_url("api.example.com")
            .network_monitor(Arc::new(StubMonitor))
            .lifecycle_observer(Arc::new(StubObserver))
            .build();

        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn build_applies_defaults_and_trims_url() {
        let config = CoreConfig::builder()
            .database_path("/tmp/test.db")
            .api_base_url("https://api.example.com/")
            .network_monitor(Arc::new(StubMonitor))
            .lifecycle_observer(Arc::new(StubObserver))
            .build()
            .unwrap();

        assert_eq!(config.api_base_url, "https://api.example.com");
        assert_eq!(config.sync_interval, DEFAULT_SYNC_INTERVAL);
        assert_eq!(config.pull_limit, DEFAULT_PULL_LIMIT);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
    }
}
