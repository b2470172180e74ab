//! Network Monitoring Abstraction
//!
//! Provides network connectivity and status information.

use crate::error::Result;

/// Network connection type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkType {
    /// Cellular/mobile data connection
    Cellular,
    /// WiFi connection
    WiFi,
    /// Other or unknown connection type
    Other,
}

/// Network connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    /// Connected to network
    Connected,
    /// Not connected to any network
    Disconnected,
    /// Connection status unknown or indeterminate
    Indeterminate,
}

/// Network information
#[derive(Debug, Clone)]
pub struct NetworkInfo {
    pub status: NetworkStatus,
    pub network_type: Option<NetworkType>,
    /// Whether the connection is metered (has data limits/costs)
    pub is_metered: bool,
}

impl NetworkInfo {
    /// Shorthand for "connected to some network".
    pub fn is_online(&self) -> bool {
        self.status == NetworkStatus::Connected
    }
}

/// Network monitor trait
///
/// Provides connectivity information so the sync core can defer reconciliation
/// while offline and flush pending writes immediately on reconnect.
///
/// # Platform Support
///
/// - **iOS**: Network framework, Reachability
/// - **Android**: ConnectivityManager
/// - **Desktop**: System network APIs (NetworkManager, SystemConfiguration,
///   Windows Network List Manager)
#[async_trait::async_trait]
pub trait NetworkMonitor: Send + Sync {
    /// Get current network information
    async fn get_network_info(&self) -> Result<NetworkInfo>;

    /// Subscribe to network status changes
    ///
    /// Returns a stream of network info updates. Implementations should
    /// emit an event whenever connectivity changes.
    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>>;
}

/// Stream of network status changes
#[async_trait::async_trait]
pub trait NetworkChangeStream: Send {
    /// Get the next network info update
    ///
    /// Returns `None` when the stream is closed.
    async fn next(&mut self) -> Option<NetworkInfo>;
}
