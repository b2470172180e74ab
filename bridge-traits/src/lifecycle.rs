//! App Lifecycle Abstraction
//!
//! Notifies the core about foreground/background transitions.

use crate::error::Result;

/// Application lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Application is in the foreground and active
    Foreground,
    /// Application is in the background
    Background,
}

/// Lifecycle observer trait
///
/// A return to the foreground is a high-value moment to reconcile: the user
/// is about to look at data that may be stale. The sync core subscribes to
/// this stream and requests an immediate cycle on background→foreground while
/// online.
///
/// # Platform Support
///
/// - **iOS**: UIApplication lifecycle notifications
/// - **Android**: Activity/Application lifecycle callbacks
/// - **Desktop**: Window focus events (less critical)
#[async_trait::async_trait]
pub trait LifecycleObserver: Send + Sync {
    /// Get current lifecycle state
    async fn get_state(&self) -> Result<LifecycleState>;

    /// Subscribe to lifecycle state changes
    async fn subscribe_changes(&self) -> Result<Box<dyn LifecycleChangeStream>>;
}

/// Stream of lifecycle state changes
#[async_trait::async_trait]
pub trait LifecycleChangeStream: Send {
    /// Get the next lifecycle state update
    ///
    /// Returns `None` when the stream is closed.
    async fn next(&mut self) -> Option<LifecycleState>;
}
