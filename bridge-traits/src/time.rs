//! Time Abstraction
//!
//! Injectable time source for deterministic testing.

use chrono::{DateTime, Utc};

/// Time source trait
///
/// Abstracts system time so sync metadata timestamps (`created_at`,
/// `synced_at`) can be controlled in tests.
pub trait Clock: Send + Sync {
    /// Get current UTC time
    fn now(&self) -> DateTime<Utc>;

    /// Get current Unix timestamp in milliseconds
    fn unix_timestamp_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// System clock implementation using actual system time
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
