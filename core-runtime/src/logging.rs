//! # Logging & Tracing Infrastructure
//!
//! Configures `tracing-subscriber` for the core. Hosts call [`init_logging`]
//! once at startup; module-level filtering is controlled through the standard
//! `RUST_LOG` env-filter syntax (e.g. `core_sync=debug,sqlx=warn`).

use crate::error::{Error, Result};
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable pretty format with colors
    Pretty,
    /// Structured JSON format for machine parsing
    Json,
    /// Compact format for production
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        #[cfg(debug_assertions)]
        return Self::Pretty;

        #[cfg(not(debug_assertions))]
        return Self::Json;
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Default filter directive when `RUST_LOG` is unset (e.g. "info")
    pub default_directive: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            default_directive: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Set the output format
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the default filter directive used when `RUST_LOG` is unset
    pub fn with_default_directive(mut self, directive: impl Into<String>) -> Self {
        self.default_directive = directive.into();
        self
    }
}

/// Initialize the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed or the filter
/// directive cannot be parsed.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_directive))
        .map_err(|e| Error::Logging(format!("invalid filter directive: {e}")))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
    };

    result.map_err(|e| Error::Logging(e.to_string()))
}
