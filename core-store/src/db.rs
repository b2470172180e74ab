//! # Database Connection Pool Module
//!
//! SQLite connection pooling for the local store.
//!
//! - **WAL mode** for concurrent UI reads while the sync engine writes
//! - **Foreign keys** enforced
//! - **Embedded migrations** applied on pool creation
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_store::db::{DatabaseConfig, create_pool};
//!
//! let config = DatabaseConfig::new("/data/recovery.db");
//! let pool = create_pool(config).await?;
//! ```
//!
//! For tests, `create_test_pool()` yields an in-memory database with the
//! schema already applied.

use crate::error::{Result, StoreError};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Database configuration for the SQLite connection pool
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (`sqlite:<path>` or `sqlite::memory:`)
    pub database_url: String,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Maximum time to wait for a connection from the pool
    pub acquire_timeout: Duration,

    /// Maximum idle time for a connection before being closed
    pub idle_timeout: Option<Duration>,
}

impl DatabaseConfig {
    /// Create a configuration for the given database file path
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        let path = database_path.into();

        Self {
            database_url: format!("sqlite:{}", path.display()),
            min_connections: 1,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }

    /// Create a configuration for an in-memory database (tests).
    ///
    /// The pool is pinned to a single connection that never idles out: each
    /// SQLite `:memory:` connection is its own database, so a larger pool
    /// would hand out empty databases.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            min_connections: 1,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: None,
        }
    }

    /// Set the maximum number of connections
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the connection acquire timeout
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Create a configured SQLite connection pool.
///
/// Configures WAL mode, NORMAL synchronous, and foreign keys, then runs the
/// embedded migrations and a health check.
///
/// # Errors
///
/// Returns an error if the database cannot be opened, migrations fail, or
/// the health check fails.
pub async fn create_pool(config: DatabaseConfig) -> Result<Pool<Sqlite>> {
    info!(
        database_url = %config.database_url,
        max_connections = config.max_connections,
        "Creating database connection pool"
    );

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(StoreError::Database)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .create_if_missing(true);

    debug!("SQLite connection options configured");

    let pool = SqlitePoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to create connection pool");
            StoreError::Database(e)
        })?;

    run_migrations(&pool).await?;
    health_check(&pool).await?;

    Ok(pool)
}

/// Create an in-memory pool with migrations applied (tests).
pub async fn create_test_pool() -> Result<Pool<Sqlite>> {
    create_pool(DatabaseConfig::in_memory()).await
}

/// Apply all pending migrations embedded at compile time.
async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
    info!("Running database migrations");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Migration failed");
            StoreError::Migration(e.to_string())
        })?;

    info!("Database migrations complete");
    Ok(())
}

/// Verify the pool can serve queries.
async fn health_check(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    debug!("Database health check passed");
    Ok(())
}
