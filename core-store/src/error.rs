use thiserror::Error;

/// Errors produced by the local store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid data in column '{column}': {message}")]
    InvalidData { column: String, message: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
