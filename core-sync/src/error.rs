use bridge_traits::BridgeError;
use core_store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by the reconciliation engine and its transports.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Remote call failed: {0}")]
    Remote(String),

    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Remote response is missing a record id")]
    MissingRemoteId,

    #[error("Invalid remote payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Trigger controller already started")]
    AlreadyStarted,
}

pub type Result<T> = std::result::Result<T, SyncError>;
