//! Remote backend boundary.
//!
//! Each entity type is reconciled against one [`RemoteCollection`]: an
//! RPC-style capability with create/update/delete/list operations. The
//! engine does not assume a particular transport; [`crate::http`] provides a
//! REST implementation and tests substitute in-memory fakes.

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// One record as the remote store sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRecord {
    /// Remote-assigned identifier. The engine treats an empty id as a failed
    /// call: a synced row must always carry a server id.
    pub id: String,
    /// Entity business fields as JSON; translated to and from typed models
    /// by the per-entity [`EntityTranslator`](crate::registry::EntityTranslator).
    pub payload: Value,
}

/// Remote mutation/query surface for one entity collection.
///
/// At-least-once semantics: the engine may retry any of these calls on a
/// later cycle, so implementations should be idempotent by natural key.
#[async_trait]
pub trait RemoteCollection: Send + Sync {
    /// Create a record; returns the stored record with its remote id.
    async fn create(&self, owner_id: &str, payload: Value) -> Result<RemoteRecord>;

    /// Update an existing record by remote id.
    async fn update(&self, server_id: &str, payload: Value) -> Result<RemoteRecord>;

    /// Delete a record by remote id.
    async fn delete(&self, server_id: &str) -> Result<()>;

    /// Fetch the most recent records for a user, bounded by `limit`.
    async fn list_recent(&self, owner_id: &str, limit: u32) -> Result<Vec<RemoteRecord>>;
}
