//! Per-entity dispatch registry.
//!
//! The engine itself is entity-agnostic: every entity type is registered
//! once at startup as an [`EntityBinding`] pairing its remote collection
//! with a payload translator. Dispatch is a typed lookup, not a conditional
//! chain, and iteration follows push priority order.

use crate::error::Result;
use crate::remote::{RemoteCollection, RemoteRecord};
use async_trait::async_trait;
use core_store::{EntityKind, LocalStore};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Translates between typed local rows and the JSON wire payloads of one
/// entity type.
#[async_trait]
pub trait EntityTranslator: Send + Sync {
    /// The entity type this translator handles.
    fn kind(&self) -> EntityKind;

    /// Load a local row and render its wire payload for a push.
    ///
    /// Returns `Ok(None)` if the row vanished between the pending-index
    /// snapshot and the upload; the engine skips such records.
    async fn load_payload(&self, store: &LocalStore, local_id: &str) -> Result<Option<Value>>;

    /// Apply one pulled record to the local store. The pending-wins-over-pull
    /// policy is enforced by the store itself.
    async fn apply_remote(
        &self,
        store: &LocalStore,
        owner_id: &str,
        record: &RemoteRecord,
    ) -> Result<()>;
}

/// One registered entity type: its remote collection plus translator.
#[derive(Clone)]
pub struct EntityBinding {
    pub kind: EntityKind,
    pub remote: Arc<dyn RemoteCollection>,
    pub translator: Arc<dyn EntityTranslator>,
}

/// Registry of entity bindings, resolved once at startup.
pub struct EntityRegistry {
    bindings: HashMap<EntityKind, EntityBinding>,
}

impl EntityRegistry {
    pub fn new(bindings: Vec<EntityBinding>) -> Self {
        Self {
            bindings: bindings.into_iter().map(|b| (b.kind, b)).collect(),
        }
    }

    pub fn get(&self, kind: EntityKind) -> Option<&EntityBinding> {
        self.bindings.get(&kind)
    }

    /// Registered bindings in push priority order.
    pub fn iter(&self) -> impl Iterator<Item = &EntityBinding> {
        EntityKind::ALL
            .iter()
            .filter_map(move |kind| self.bindings.get(kind))
    }
}
