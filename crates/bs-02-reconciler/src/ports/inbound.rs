//! Inbound Ports (Driving Ports / API)

use crate::domain::errors::ReconcileError;
use crate::domain::value_objects::EntityState;
use async_trait::async_trait;
use shared_types::{EntityId, MutationEnvelope, OrderedItem};

/// What the rendering layer drives.
#[async_trait]
pub trait BoardSyncApi: Send + Sync {
    /// Ordered children of `parent` as currently rendered.
    fn items(&self, parent: &EntityId) -> Vec<OrderedItem>;

    fn state_of(&self, entity_id: &EntityId) -> EntityState;

    /// Move with zero-latency local feedback, then confirm with the
    /// coordinator.
    ///
    /// On rejection the local guess is reverted and the error returned.
    async fn move_item(
        &self,
        entity_id: &EntityId,
        new_parent_id: &EntityId,
        before_id: Option<&EntityId>,
        after_id: Option<&EntityId>,
    ) -> Result<MutationEnvelope, ReconcileError>;

    /// Reload authoritative state for every known parent.
    async fn resync(&self) -> Result<(), ReconcileError>;
}
