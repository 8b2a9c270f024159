//! Outbound Ports (Driven Ports / SPI)

use crate::domain::errors::StoreError;
use crate::domain::value_objects::{ParentSnapshot, PersistCreate, PersistMove, StoredEntity};
use async_trait::async_trait;
use shared_types::{
    CallerId, ChannelId, EntityId, MutationEnvelope, OrderedItem, RankAssignment, SyncError,
    TenantId,
};

/// Decides whether a caller may mutate a tenant's boards.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// # Errors
    ///
    /// `SyncError::Unauthorized` when the caller does not belong to the tenant.
    async fn authorize(&self, tenant_id: &TenantId, caller_id: &CallerId) -> Result<(), SyncError>;
}

/// Durable, tenant-partitioned order state.
///
/// Writes that place an item carry the neighbors the rank was computed
/// against; the store rejects them with `StoreError::Conflict` when those
/// neighbors are no longer the item's immediate siblings.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_entity(
        &self,
        tenant_id: &TenantId,
        entity_id: &EntityId,
    ) -> Result<Option<StoredEntity>, StoreError>;

    async fn load_children(
        &self,
        tenant_id: &TenantId,
        parent_id: &EntityId,
    ) -> Result<ParentSnapshot, StoreError>;

    async fn persist_move(&self, tenant_id: &TenantId, write: &PersistMove)
        -> Result<OrderedItem, StoreError>;

    async fn persist_create(
        &self,
        tenant_id: &TenantId,
        write: &PersistCreate,
    ) -> Result<OrderedItem, StoreError>;

    async fn persist_payload(
        &self,
        tenant_id: &TenantId,
        entity_id: &EntityId,
        payload: serde_json::Value,
    ) -> Result<OrderedItem, StoreError>;

    /// Remove the entity (and, for a list, its cards).
    async fn persist_delete(
        &self,
        tenant_id: &TenantId,
        entity_id: &EntityId,
    ) -> Result<StoredEntity, StoreError>;

    /// Replace every rank under `parent_id` at once. `assignments` must cover
    /// exactly the current children.
    async fn persist_rebalance(
        &self,
        tenant_id: &TenantId,
        parent_id: &EntityId,
        assignments: &[RankAssignment],
    ) -> Result<(), StoreError>;
}

/// Fan-out of canonical envelopes.
#[async_trait]
pub trait EnvelopePublisher: Send + Sync {
    async fn publish(
        &self,
        tenant_id: &TenantId,
        channel: &ChannelId,
        envelope: &MutationEnvelope,
    ) -> Result<(), SyncError>;
}

/// Mock implementations for testing
#[cfg(test)]
pub mod mocks {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Authorizes everyone.
    pub struct AllowAll;

    #[async_trait]
    impl IdentityProvider for AllowAll {
        async fn authorize(&self, _tenant_id: &TenantId, _caller_id: &CallerId) -> Result<(), SyncError> {
            Ok(())
        }
    }

    /// Records published envelopes; optionally fails or stalls every publish.
    #[derive(Default)]
    pub struct RecordingPublisher {
        pub published: Mutex<Vec<(ChannelId, MutationEnvelope)>>,
        pub fail_with: Mutex<Option<SyncError>>,
        pub delay: Mutex<Option<Duration>>,
    }

    impl RecordingPublisher {
        pub fn envelopes(&self) -> Vec<MutationEnvelope> {
            self.published.lock().iter().map(|(_, env)| env.clone()).collect()
        }
    }

    #[async_trait]
    impl EnvelopePublisher for RecordingPublisher {
        async fn publish(
            &self,
            _tenant_id: &TenantId,
            channel: &ChannelId,
            envelope: &MutationEnvelope,
        ) -> Result<(), SyncError> {
            let delay = *self.delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(err) = self.fail_with.lock().clone() {
                return Err(err);
            }
            self.published.lock().push((channel.clone(), envelope.clone()));
            Ok(())
        }
    }
}
