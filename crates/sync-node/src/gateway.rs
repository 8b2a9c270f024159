//! Client-side view of the coordinator.
//!
//! Binds a session to the tenant and caller it was opened for, so the
//! reconciler's ports never carry identity themselves.

use async_trait::async_trait;
use bs_02_reconciler::{BoardSnapshot, MoveCommand, MoveGateway, SnapshotSource};
use bs_03_reorder_coordinator::{MoveRequest, ReorderApi};
use shared_types::{BoardId, CallerId, EntityId, MutationEnvelope, SyncError, TenantId};
use std::sync::Arc;

pub struct CoordinatorGateway {
    coordinator: Arc<dyn ReorderApi>,
    tenant_id: TenantId,
    caller_id: CallerId,
}

impl CoordinatorGateway {
    pub fn new(coordinator: Arc<dyn ReorderApi>, tenant_id: TenantId, caller_id: CallerId) -> Self {
        Self {
            coordinator,
            tenant_id,
            caller_id,
        }
    }
}

#[async_trait]
impl MoveGateway for CoordinatorGateway {
    async fn propose_move(&self, command: MoveCommand) -> Result<MutationEnvelope, SyncError> {
        self.coordinator
            .propose_move(MoveRequest {
                tenant_id: self.tenant_id.clone(),
                caller_id: self.caller_id.clone(),
                entity_id: command.entity_id,
                new_parent_id: command.new_parent_id,
                before_id: command.before_id,
                after_id: command.after_id,
                origin_client_id: Some(command.origin_client_id),
            })
            .await
    }
}

#[async_trait]
impl SnapshotSource for CoordinatorGateway {
    async fn load(&self, board: &BoardId, parents: &[EntityId]) -> Result<BoardSnapshot, SyncError> {
        let snapshot = self
            .coordinator
            .snapshot(&self.tenant_id, &self.caller_id, board, parents)
            .await?;
        Ok(BoardSnapshot {
            sequence: snapshot.sequence,
            parents: snapshot.parents,
            removed: snapshot.removed,
        })
    }
}
