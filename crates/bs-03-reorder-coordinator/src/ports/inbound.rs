//! Inbound Ports (Driving Ports / API)

use crate::domain::value_objects::{
    CreateRequest, DeleteRequest, MoveRequest, OrderSnapshot, UpdateRequest,
};
use async_trait::async_trait;
use shared_types::{BoardId, CallerId, EntityId, MutationEnvelope, SyncError, TenantId};

/// The coordinator's public surface.
///
/// Every operation authorizes the caller against the tenant first, and every
/// successful mutation returns the same canonical envelope that was
/// broadcast on the board channel.
#[async_trait]
pub trait ReorderApi: Send + Sync {
    /// Compute the authoritative rank for a move, persist and broadcast it.
    ///
    /// Calls on the same parent are serialized. A move that would not change
    /// the entity's position returns an envelope for the current state
    /// without persisting or broadcasting.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` / `InvalidTenantId` before any work
    /// - `NotFound` for an unknown entity or parent
    /// - `Conflict` once the retry budget is spent
    async fn propose_move(&self, request: MoveRequest) -> Result<MutationEnvelope, SyncError>;

    async fn propose_create(&self, request: CreateRequest) -> Result<MutationEnvelope, SyncError>;

    async fn propose_update(&self, request: UpdateRequest) -> Result<MutationEnvelope, SyncError>;

    async fn propose_delete(&self, request: DeleteRequest) -> Result<MutationEnvelope, SyncError>;

    /// Re-space every rank under `parent_id`.
    ///
    /// Returns `None` when the parent is empty or already evenly spaced.
    async fn rebalance_parent(
        &self,
        tenant_id: &TenantId,
        caller_id: &CallerId,
        parent_id: &EntityId,
    ) -> Result<Option<MutationEnvelope>, SyncError>;

    /// Authoritative children of `parents` on `board_id`. Parents that are
    /// gone from the board are listed in `removed` rather than failing the
    /// whole read.
    async fn snapshot(
        &self,
        tenant_id: &TenantId,
        caller_id: &CallerId,
        board_id: &BoardId,
        parents: &[EntityId],
    ) -> Result<OrderSnapshot, SyncError>;
}
