//! Outbound Ports (Driven Ports / SPI)

use crate::domain::value_objects::{BoardSnapshot, MoveCommand, ViewChange};
use async_trait::async_trait;
use shared_types::{BoardId, EntityId, MutationEnvelope, SyncError};
use tokio::sync::mpsc;

/// Path to the reorder coordinator's accept-move operation.
#[async_trait]
pub trait MoveGateway: Send + Sync {
    /// Propose `command` and return the canonical envelope.
    async fn propose_move(&self, command: MoveCommand) -> Result<MutationEnvelope, SyncError>;
}

/// Source of authoritative board state.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Load the current children of `parents` on `board`.
    async fn load(&self, board: &BoardId, parents: &[EntityId]) -> Result<BoardSnapshot, SyncError>;
}

/// Re-render hook. Called synchronously while the view is locked, so
/// implementations must not block.
pub trait ViewObserver: Send + Sync {
    fn on_change(&self, change: &ViewChange);
}

impl ViewObserver for mpsc::UnboundedSender<ViewChange> {
    fn on_change(&self, change: &ViewChange) {
        // Observer went away; nothing to render.
        let _ = self.send(change.clone());
    }
}
