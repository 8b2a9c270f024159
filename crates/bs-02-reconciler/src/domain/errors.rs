//! Error types for the optimistic reconciler

use bs_01_rank_keys::PlacementError;
use shared_types::{EntityId, SyncError};
use thiserror::Error;

/// Errors from local moves and the session round-trip.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconcileError {
    /// The entity is not part of this client's view.
    #[error("Entity {0} is not in the local view")]
    UnknownEntity(EntityId),

    /// A requested neighbor is not a sibling in the target parent.
    #[error("Neighbor {0} is not in the target parent")]
    UnknownNeighbor(EntityId),

    /// The coordinator or the bus rejected the operation.
    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl From<PlacementError> for ReconcileError {
    fn from(err: PlacementError) -> Self {
        match err {
            PlacementError::UnknownNeighbor(id) => Self::UnknownNeighbor(id),
        }
    }
}

impl From<ReconcileError> for SyncError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::UnknownEntity(id) | ReconcileError::UnknownNeighbor(id) => {
                SyncError::NotFound(id.to_string())
            }
            ReconcileError::Sync(e) => e,
        }
    }
}

impl ReconcileError {
    /// Whether retrying against fresh state may succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Sync(e) => e.is_recoverable(),
            _ => false,
        }
    }
}
