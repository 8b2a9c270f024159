//! Error types for the Reorder Coordinator

use shared_types::{EntityId, SyncError};
use thiserror::Error;

/// Failures reported by an [`OrderStore`](crate::ports::outbound::OrderStore).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Tenant, parent or entity does not exist in the store.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Optimistic check failed: the neighbors a rank was computed against
    /// are no longer adjacent, or the rank is taken.
    #[error("Conflict on parent {parent_id}: {reason}")]
    Conflict { parent_id: EntityId, reason: String },

    /// The store cannot serve requests right now.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether re-reading the neighbors and recomputing may succeed.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => SyncError::NotFound(what),
            StoreError::Conflict { parent_id, .. } => SyncError::Conflict {
                parent_id: parent_id.to_string(),
                attempts: 1,
            },
            StoreError::Unavailable(reason) => SyncError::Unavailable(reason),
        }
    }
}
