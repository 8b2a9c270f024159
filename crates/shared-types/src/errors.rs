//! # Error Types
//!
//! The error taxonomy shared by every Board-Sync component.

use thiserror::Error;

/// Errors surfaced by the ordering and synchronization engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// Malformed tenant identifier, rejected before any I/O.
    #[error("Invalid tenant id {tenant_id:?}: {reason}")]
    InvalidTenantId {
        tenant_id: String,
        reason: &'static str,
    },

    /// A channel's embedded tenant does not match the caller's tenant.
    #[error("Tenant isolation violation: channel {channel} is not owned by tenant {caller_tenant}")]
    TenantIsolationViolation {
        channel: String,
        caller_tenant: String,
    },

    /// Channel kind/scope combination is not canonical.
    #[error("Invalid channel: {0}")]
    InvalidChannel(String),

    /// Referenced parent or entity is absent or not owned by the tenant.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authoritative state kept changing until the retry budget ran out.
    #[error("Conflict on parent {parent_id} after {attempts} attempts")]
    Conflict { parent_id: String, attempts: u32 },

    /// The identity collaborator rejected the caller.
    #[error("Unauthorized: caller {caller_id} may not mutate tenant {tenant_id}")]
    Unauthorized { tenant_id: String, caller_id: String },

    /// The event bus is not connected; publishes fail fast.
    #[error("Event bus disconnected")]
    Disconnected,

    /// The underlying transport rejected an operation.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Envelope could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(String),

    /// A collaborator (store, identity) is temporarily unavailable.
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

impl SyncError {
    /// Programmer/attacker-facing failures that must be logged as security
    /// events and abort with no partial effect.
    #[must_use]
    pub fn is_security_relevant(&self) -> bool {
        matches!(
            self,
            Self::InvalidTenantId { .. } | Self::TenantIsolationViolation { .. }
        )
    }

    /// Failures the caller is expected to recover from by retrying against
    /// fresh state.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::Disconnected | Self::Transport(_) | Self::Unavailable(_)
        )
    }
}
