//! # `MutationEnvelope`
//!
//! The unit broadcast over a board channel, one per durably accepted
//! mutation.
//!
//! ## Properties
//!
//! - **Versioning**: every envelope carries a `version` for forward
//!   compatibility.
//! - **Tagged payload**: `mutation` is an enum with per-variant required
//!   fields; consumers match exhaustively.
//! - **Stale detection**: `sequence_hint` increases monotonically per
//!   channel and is assigned by the coordinator at publish time.
//! - **Echo recognition**: `origin_client_id` lets a client recognize the
//!   canonical echo of its own optimistic mutation.
//!
//! Envelopes are immutable after creation and discarded after delivery.

use crate::entities::{ClientId, EntityId, EntityKind, RankKey, TenantId};
use crate::errors::SyncError;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// One rank replaced during a batched rebalance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankAssignment {
    pub entity_id: EntityId,
    pub rank: RankKey,
}

/// What happened to the entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mutation {
    /// A new entity was placed under `parent_id` at `rank`.
    Created {
        parent_id: EntityId,
        rank: RankKey,
        #[serde(default)]
        payload: serde_json::Value,
    },
    /// The opaque payload changed; position is untouched.
    Updated {
        #[serde(default)]
        payload: serde_json::Value,
    },
    /// The entity was removed from `parent_id`.
    Deleted { parent_id: EntityId },
    /// The entity now lives under `parent_id` at `rank`.
    Moved { parent_id: EntityId, rank: RankKey },
    /// Every child of the parent (the envelope's `entity_id`) was re-ranked
    /// in one step.
    Rebalanced { assignments: Vec<RankAssignment> },
}

/// Discriminant of [`Mutation`], handy for logging and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Created,
    Updated,
    Deleted,
    Moved,
    Rebalanced,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Moved => "moved",
            Self::Rebalanced => "rebalanced",
        }
    }
}

/// The broadcast unit describing one durable entity mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationEnvelope {
    /// Protocol version. Decoders reject versions they do not know.
    pub version: u16,
    /// Unique id of this envelope.
    pub envelope_id: Uuid,
    /// Tenant the mutation belongs to; must match the channel's tenant.
    pub tenant_id: TenantId,
    /// Card or list.
    pub entity_kind: EntityKind,
    /// The mutated entity (the parent, for `Rebalanced`).
    pub entity_id: EntityId,
    /// The mutation itself.
    pub mutation: Mutation,
    /// Client whose action caused the mutation, when known.
    pub origin_client_id: Option<ClientId>,
    /// Per-channel monotonically increasing counter.
    pub sequence_hint: u64,
    /// Unix timestamp (seconds) when the mutation was accepted.
    pub timestamp: u64,
}

impl MutationEnvelope {
    /// Current protocol version.
    pub const CURRENT_VERSION: u16 = 1;

    pub fn new(
        tenant_id: TenantId,
        entity_kind: EntityKind,
        entity_id: EntityId,
        mutation: Mutation,
        origin_client_id: Option<ClientId>,
        sequence_hint: u64,
    ) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            envelope_id: Uuid::new_v4(),
            tenant_id,
            entity_kind,
            entity_id,
            mutation,
            origin_client_id,
            sequence_hint,
            timestamp: current_timestamp(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> MutationKind {
        match self.mutation {
            Mutation::Created { .. } => MutationKind::Created,
            Mutation::Updated { .. } => MutationKind::Updated,
            Mutation::Deleted { .. } => MutationKind::Deleted,
            Mutation::Moved { .. } => MutationKind::Moved,
            Mutation::Rebalanced { .. } => MutationKind::Rebalanced,
        }
    }

    /// The parent whose ordering this envelope affects, if any.
    #[must_use]
    pub fn parent_id(&self) -> Option<&EntityId> {
        match &self.mutation {
            Mutation::Created { parent_id, .. }
            | Mutation::Deleted { parent_id }
            | Mutation::Moved { parent_id, .. } => Some(parent_id),
            Mutation::Rebalanced { .. } => Some(&self.entity_id),
            Mutation::Updated { .. } => None,
        }
    }

    /// The new rank, for mutations that assign one to `entity_id`.
    #[must_use]
    pub fn rank(&self) -> Option<&RankKey> {
        match &self.mutation {
            Mutation::Created { rank, .. } | Mutation::Moved { rank, .. } => Some(rank),
            _ => None,
        }
    }

    /// Whether this envelope echoes a mutation made by `client`.
    #[must_use]
    pub fn originated_from(&self, client: &ClientId) -> bool {
        self.origin_client_id.as_ref() == Some(client)
    }

    /// Serialize for the transport.
    pub fn encode(&self) -> Result<Vec<u8>, SyncError> {
        serde_json::to_vec(self).map_err(|e| SyncError::Codec(e.to_string()))
    }

    /// Deserialize from the transport, rejecting unknown versions.
    pub fn decode(bytes: &[u8]) -> Result<Self, SyncError> {
        let envelope: Self =
            serde_json::from_slice(bytes).map_err(|e| SyncError::Codec(e.to_string()))?;
        if envelope.version != Self::CURRENT_VERSION {
            return Err(SyncError::Codec(format!(
                "unsupported envelope version {} (supported {})",
                envelope.version,
                Self::CURRENT_VERSION
            )));
        }
        Ok(envelope)
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
