//! Value objects for the optimistic reconciler

use shared_types::{ClientId, EntityId, OrderedItem, RankKey};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Per-entity reconciliation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityState {
    /// No local mutation in flight.
    Idle,
    /// A local move was applied optimistically and awaits the coordinator.
    Pending,
    /// An inbound envelope is being merged.
    Reconciling,
}

/// Why the view changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// `Idle -> Pending`: local move applied with zero latency.
    Optimistic,
    /// `Pending -> Idle`: the canonical echo of our own move arrived.
    Confirmed,
    /// `Pending -> Idle`: another client's canonical mutation replaced our
    /// optimistic guess.
    Overridden,
    /// `Idle -> Reconciling -> Idle`: a remote mutation was merged.
    Reconciled,
    /// `Pending -> Idle`: the coordinator rejected our move.
    Reverted { notice: String },
    /// Authoritative state was reloaded.
    Resynced,
}

/// Re-render signal handed to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewChange {
    /// The entity that changed (the parent for rebalances, the board for
    /// resyncs).
    pub entity_id: EntityId,
    /// Parents whose ordered lists must be re-rendered.
    pub parents: Vec<EntityId>,
    pub transition: Transition,
}

/// An optimistic move layered over confirmed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMove {
    pub mutation_id: Uuid,
    pub parent_id: EntityId,
    pub rank: RankKey,
    /// Requested neighbors, kept so the rank can be recomputed when the
    /// target parent is rebalanced underneath the move.
    pub before_id: Option<EntityId>,
    pub after_id: Option<EntityId>,
}

/// What a local move asks the coordinator to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveCommand {
    pub mutation_id: Uuid,
    pub entity_id: EntityId,
    pub new_parent_id: EntityId,
    pub before_id: Option<EntityId>,
    pub after_id: Option<EntityId>,
    /// The locally computed rank. Advisory only; the coordinator recomputes
    /// against authoritative neighbors.
    pub optimistic_rank: RankKey,
    pub origin_client_id: ClientId,
}

/// Authoritative children of a set of parents as of `sequence`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardSnapshot {
    /// Board channel sequence the snapshot is consistent with.
    pub sequence: u64,
    pub parents: BTreeMap<EntityId, Vec<OrderedItem>>,
    /// Requested parents that were deleted; the view forgets them.
    pub removed: BTreeSet<EntityId>,
}
