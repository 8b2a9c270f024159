//! Value objects for the Reorder Coordinator

use shared_types::{
    BoardId, CallerId, ClientId, EntityId, EntityKind, OrderedItem, RankKey, TenantId,
};
use std::collections::{BTreeMap, BTreeSet};

/// Request to move an entity to a slot in a parent.
///
/// `before_id`/`after_id` name the siblings the entity should land after and
/// before. Both absent means append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRequest {
    pub tenant_id: TenantId,
    pub caller_id: CallerId,
    pub entity_id: EntityId,
    pub new_parent_id: EntityId,
    pub before_id: Option<EntityId>,
    pub after_id: Option<EntityId>,
    pub origin_client_id: Option<ClientId>,
}

/// Request to create a card or list at a slot.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRequest {
    pub tenant_id: TenantId,
    pub caller_id: CallerId,
    /// Caller-chosen id; re-sending the same id is idempotent.
    pub entity_id: EntityId,
    pub kind: EntityKind,
    pub parent_id: EntityId,
    pub before_id: Option<EntityId>,
    pub after_id: Option<EntityId>,
    pub payload: serde_json::Value,
    pub origin_client_id: Option<ClientId>,
}

/// Request to replace an entity's payload.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub tenant_id: TenantId,
    pub caller_id: CallerId,
    pub entity_id: EntityId,
    pub payload: serde_json::Value,
    pub origin_client_id: Option<ClientId>,
}

/// Request to delete an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub tenant_id: TenantId,
    pub caller_id: CallerId,
    pub entity_id: EntityId,
    pub origin_client_id: Option<ClientId>,
}

/// A stored entity and where it lives.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntity {
    pub kind: EntityKind,
    pub board_id: BoardId,
    pub item: OrderedItem,
}

/// Children of one parent as read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ParentSnapshot {
    pub parent_id: EntityId,
    pub board_id: BoardId,
    /// Kind of entity this parent holds: lists for a board, cards for a list.
    pub child_kind: EntityKind,
    /// Sorted by rank.
    pub children: Vec<OrderedItem>,
}

/// A rank write guarded by the neighbors it was computed against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistMove {
    pub entity_id: EntityId,
    pub parent_id: EntityId,
    pub rank: RankKey,
    pub expected_before: Option<EntityId>,
    pub expected_after: Option<EntityId>,
}

/// A new entity guarded the same way as [`PersistMove`].
#[derive(Debug, Clone, PartialEq)]
pub struct PersistCreate {
    pub entity_id: EntityId,
    pub kind: EntityKind,
    pub parent_id: EntityId,
    pub rank: RankKey,
    pub payload: serde_json::Value,
    pub expected_before: Option<EntityId>,
    pub expected_after: Option<EntityId>,
}

/// Authoritative children of a set of parents, consistent with the board
/// channel at `sequence`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSnapshot {
    pub board_id: BoardId,
    pub sequence: u64,
    pub parents: BTreeMap<EntityId, Vec<OrderedItem>>,
    /// Requested parents that no longer exist on the board.
    pub removed: BTreeSet<EntityId>,
}
