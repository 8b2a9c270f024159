//! Placement
//!
//! Translates "put this item after `before_id` / before `after_id`" into the
//! two neighbor ranks the key must fall between, against one sibling list.

use crate::algorithms::fractional::between;
use shared_types::{sort_by_rank, EntityId, OrderedItem, RankKey};
use thiserror::Error;

/// Placement failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlacementError {
    /// A requested neighbor is not a sibling in the target parent.
    #[error("Neighbor {0} is not a sibling in the target parent")]
    UnknownNeighbor(EntityId),
}

/// The gap an item is being placed into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slot {
    /// Sibling directly preceding the gap.
    pub before_id: Option<EntityId>,
    pub before_rank: Option<RankKey>,
    /// Sibling directly following the gap.
    pub after_id: Option<EntityId>,
    pub after_rank: Option<RankKey>,
}

/// Resolve the gap for `moving` among `children`.
///
/// `moving` itself is ignored when present. Resolution rules:
///
/// - `before_id` given: the gap directly follows it (`after_id` is only
///   checked for existence, so stale non-adjacent pairs resolve the same way
///   on every replica)
/// - only `after_id` given: the gap directly precedes it
/// - neither: append after the last sibling
///
/// # Errors
///
/// `PlacementError::UnknownNeighbor` when a requested neighbor is missing.
pub fn resolve_slot(
    children: &[OrderedItem],
    moving: &EntityId,
    before_id: Option<&EntityId>,
    after_id: Option<&EntityId>,
) -> Result<Slot, PlacementError> {
    let mut siblings: Vec<OrderedItem> = children
        .iter()
        .filter(|item| item.id != *moving)
        .cloned()
        .collect();
    sort_by_rank(&mut siblings);

    let position = |id: &EntityId| {
        siblings
            .iter()
            .position(|item| item.id == *id)
            .ok_or_else(|| PlacementError::UnknownNeighbor(id.clone()))
    };

    let (predecessor, successor) = match (before_id, after_id) {
        (Some(before), after) => {
            if let Some(after) = after {
                position(after)?;
            }
            let i = position(before)?;
            (Some(i), (i + 1 < siblings.len()).then_some(i + 1))
        }
        (None, Some(after)) => {
            let j = position(after)?;
            (j.checked_sub(1), Some(j))
        }
        (None, None) => (siblings.len().checked_sub(1), None),
    };

    let predecessor = predecessor.map(|i| &siblings[i]);
    let successor = successor.map(|i| &siblings[i]);

    Ok(Slot {
        before_id: predecessor.map(|item| item.id.clone()),
        before_rank: predecessor.map(|item| item.rank.clone()),
        after_id: successor.map(|item| item.id.clone()),
        after_rank: successor.map(|item| item.rank.clone()),
    })
}

/// A fresh rank inside `slot`.
#[must_use]
pub fn rank_for_slot(slot: &Slot) -> RankKey {
    between(slot.before_rank.as_ref(), slot.after_rank.as_ref())
}

/// Whether `entity` already sits exactly in `slot` within `children`.
#[must_use]
pub fn occupies_slot(children: &[OrderedItem], entity: &EntityId, slot: &Slot) -> bool {
    let mut ordered = children.to_vec();
    sort_by_rank(&mut ordered);

    let Some(index) = ordered.iter().position(|item| item.id == *entity) else {
        return false;
    };
    let predecessor = index.checked_sub(1).map(|i| ordered[i].id.clone());
    let successor = ordered.get(index + 1).map(|item| item.id.clone());

    predecessor == slot.before_id && successor == slot.after_id
}
