//! # Core Domain Entities
//!
//! Identifiers and the ordered item model shared by every component.
//!
//! ## Clusters
//!
//! - **Identity**: `TenantId`, `CallerId`, `ClientId`
//! - **Board**: `BoardId`, `EntityId`, `EntityKind`
//! - **Ordering**: `RankKey`, `OrderedItem`

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

// =============================================================================
// CLUSTER A: IDENTITY
// =============================================================================

string_id!(
    /// Verified tenant (organization) identifier supplied by the identity layer.
    ///
    /// Construction never validates; validation happens in the channel
    /// namespace before any I/O.
    TenantId
);

string_id!(
    /// Verified user identifier supplied by the identity layer.
    CallerId
);

string_id!(
    /// Identifies one connected client (one browser tab, one bus connection).
    ClientId
);

impl ClientId {
    /// Generate a fresh random client id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

// =============================================================================
// CLUSTER B: BOARD
// =============================================================================

string_id!(
    /// Board identifier; scopes the `board` broadcast channel.
    BoardId
);

string_id!(
    /// Identifier of a card or list. Lists double as parents of cards and a
    /// board id doubles as the parent of its lists.
    EntityId
);

impl From<&BoardId> for EntityId {
    fn from(board: &BoardId) -> Self {
        Self(board.as_str().to_string())
    }
}

/// Kind of entity participating in a sibling ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A card within a list.
    Card,
    /// A list within a board.
    List,
}

// =============================================================================
// CLUSTER C: ORDERING
// =============================================================================

/// Opaque, totally ordered sibling position.
///
/// Ordering is plain lexicographic string comparison. The empty key sorts
/// before every other key and is never assigned to a persisted item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct RankKey(String);

impl RankKey {
    /// Wrap a raw rank string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The empty key (sorts before everything).
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RankKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RankKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RankKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Any entity participating in a sibling ordering.
///
/// Within one `parent_id` all ranks are distinct and the sort order by rank
/// is the display order. The payload is opaque to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderedItem {
    /// Unique within the parent scope.
    pub id: EntityId,
    /// The list or board this item belongs to.
    pub parent_id: EntityId,
    /// Current position among siblings.
    pub rank: RankKey,
    /// Business payload (titles, descriptions, ...). Never interpreted here.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl OrderedItem {
    pub fn new(id: impl Into<EntityId>, parent_id: impl Into<EntityId>, rank: impl Into<RankKey>) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.into(),
            rank: rank.into(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Same item, new rank. Ranks are replaced, never edited in place.
    pub fn with_rank(&self, rank: RankKey) -> Self {
        Self {
            rank,
            ..self.clone()
        }
    }
}

/// Sort siblings into display order; ties (which must not exist in
/// authoritative state) fall back to the id so every client agrees.
pub fn sort_by_rank(items: &mut [OrderedItem]) {
    items.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.id.cmp(&b.id)));
}

/// Whether any two siblings share a rank.
pub fn has_duplicate_ranks(items: &[OrderedItem]) -> bool {
    let mut seen = std::collections::HashSet::with_capacity(items.len());
    items.iter().any(|item| !seen.insert(&item.rank))
}
