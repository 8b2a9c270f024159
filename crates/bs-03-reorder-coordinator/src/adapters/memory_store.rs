//! In-memory order store
//!
//! Tenant-partitioned storage with the same optimistic placement check a
//! database-backed store applies: a write names the neighbors its rank was
//! computed against and is refused when they are no longer adjacent.

use crate::domain::errors::StoreError;
use crate::domain::value_objects::{ParentSnapshot, PersistCreate, PersistMove, StoredEntity};
use crate::ports::outbound::OrderStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{
    has_duplicate_ranks, sort_by_rank, BoardId, EntityId, EntityKind, OrderedItem, RankAssignment,
    RankKey, TenantId,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::debug;

#[derive(Debug, Clone)]
struct ParentRecord {
    board_id: BoardId,
    child_kind: EntityKind,
}

#[derive(Debug, Default)]
struct TenantData {
    parents: HashMap<EntityId, ParentRecord>,
    entities: HashMap<EntityId, StoredEntity>,
}

impl TenantData {
    fn parent(&self, parent_id: &EntityId) -> Result<&ParentRecord, StoreError> {
        self.parents
            .get(parent_id)
            .ok_or_else(|| StoreError::NotFound(format!("parent {parent_id}")))
    }

    fn children(&self, parent_id: &EntityId) -> Vec<OrderedItem> {
        let mut children: Vec<OrderedItem> = self
            .entities
            .values()
            .filter(|entity| entity.item.parent_id == *parent_id)
            .map(|entity| entity.item.clone())
            .collect();
        sort_by_rank(&mut children);
        children
    }

    fn check_accepts(
        &self,
        parent_id: &EntityId,
        kind: EntityKind,
        board_id: Option<&BoardId>,
    ) -> Result<&ParentRecord, StoreError> {
        let parent = self.parent(parent_id)?;
        if parent.child_kind != kind || board_id.is_some_and(|board| *board != parent.board_id) {
            return Err(StoreError::NotFound(format!(
                "parent {parent_id} holding {kind:?} entities"
            )));
        }
        Ok(parent)
    }

    /// Refuse `rank` unless `expected_before`/`expected_after` are exactly
    /// the siblings it falls between.
    fn check_placement(
        &self,
        parent_id: &EntityId,
        entity_id: &EntityId,
        rank: &RankKey,
        expected_before: Option<&EntityId>,
        expected_after: Option<&EntityId>,
    ) -> Result<(), StoreError> {
        let siblings: Vec<&OrderedItem> = self
            .entities
            .values()
            .map(|entity| &entity.item)
            .filter(|item| item.parent_id == *parent_id && item.id != *entity_id)
            .collect();

        let conflict = |reason: String| StoreError::Conflict {
            parent_id: parent_id.clone(),
            reason,
        };

        if siblings.iter().any(|item| item.rank == *rank) {
            return Err(conflict(format!("rank {rank} is taken")));
        }

        let predecessor = siblings
            .iter()
            .filter(|item| item.rank < *rank)
            .max_by(|a, b| a.rank.cmp(&b.rank))
            .map(|item| &item.id);
        let successor = siblings
            .iter()
            .filter(|item| item.rank > *rank)
            .min_by(|a, b| a.rank.cmp(&b.rank))
            .map(|item| &item.id);

        if predecessor != expected_before || successor != expected_after {
            return Err(conflict(format!(
                "neighbors changed: expected ({expected_before:?}, {expected_after:?}), \
                 found ({predecessor:?}, {successor:?})"
            )));
        }
        Ok(())
    }
}

/// Order store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    tenants: RwLock<HashMap<TenantId, TenantData>>,
    injected_conflicts: AtomicU32,
    unavailable: AtomicBool,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `board_id` as a parent of lists.
    pub fn add_board(&self, tenant_id: &TenantId, board_id: &BoardId) {
        self.tenants
            .write()
            .entry(tenant_id.clone())
            .or_default()
            .parents
            .insert(
                EntityId::from(board_id),
                ParentRecord {
                    board_id: board_id.clone(),
                    child_kind: EntityKind::List,
                },
            );
    }

    /// Seed an item without the placement check. Lists become parents of
    /// cards.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` when the parent is unknown or holds another
    /// kind of entity.
    pub fn insert_item(
        &self,
        tenant_id: &TenantId,
        kind: EntityKind,
        item: OrderedItem,
    ) -> Result<(), StoreError> {
        let mut tenants = self.tenants.write();
        let data = tenants
            .get_mut(tenant_id)
            .ok_or_else(|| StoreError::NotFound(format!("tenant {tenant_id}")))?;
        let board_id = data.check_accepts(&item.parent_id, kind, None)?.board_id.clone();
        insert_entity(data, kind, board_id, item);
        Ok(())
    }

    /// Make the next `count` placement writes fail with a conflict.
    pub fn inject_conflicts(&self, count: u32) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Current children of `parent_id`, sorted by rank. Empty when unknown.
    pub fn children(&self, tenant_id: &TenantId, parent_id: &EntityId) -> Vec<OrderedItem> {
        self.tenants
            .read()
            .get(tenant_id)
            .map(|data| data.children(parent_id))
            .unwrap_or_default()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store marked unavailable".into()));
        }
        Ok(())
    }

    fn take_injected_conflict(&self, parent_id: &EntityId) -> Result<(), StoreError> {
        let injected = self
            .injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            debug!(parent_id = %parent_id, "Injected store conflict");
            return Err(StoreError::Conflict {
                parent_id: parent_id.clone(),
                reason: "injected".into(),
            });
        }
        Ok(())
    }

    fn with_tenant<T>(
        &self,
        tenant_id: &TenantId,
        f: impl FnOnce(&mut TenantData) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.check_available()?;
        let mut tenants = self.tenants.write();
        let data = tenants
            .get_mut(tenant_id)
            .ok_or_else(|| StoreError::NotFound(format!("tenant {tenant_id}")))?;
        f(data)
    }
}

fn insert_entity(data: &mut TenantData, kind: EntityKind, board_id: BoardId, item: OrderedItem) {
    if kind == EntityKind::List {
        data.parents.insert(
            item.id.clone(),
            ParentRecord {
                board_id: board_id.clone(),
                child_kind: EntityKind::Card,
            },
        );
    }
    data.entities.insert(
        item.id.clone(),
        StoredEntity {
            kind,
            board_id,
            item,
        },
    );
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn find_entity(
        &self,
        tenant_id: &TenantId,
        entity_id: &EntityId,
    ) -> Result<Option<StoredEntity>, StoreError> {
        self.check_available()?;
        Ok(self
            .tenants
            .read()
            .get(tenant_id)
            .and_then(|data| data.entities.get(entity_id).cloned()))
    }

    async fn load_children(
        &self,
        tenant_id: &TenantId,
        parent_id: &EntityId,
    ) -> Result<ParentSnapshot, StoreError> {
        self.check_available()?;
        let tenants = self.tenants.read();
        let data = tenants
            .get(tenant_id)
            .ok_or_else(|| StoreError::NotFound(format!("parent {parent_id}")))?;
        let parent = data.parent(parent_id)?;
        Ok(ParentSnapshot {
            parent_id: parent_id.clone(),
            board_id: parent.board_id.clone(),
            child_kind: parent.child_kind,
            children: data.children(parent_id),
        })
    }

    async fn persist_move(
        &self,
        tenant_id: &TenantId,
        write: &PersistMove,
    ) -> Result<OrderedItem, StoreError> {
        self.with_tenant(tenant_id, |data| {
            let entity = data
                .entities
                .get(&write.entity_id)
                .ok_or_else(|| StoreError::NotFound(format!("entity {}", write.entity_id)))?;
            data.check_accepts(&write.parent_id, entity.kind, Some(&entity.board_id))?;
            self.take_injected_conflict(&write.parent_id)?;
            data.check_placement(
                &write.parent_id,
                &write.entity_id,
                &write.rank,
                write.expected_before.as_ref(),
                write.expected_after.as_ref(),
            )?;

            let entity = data
                .entities
                .get_mut(&write.entity_id)
                .ok_or_else(|| StoreError::NotFound(format!("entity {}", write.entity_id)))?;
            entity.item.parent_id = write.parent_id.clone();
            entity.item.rank = write.rank.clone();
            Ok(entity.item.clone())
        })
    }

    async fn persist_create(
        &self,
        tenant_id: &TenantId,
        write: &PersistCreate,
    ) -> Result<OrderedItem, StoreError> {
        self.with_tenant(tenant_id, |data| {
            if data.entities.contains_key(&write.entity_id) {
                return Err(StoreError::Conflict {
                    parent_id: write.parent_id.clone(),
                    reason: format!("entity {} already exists", write.entity_id),
                });
            }
            let board_id = data
                .check_accepts(&write.parent_id, write.kind, None)?
                .board_id
                .clone();
            self.take_injected_conflict(&write.parent_id)?;
            data.check_placement(
                &write.parent_id,
                &write.entity_id,
                &write.rank,
                write.expected_before.as_ref(),
                write.expected_after.as_ref(),
            )?;

            let item = OrderedItem::new(write.entity_id.clone(), write.parent_id.clone(), write.rank.clone())
                .with_payload(write.payload.clone());
            insert_entity(data, write.kind, board_id, item.clone());
            Ok(item)
        })
    }

    async fn persist_payload(
        &self,
        tenant_id: &TenantId,
        entity_id: &EntityId,
        payload: serde_json::Value,
    ) -> Result<OrderedItem, StoreError> {
        self.with_tenant(tenant_id, |data| {
            let entity = data
                .entities
                .get_mut(entity_id)
                .ok_or_else(|| StoreError::NotFound(format!("entity {entity_id}")))?;
            entity.item.payload = payload;
            Ok(entity.item.clone())
        })
    }

    async fn persist_delete(
        &self,
        tenant_id: &TenantId,
        entity_id: &EntityId,
    ) -> Result<StoredEntity, StoreError> {
        self.with_tenant(tenant_id, |data| {
            let removed = data
                .entities
                .remove(entity_id)
                .ok_or_else(|| StoreError::NotFound(format!("entity {entity_id}")))?;
            if data.parents.remove(entity_id).is_some() {
                data.entities
                    .retain(|_, entity| entity.item.parent_id != *entity_id);
            }
            Ok(removed)
        })
    }

    async fn persist_rebalance(
        &self,
        tenant_id: &TenantId,
        parent_id: &EntityId,
        assignments: &[RankAssignment],
    ) -> Result<(), StoreError> {
        self.with_tenant(tenant_id, |data| {
            data.parent(parent_id)?;

            let current: HashSet<&EntityId> = data
                .entities
                .values()
                .filter(|entity| entity.item.parent_id == *parent_id)
                .map(|entity| &entity.item.id)
                .collect();
            let assigned: HashSet<&EntityId> = assignments.iter().map(|a| &a.entity_id).collect();
            let ranks: Vec<OrderedItem> = assignments
                .iter()
                .map(|a| OrderedItem::new(a.entity_id.clone(), parent_id.clone(), a.rank.clone()))
                .collect();

            if current != assigned || assigned.len() != assignments.len() || has_duplicate_ranks(&ranks) {
                return Err(StoreError::Conflict {
                    parent_id: parent_id.clone(),
                    reason: "children changed since the rebalance was computed".into(),
                });
            }

            for assignment in assignments {
                if let Some(entity) = data.entities.get_mut(&assignment.entity_id) {
                    entity.item.rank = assignment.rank.clone();
                }
            }
            Ok(())
        })
    }
}
