//! # Client Order View
//!
//! Per-client ordered view of a board: confirmed state from the coordinator
//! with this client's optimistic moves layered on top.
//!
//! ## State Machine (per entity)
//!
//! ```text
//!            move_locally                canonical envelope
//!   Idle ─────────────────▶ Pending ─────────────────────────▶ Idle
//!    │                        │         (Confirmed/Overridden)
//!    │ remote envelope        │ revert
//!    ▼                        ▼
//! Reconciling ──▶ Idle       Idle (Reverted)
//! ```
//!
//! ## Invariants
//!
//! - Canonical wins: a non-stale envelope for an entity always replaces
//!   any optimistic state for it (except `Updated`, which carries no
//!   position).
//! - Every entity appears in exactly one parent list; lists are rebuilt in
//!   the same `&mut self` call that changes them.
//! - No two siblings in a rendered list share a rank. A pending rank that
//!   collides with a confirmed one is nudged upward locally.

use crate::domain::errors::ReconcileError;
use crate::domain::value_objects::{
    BoardSnapshot, EntityState, MoveCommand, PendingMove, Transition, ViewChange,
};
use crate::ports::outbound::ViewObserver;
use bs_01_rank_keys::{between, rank_for_slot, resolve_slot};
use shared_bus::SequenceTracker;
use shared_types::{
    BoardId, ClientId, EntityId, Mutation, MutationEnvelope, OrderedItem, RankAssignment, RankKey,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// One client's ordered view of one board.
pub struct ClientOrderView {
    client_id: ClientId,
    board_id: BoardId,
    confirmed: HashMap<EntityId, OrderedItem>,
    pending: HashMap<EntityId, PendingMove>,
    sequences: SequenceTracker,
    lists: HashMap<EntityId, Vec<OrderedItem>>,
    known_parents: BTreeSet<EntityId>,
    reconciling: Option<EntityId>,
    observers: Vec<Arc<dyn ViewObserver>>,
}

impl ClientOrderView {
    pub fn new(client_id: ClientId, board_id: BoardId) -> Self {
        Self {
            client_id,
            board_id,
            confirmed: HashMap::new(),
            pending: HashMap::new(),
            sequences: SequenceTracker::new(),
            lists: HashMap::new(),
            known_parents: BTreeSet::new(),
            reconciling: None,
            observers: Vec::new(),
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn board_id(&self) -> &BoardId {
        &self.board_id
    }

    /// Register a re-render hook.
    pub fn observe(&mut self, observer: Arc<dyn ViewObserver>) {
        self.observers.push(observer);
    }

    /// Ordered children of `parent` as currently rendered.
    #[must_use]
    pub fn items(&self, parent: &EntityId) -> Vec<OrderedItem> {
        self.lists.get(parent).cloned().unwrap_or_default()
    }

    /// The entity as currently rendered (pending position applied).
    #[must_use]
    pub fn item(&self, entity_id: &EntityId) -> Option<OrderedItem> {
        self.confirmed
            .get(entity_id)
            .map(|item| self.effective(item))
    }

    #[must_use]
    pub fn state_of(&self, entity_id: &EntityId) -> EntityState {
        if self.reconciling.as_ref() == Some(entity_id) {
            EntityState::Reconciling
        } else if self.pending.contains_key(entity_id) {
            EntityState::Pending
        } else {
            EntityState::Idle
        }
    }

    #[must_use]
    pub fn pending(&self, entity_id: &EntityId) -> Option<&PendingMove> {
        self.pending.get(entity_id)
    }

    /// Parents touched by an in-flight optimistic move (source and target).
    #[must_use]
    pub fn parents_with_pending(&self) -> BTreeSet<EntityId> {
        let mut parents = BTreeSet::new();
        for (entity_id, pending) in &self.pending {
            parents.insert(pending.parent_id.clone());
            if let Some(item) = self.confirmed.get(entity_id) {
                parents.insert(item.parent_id.clone());
            }
        }
        parents
    }

    /// Every parent this view has rendered.
    #[must_use]
    pub fn known_parents(&self) -> Vec<EntityId> {
        self.known_parents.iter().cloned().collect()
    }

    /// Highest board sequence reflected in the view.
    #[must_use]
    pub fn last_sequence(&self) -> u64 {
        self.sequences.high_water()
    }

    // =========================================================================
    // LOCAL MUTATIONS
    // =========================================================================

    /// `Idle -> Pending`: move `entity_id` into `new_parent_id` next to the
    /// given neighbors and re-render immediately.
    ///
    /// # Errors
    ///
    /// - `ReconcileError::UnknownEntity` - entity not in the view
    /// - `ReconcileError::UnknownNeighbor` - neighbor not in the target parent
    pub fn move_locally(
        &mut self,
        entity_id: &EntityId,
        new_parent_id: &EntityId,
        before_id: Option<&EntityId>,
        after_id: Option<&EntityId>,
    ) -> Result<MoveCommand, ReconcileError> {
        let current = self
            .item(entity_id)
            .ok_or_else(|| ReconcileError::UnknownEntity(entity_id.clone()))?;

        let siblings = self.items(new_parent_id);
        let slot = resolve_slot(&siblings, entity_id, before_id, after_id)?;
        let rank = rank_for_slot(&slot);
        let mutation_id = Uuid::new_v4();

        let mut parents = self.parents_of(entity_id);
        parents.insert(current.parent_id);
        parents.insert(new_parent_id.clone());

        self.pending.insert(
            entity_id.clone(),
            PendingMove {
                mutation_id,
                parent_id: new_parent_id.clone(),
                rank: rank.clone(),
                before_id: before_id.cloned(),
                after_id: after_id.cloned(),
            },
        );
        self.known_parents.insert(new_parent_id.clone());
        self.rebuild(&parents);

        debug!(
            entity_id = %entity_id,
            parent_id = %new_parent_id,
            rank = %rank,
            "Applied optimistic move"
        );
        self.notify(ViewChange {
            entity_id: entity_id.clone(),
            parents: parents.into_iter().collect(),
            transition: Transition::Optimistic,
        });

        Ok(MoveCommand {
            mutation_id,
            entity_id: entity_id.clone(),
            new_parent_id: new_parent_id.clone(),
            before_id: before_id.cloned(),
            after_id: after_id.cloned(),
            optimistic_rank: self
                .pending
                .get(entity_id)
                .map_or(rank, |p| p.rank.clone()),
            origin_client_id: self.client_id.clone(),
        })
    }

    /// `Pending -> Idle` after the coordinator rejected the move. Restores the
    /// last confirmed order. No-op when `mutation_id` is no longer the
    /// entity's pending move.
    pub fn revert(
        &mut self,
        entity_id: &EntityId,
        mutation_id: Uuid,
        notice: impl Into<String>,
    ) -> Option<ViewChange> {
        if !self.is_pending_mutation(entity_id, mutation_id) {
            return None;
        }

        let parents = self.parents_of(entity_id);
        self.pending.remove(entity_id);
        self.rebuild(&parents);

        let notice = notice.into();
        info!(entity_id = %entity_id, notice = %notice, "Optimistic move reverted");
        Some(self.notify(ViewChange {
            entity_id: entity_id.clone(),
            parents: parents.into_iter().collect(),
            transition: Transition::Reverted { notice },
        }))
    }

    // =========================================================================
    // REMOTE ENVELOPES
    // =========================================================================

    /// Merge a canonical envelope. Returns `None` when it was stale.
    pub fn apply_remote(&mut self, envelope: &MutationEnvelope) -> Option<ViewChange> {
        let entity_id = &envelope.entity_id;
        let sequence = envelope.sequence_hint;

        if let Mutation::Rebalanced { assignments } = &envelope.mutation {
            return self.apply_rebalance(entity_id, assignments, sequence);
        }

        if self.sequences.is_stale(entity_id, sequence) {
            debug!(
                entity_id = %entity_id,
                sequence,
                floor = self.sequences.floor(),
                "Ignoring stale envelope"
            );
            return None;
        }

        self.reconciling = Some(entity_id.clone());
        let mut parents = self.parents_of(entity_id);
        let positional = !matches!(envelope.mutation, Mutation::Updated { .. });
        let had_pending = positional && self.pending.remove(entity_id).is_some();

        match &envelope.mutation {
            Mutation::Created {
                parent_id,
                rank,
                payload,
            } => {
                let item = OrderedItem::new(entity_id.clone(), parent_id.clone(), rank.clone())
                    .with_payload(payload.clone());
                self.confirmed.insert(entity_id.clone(), item);
                parents.insert(parent_id.clone());
            }
            Mutation::Moved { parent_id, rank } => {
                match self.confirmed.get_mut(entity_id) {
                    Some(item) => {
                        item.parent_id = parent_id.clone();
                        item.rank = rank.clone();
                    }
                    None => {
                        self.confirmed.insert(
                            entity_id.clone(),
                            OrderedItem::new(entity_id.clone(), parent_id.clone(), rank.clone()),
                        );
                    }
                }
                parents.insert(parent_id.clone());
            }
            Mutation::Deleted { parent_id } => {
                self.confirmed.remove(entity_id);
                self.drop_children(entity_id, &mut parents);
                parents.insert(parent_id.clone());
            }
            Mutation::Updated { payload } => {
                if let Some(item) = self.confirmed.get_mut(entity_id) {
                    item.payload = payload.clone();
                }
            }
            Mutation::Rebalanced { .. } => {}
        }

        self.sequences.record(entity_id, sequence);
        self.known_parents.extend(parents.iter().cloned());
        self.rebuild(&parents);
        self.reconciling = None;

        let transition = match (had_pending, envelope.originated_from(&self.client_id)) {
            (true, true) => Transition::Confirmed,
            (true, false) => Transition::Overridden,
            (false, _) => Transition::Reconciled,
        };
        debug!(
            entity_id = %entity_id,
            kind = envelope.kind().as_str(),
            sequence,
            transition = ?transition,
            "Merged canonical envelope"
        );

        Some(self.notify(ViewChange {
            entity_id: entity_id.clone(),
            parents: parents.into_iter().collect(),
            transition,
        }))
    }

    /// Merge the coordinator's direct answer to our own `mutation_id`.
    ///
    /// Like [`apply_remote`](Self::apply_remote), but when the envelope is
    /// already covered (its echo arrived first, or the move was a no-op) the
    /// matching pending marker is still cleared.
    pub fn apply_confirmation(
        &mut self,
        mutation_id: Uuid,
        envelope: &MutationEnvelope,
    ) -> Option<ViewChange> {
        if let Some(change) = self.apply_remote(envelope) {
            return Some(change);
        }

        let entity_id = &envelope.entity_id;
        if !self.is_pending_mutation(entity_id, mutation_id) {
            return None;
        }

        let parents = self.parents_of(entity_id);
        self.pending.remove(entity_id);
        self.rebuild(&parents);
        Some(self.notify(ViewChange {
            entity_id: entity_id.clone(),
            parents: parents.into_iter().collect(),
            transition: Transition::Confirmed,
        }))
    }

    fn apply_rebalance(
        &mut self,
        parent_id: &EntityId,
        assignments: &[RankAssignment],
        sequence: u64,
    ) -> Option<ViewChange> {
        let mut parents = BTreeSet::from([parent_id.clone()]);
        let mut applied = 0usize;

        for assignment in assignments {
            if self.sequences.is_stale(&assignment.entity_id, sequence) {
                continue;
            }
            if let Some(item) = self.confirmed.get_mut(&assignment.entity_id) {
                if item.parent_id != *parent_id {
                    parents.insert(item.parent_id.clone());
                    item.parent_id = parent_id.clone();
                }
                item.rank = assignment.rank.clone();
            }
            self.sequences.record(&assignment.entity_id, sequence);
            applied += 1;
        }

        if applied == 0 {
            debug!(parent_id = %parent_id, sequence, "Ignoring stale rebalance");
            return None;
        }

        self.known_parents.insert(parent_id.clone());
        self.rebuild(&parents);
        self.replace_pending_into(parent_id);

        debug!(parent_id = %parent_id, sequence, applied, "Merged rebalance");
        Some(self.notify(ViewChange {
            entity_id: parent_id.clone(),
            parents: parents.into_iter().collect(),
            transition: Transition::Reconciled,
        }))
    }

    /// Recompute ranks of pending moves into `parent_id` from their requested
    /// neighbors, after the parent's confirmed ranks were replaced.
    fn replace_pending_into(&mut self, parent_id: &EntityId) {
        let mut moving: Vec<EntityId> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.parent_id == *parent_id)
            .map(|(entity_id, _)| entity_id.clone())
            .collect();
        if moving.is_empty() {
            return;
        }
        moving.sort();

        let parents = BTreeSet::from([parent_id.clone()]);
        for entity_id in moving {
            let siblings = self.items(parent_id);
            let Some(pending) = self.pending.get(&entity_id) else {
                continue;
            };
            if let Ok(slot) = resolve_slot(
                &siblings,
                &entity_id,
                pending.before_id.as_ref(),
                pending.after_id.as_ref(),
            ) {
                let rank = rank_for_slot(&slot);
                if let Some(pending) = self.pending.get_mut(&entity_id) {
                    pending.rank = rank;
                }
                self.rebuild(&parents);
            }
        }
    }

    // =========================================================================
    // SNAPSHOTS
    // =========================================================================

    /// Replace confirmed state for the snapshot's parents.
    ///
    /// Entities changed by an envelope newer than the snapshot keep their
    /// newer state. Pending moves touching a reloaded parent are dropped; the
    /// coordinator's answer, if any, still merges afterwards.
    pub fn load_snapshot(&mut self, snapshot: BoardSnapshot) -> ViewChange {
        let BoardSnapshot {
            sequence,
            parents,
            removed,
        } = snapshot;
        let reloaded: BTreeSet<EntityId> = parents.keys().cloned().collect();
        let mut affected = reloaded.clone();

        for parent_id in &removed {
            self.drop_children(parent_id, &mut affected);
        }

        let outdated: Vec<EntityId> = self
            .confirmed
            .values()
            .filter(|item| reloaded.contains(&item.parent_id))
            .filter(|item| !is_newer(&self.sequences, &item.id, sequence))
            .map(|item| item.id.clone())
            .collect();
        for entity_id in outdated {
            self.confirmed.remove(&entity_id);
        }

        for (parent_id, children) in parents {
            for mut child in children {
                if is_newer(&self.sequences, &child.id, sequence) {
                    continue;
                }
                child.parent_id = parent_id.clone();
                if let Some(previous) = self.confirmed.insert(child.id.clone(), child) {
                    affected.insert(previous.parent_id);
                }
            }
        }

        let dropped: Vec<EntityId> = self
            .pending
            .iter()
            .filter(|(entity_id, pending)| {
                reloaded.contains(&pending.parent_id)
                    || self
                        .confirmed
                        .get(*entity_id)
                        .map_or(true, |item| reloaded.contains(&item.parent_id))
            })
            .map(|(entity_id, _)| entity_id.clone())
            .collect();
        for entity_id in &dropped {
            if let Some(pending) = self.pending.remove(entity_id) {
                affected.insert(pending.parent_id);
            }
        }

        self.sequences.raise_floor(sequence);
        self.known_parents.extend(reloaded);
        self.rebuild(&affected);

        info!(
            board_id = %self.board_id,
            sequence,
            parents = affected.len(),
            removed = removed.len(),
            dropped_pending = dropped.len(),
            "View resynced from snapshot"
        );
        self.notify(ViewChange {
            entity_id: EntityId::from(&self.board_id),
            parents: affected.into_iter().collect(),
            transition: Transition::Resynced,
        })
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn effective(&self, item: &OrderedItem) -> OrderedItem {
        match self.pending.get(&item.id) {
            Some(pending) => {
                let mut item = item.clone();
                item.parent_id = pending.parent_id.clone();
                item.rank = pending.rank.clone();
                item
            }
            None => item.clone(),
        }
    }

    /// Forget a deleted parent along with everything rendered under it.
    ///
    /// Children leave the view together with their pending moves, so the
    /// parents those moves targeted are added to `parents` for rebuilding.
    /// Pending moves into the deleted parent are dropped and their confirmed
    /// parents are rebuilt too.
    fn drop_children(&mut self, deleted: &EntityId, parents: &mut BTreeSet<EntityId>) -> usize {
        let orphans: Vec<EntityId> = self
            .confirmed
            .values()
            .filter(|item| item.parent_id == *deleted)
            .map(|item| item.id.clone())
            .collect();
        for orphan in &orphans {
            self.confirmed.remove(orphan);
            if let Some(pending) = self.pending.remove(orphan) {
                parents.insert(pending.parent_id);
            }
        }

        let stranded: Vec<EntityId> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.parent_id == *deleted)
            .map(|(id, _)| id.clone())
            .collect();
        for entity_id in stranded {
            self.pending.remove(&entity_id);
            if let Some(item) = self.confirmed.get(&entity_id) {
                parents.insert(item.parent_id.clone());
            }
        }

        parents.remove(deleted);
        self.known_parents.remove(deleted);
        if self.lists.remove(deleted).is_some() {
            debug!(parent_id = %deleted, children = orphans.len(), "Dropped deleted parent");
        }
        orphans.len()
    }

    fn parents_of(&self, entity_id: &EntityId) -> BTreeSet<EntityId> {
        let mut parents = BTreeSet::new();
        if let Some(item) = self.confirmed.get(entity_id) {
            parents.insert(item.parent_id.clone());
        }
        if let Some(pending) = self.pending.get(entity_id) {
            parents.insert(pending.parent_id.clone());
        }
        parents
    }

    fn is_pending_mutation(&self, entity_id: &EntityId, mutation_id: Uuid) -> bool {
        self.pending
            .get(entity_id)
            .is_some_and(|pending| pending.mutation_id == mutation_id)
    }

    /// Re-materialize the ordered lists of `parents`.
    fn rebuild(&mut self, parents: &BTreeSet<EntityId>) {
        for parent_id in parents {
            let mut entries: Vec<(OrderedItem, bool)> = self
                .confirmed
                .values()
                .map(|item| (self.effective(item), self.pending.contains_key(&item.id)))
                .filter(|(item, _)| item.parent_id == *parent_id)
                .collect();

            // Confirmed before pending on equal ranks, so only pending ranks
            // ever move.
            entries.sort_by(|(a, a_pending), (b, b_pending)| {
                a.rank
                    .cmp(&b.rank)
                    .then(a_pending.cmp(b_pending))
                    .then_with(|| a.id.cmp(&b.id))
            });

            for (entity_id, rank) in nudge_collisions(&mut entries) {
                debug!(entity_id = %entity_id, rank = %rank, "Nudged colliding pending rank");
                if let Some(pending) = self.pending.get_mut(&entity_id) {
                    pending.rank = rank;
                }
            }

            self.lists.insert(
                parent_id.clone(),
                entries.into_iter().map(|(item, _)| item).collect(),
            );
        }
    }

    fn notify(&self, change: ViewChange) -> ViewChange {
        for observer in &self.observers {
            observer.on_change(&change);
        }
        change
    }
}

fn is_newer(sequences: &SequenceTracker, entity_id: &EntityId, sequence: u64) -> bool {
    sequences
        .last_applied(entity_id)
        .is_some_and(|applied| applied > sequence)
}

/// Lift pending entries that do not sort strictly after their predecessor.
/// `entries` must be sorted with confirmed entries first among equal ranks.
fn nudge_collisions(entries: &mut [(OrderedItem, bool)]) -> Vec<(EntityId, RankKey)> {
    let mut nudged = Vec::new();
    for i in 1..entries.len() {
        let lower = entries[i - 1].0.rank.clone();
        let (item, is_pending) = &entries[i];
        if !*is_pending || item.rank > lower {
            continue;
        }

        let upper = entries[i + 1..]
            .iter()
            .map(|(item, _)| &item.rank)
            .find(|rank| **rank > lower)
            .cloned();
        let rank = between(Some(&lower), upper.as_ref());
        entries[i].0.rank = rank.clone();
        nudged.push((entries[i].0.id.clone(), rank));
    }
    nudged
}
