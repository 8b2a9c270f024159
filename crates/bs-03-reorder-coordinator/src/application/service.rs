//! Reorder Coordinator Service
//!
//! Main service implementing `ReorderApi`.
//!
//! A placement (move or create) runs this pipeline:
//! 1. Validate tenant and authorize caller
//! 2. Take the target parent's lock
//! 3. Read authoritative neighbors and compute the rank
//! 4. Under the board channel's sequencer: persist, assign sequence, publish
//! 5. On a store conflict, re-read and retry within the budget
//! 6. Rebalance the parent when the new key grew past the threshold

use crate::application::locks::{ChannelSequencer, ParentLocks};
use crate::config::CoordinatorConfig;
use crate::domain::errors::StoreError;
use crate::domain::value_objects::{
    CreateRequest, DeleteRequest, MoveRequest, OrderSnapshot, ParentSnapshot, PersistCreate,
    PersistMove, StoredEntity, UpdateRequest,
};
use crate::metrics;
use crate::ports::inbound::ReorderApi;
use crate::ports::outbound::{EnvelopePublisher, IdentityProvider, OrderStore};
use async_trait::async_trait;
use bs_01_rank_keys::{occupies_slot, rank_for_slot, rebalance, resolve_slot, PlacementError, Slot};
use shared_types::{
    board_channel, validate_tenant_id, BoardId, CallerId, ChannelId, EntityId, Mutation,
    MutationEnvelope, RankAssignment, SyncError, TenantId,
};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, error, info, warn};

/// Outcome of one placement attempt.
enum Attempt {
    /// Neighbors moved underneath us; re-read and recompute.
    Retry(String),
    Fail(SyncError),
}

impl From<StoreError> for Attempt {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { reason, .. } => Attempt::Retry(reason),
            other => Attempt::Fail(other.into()),
        }
    }
}

impl From<SyncError> for Attempt {
    fn from(err: SyncError) -> Self {
        Attempt::Fail(err)
    }
}

impl From<PlacementError> for Attempt {
    fn from(err: PlacementError) -> Self {
        Attempt::Retry(err.to_string())
    }
}

/// Reorder Coordinator
///
/// The single authority for rank assignment. Clients propose; the
/// coordinator decides, persists and broadcasts the canonical envelope.
pub struct ReorderCoordinator {
    config: CoordinatorConfig,
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn OrderStore>,
    publisher: Arc<dyn EnvelopePublisher>,
    parent_locks: ParentLocks,
    sequencer: ChannelSequencer,
}

impl ReorderCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn OrderStore>,
        publisher: Arc<dyn EnvelopePublisher>,
    ) -> Self {
        Self {
            config,
            identity,
            store,
            publisher,
            parent_locks: ParentLocks::new(),
            sequencer: ChannelSequencer::new(),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Release parent locks and channel mutexes that are neither held nor
    /// awaited. Channel sequences carry over.
    pub fn prune_locks(&self) -> usize {
        self.parent_locks.prune() + self.sequencer.prune()
    }

    async fn authorize(&self, tenant_id: &TenantId, caller_id: &CallerId) -> Result<(), SyncError> {
        if let Err(err) = validate_tenant_id(tenant_id) {
            metrics::record_isolation_violation();
            return Err(err);
        }
        self.identity.authorize(tenant_id, caller_id).await
    }

    /// Run `attempt` under the parent lock until it succeeds, fails hard or
    /// runs out of retries.
    ///
    /// The retry budget bounds the wait for the parent lock and the backoff
    /// between attempts. An attempt that has started always runs to the end,
    /// so a commit that reached the store is never reported as a conflict.
    async fn with_retries<F, Fut>(
        &self,
        tenant_id: &TenantId,
        parent_id: &EntityId,
        mut attempt: F,
    ) -> Result<MutationEnvelope, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<MutationEnvelope, Attempt>>,
    {
        let deadline = Instant::now() + self.config.retry_budget();
        let result = match timeout_at(deadline, self.parent_locks.acquire(tenant_id, parent_id)).await {
            Ok(_parent) => self.attempt_until(parent_id, deadline, &mut attempt).await,
            Err(_) => {
                self.budget_elapsed(parent_id, 0);
                Err(conflict(parent_id, 0))
            }
        };
        if matches!(result, Err(SyncError::Conflict { .. })) {
            metrics::record_conflict_exhausted();
        }
        result
    }

    async fn attempt_until<F, Fut>(
        &self,
        parent_id: &EntityId,
        deadline: Instant,
        attempt: &mut F,
    ) -> Result<MutationEnvelope, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<MutationEnvelope, Attempt>>,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match attempt().await {
                Ok(envelope) => return Ok(envelope),
                Err(Attempt::Fail(err)) => return Err(err),
                Err(Attempt::Retry(reason)) if attempts <= self.config.max_retries => {
                    let wake = Instant::now() + self.config.backoff_for(attempts);
                    if wake >= deadline {
                        self.budget_elapsed(parent_id, attempts);
                        return Err(conflict(parent_id, attempts));
                    }
                    metrics::record_conflict_retry();
                    debug!(parent_id = %parent_id, attempts, reason, "Placement conflict, retrying");
                    sleep_until(wake).await;
                }
                Err(Attempt::Retry(reason)) => {
                    warn!(parent_id = %parent_id, attempts, reason, "Placement retries exhausted");
                    return Err(conflict(parent_id, attempts));
                }
            }
        }
    }

    fn budget_elapsed(&self, parent_id: &EntityId, attempts: u32) {
        warn!(
            parent_id = %parent_id,
            attempts,
            budget_ms = self.config.retry_budget_ms,
            "Placement retry budget elapsed"
        );
    }

    async fn try_move(&self, request: &MoveRequest) -> Result<MutationEnvelope, Attempt> {
        let tenant_id = &request.tenant_id;
        let entity = self.require_entity(tenant_id, &request.entity_id).await?;
        let parent = self.store.load_children(tenant_id, &request.new_parent_id).await?;
        check_accepts(&parent, &entity)?;
        let channel = board_channel(tenant_id, &parent.board_id)?;

        let slot = resolve_slot(
            &parent.children,
            &request.entity_id,
            request.before_id.as_ref(),
            request.after_id.as_ref(),
        )?;

        if entity.item.parent_id == request.new_parent_id
            && occupies_slot(&parent.children, &request.entity_id, &slot)
        {
            let sequence = self.sequencer.current(&channel).await;
            debug!(entity_id = %request.entity_id, sequence, "Move leaves position unchanged");
            return Ok(MutationEnvelope::new(
                tenant_id.clone(),
                entity.kind,
                request.entity_id.clone(),
                Mutation::Moved {
                    parent_id: request.new_parent_id.clone(),
                    rank: entity.item.rank,
                },
                request.origin_client_id.clone(),
                sequence,
            ));
        }

        let rank = rank_for_slot(&slot);
        let write = PersistMove {
            entity_id: request.entity_id.clone(),
            parent_id: request.new_parent_id.clone(),
            rank: rank.clone(),
            expected_before: slot.before_id,
            expected_after: slot.after_id,
        };

        let envelope = {
            let mut sequence = self.sequencer.lock(&channel).await;
            self.store.persist_move(tenant_id, &write).await?;
            *sequence += 1;
            let envelope = MutationEnvelope::new(
                tenant_id.clone(),
                entity.kind,
                request.entity_id.clone(),
                Mutation::Moved {
                    parent_id: request.new_parent_id.clone(),
                    rank: rank.clone(),
                },
                request.origin_client_id.clone(),
                *sequence,
            );
            self.publish(tenant_id, &channel, &envelope).await;
            envelope
        };

        metrics::record_move_committed();
        info!(
            tenant_id = %tenant_id,
            entity_id = %request.entity_id,
            from_parent = %entity.item.parent_id,
            to_parent = %request.new_parent_id,
            rank = %rank,
            sequence = envelope.sequence_hint,
            "Move committed"
        );

        self.rebalance_if_long(tenant_id, &request.new_parent_id, &rank).await;
        Ok(envelope)
    }

    async fn try_create(&self, request: &CreateRequest) -> Result<MutationEnvelope, Attempt> {
        let tenant_id = &request.tenant_id;

        if let Some(existing) = self.store.find_entity(tenant_id, &request.entity_id).await? {
            let channel = board_channel(tenant_id, &existing.board_id)?;
            let sequence = self.sequencer.current(&channel).await;
            debug!(entity_id = %request.entity_id, "Create replayed for existing entity");
            return Ok(MutationEnvelope::new(
                tenant_id.clone(),
                existing.kind,
                request.entity_id.clone(),
                Mutation::Created {
                    parent_id: existing.item.parent_id,
                    rank: existing.item.rank,
                    payload: existing.item.payload,
                },
                request.origin_client_id.clone(),
                sequence,
            ));
        }

        let parent = self.store.load_children(tenant_id, &request.parent_id).await?;
        if parent.child_kind != request.kind {
            return Err(Attempt::Fail(SyncError::NotFound(format!(
                "parent {} holding {:?} entities",
                request.parent_id, request.kind
            ))));
        }
        let channel = board_channel(tenant_id, &parent.board_id)?;

        let slot = resolve_slot(
            &parent.children,
            &request.entity_id,
            request.before_id.as_ref(),
            request.after_id.as_ref(),
        )?;
        let rank = rank_for_slot(&slot);
        let Slot {
            before_id, after_id, ..
        } = slot;
        let write = PersistCreate {
            entity_id: request.entity_id.clone(),
            kind: request.kind,
            parent_id: request.parent_id.clone(),
            rank: rank.clone(),
            payload: request.payload.clone(),
            expected_before: before_id,
            expected_after: after_id,
        };

        let envelope = {
            let mut sequence = self.sequencer.lock(&channel).await;
            let item = self.store.persist_create(tenant_id, &write).await?;
            *sequence += 1;
            let envelope = MutationEnvelope::new(
                tenant_id.clone(),
                request.kind,
                request.entity_id.clone(),
                Mutation::Created {
                    parent_id: item.parent_id,
                    rank: item.rank,
                    payload: item.payload,
                },
                request.origin_client_id.clone(),
                *sequence,
            );
            self.publish(tenant_id, &channel, &envelope).await;
            envelope
        };

        info!(
            tenant_id = %tenant_id,
            entity_id = %request.entity_id,
            parent_id = %request.parent_id,
            sequence = envelope.sequence_hint,
            "Entity created"
        );

        self.rebalance_if_long(tenant_id, &request.parent_id, &rank).await;
        Ok(envelope)
    }

    async fn require_entity(
        &self,
        tenant_id: &TenantId,
        entity_id: &EntityId,
    ) -> Result<StoredEntity, SyncError> {
        self.store
            .find_entity(tenant_id, entity_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("entity {entity_id}")))
    }

    async fn rebalance_if_long(
        &self,
        tenant_id: &TenantId,
        parent_id: &EntityId,
        rank: &shared_types::RankKey,
    ) {
        if rank.len() <= self.config.rebalance_threshold {
            return;
        }
        debug!(parent_id = %parent_id, rank_len = rank.len(), "Rank key past threshold");
        if let Err(err) = self.rebalance_locked(tenant_id, parent_id).await {
            warn!(parent_id = %parent_id, error = %err, "Automatic rebalance failed");
        }
    }

    /// Rebalance `parent_id`. The caller holds the parent lock.
    async fn rebalance_locked(
        &self,
        tenant_id: &TenantId,
        parent_id: &EntityId,
    ) -> Result<Option<MutationEnvelope>, SyncError> {
        let parent = self.store.load_children(tenant_id, parent_id).await?;
        if parent.children.is_empty() {
            return Ok(None);
        }

        let rebalanced = rebalance(&parent.children);
        let unchanged = rebalanced
            .iter()
            .zip(&parent.children)
            .all(|(new, old)| new.id == old.id && new.rank == old.rank);
        if unchanged {
            return Ok(None);
        }

        let assignments: Vec<RankAssignment> = rebalanced
            .into_iter()
            .map(|item| RankAssignment {
                entity_id: item.id,
                rank: item.rank,
            })
            .collect();
        let channel = board_channel(tenant_id, &parent.board_id)?;

        let envelope = {
            let mut sequence = self.sequencer.lock(&channel).await;
            self.store
                .persist_rebalance(tenant_id, parent_id, &assignments)
                .await?;
            *sequence += 1;
            let envelope = MutationEnvelope::new(
                tenant_id.clone(),
                parent.child_kind,
                parent_id.clone(),
                Mutation::Rebalanced { assignments },
                None,
                *sequence,
            );
            self.publish(tenant_id, &channel, &envelope).await;
            envelope
        };

        metrics::record_rebalance();
        info!(
            tenant_id = %tenant_id,
            parent_id = %parent_id,
            children = parent.children.len(),
            sequence = envelope.sequence_hint,
            "Parent rebalanced"
        );
        Ok(Some(envelope))
    }

    /// Broadcast a committed envelope. The write already happened, so a
    /// failed publish is logged and the caller still gets the envelope.
    async fn publish(&self, tenant_id: &TenantId, channel: &ChannelId, envelope: &MutationEnvelope) {
        match self.publisher.publish(tenant_id, channel, envelope).await {
            Ok(()) => metrics::record_envelope_published(envelope.kind().as_str()),
            Err(err) if err.is_security_relevant() => {
                metrics::record_isolation_violation();
                metrics::record_publish_failure();
                error!(channel = %channel, error = %err, "SECURITY: publish refused");
            }
            Err(err) => {
                metrics::record_publish_failure();
                warn!(
                    channel = %channel,
                    sequence = envelope.sequence_hint,
                    error = %err,
                    "Publish failed after persist; clients will catch up on resync"
                );
            }
        }
    }
}

fn conflict(parent_id: &EntityId, attempts: u32) -> SyncError {
    SyncError::Conflict {
        parent_id: parent_id.to_string(),
        attempts,
    }
}

/// The parent must be on the entity's board and hold its kind.
fn check_accepts(parent: &ParentSnapshot, entity: &StoredEntity) -> Result<(), SyncError> {
    if parent.board_id != entity.board_id || parent.child_kind != entity.kind {
        return Err(SyncError::NotFound(format!(
            "parent {} holding {:?} entities on board {}",
            parent.parent_id, entity.kind, entity.board_id
        )));
    }
    Ok(())
}

#[async_trait]
impl ReorderApi for ReorderCoordinator {
    async fn propose_move(&self, request: MoveRequest) -> Result<MutationEnvelope, SyncError> {
        metrics::record_move_proposed();
        self.authorize(&request.tenant_id, &request.caller_id).await?;

        debug!(
            tenant_id = %request.tenant_id,
            entity_id = %request.entity_id,
            new_parent_id = %request.new_parent_id,
            "Move proposed"
        );
        self.with_retries(&request.tenant_id, &request.new_parent_id, || {
            self.try_move(&request)
        })
        .await
    }

    async fn propose_create(&self, request: CreateRequest) -> Result<MutationEnvelope, SyncError> {
        self.authorize(&request.tenant_id, &request.caller_id).await?;
        self.with_retries(&request.tenant_id, &request.parent_id, || {
            self.try_create(&request)
        })
        .await
    }

    async fn propose_update(&self, request: UpdateRequest) -> Result<MutationEnvelope, SyncError> {
        let tenant_id = &request.tenant_id;
        self.authorize(tenant_id, &request.caller_id).await?;
        let entity = self.require_entity(tenant_id, &request.entity_id).await?;
        let channel = board_channel(tenant_id, &entity.board_id)?;

        let mut sequence = self.sequencer.lock(&channel).await;
        let item = self
            .store
            .persist_payload(tenant_id, &request.entity_id, request.payload.clone())
            .await?;
        *sequence += 1;
        let envelope = MutationEnvelope::new(
            tenant_id.clone(),
            entity.kind,
            request.entity_id.clone(),
            Mutation::Updated {
                payload: item.payload,
            },
            request.origin_client_id.clone(),
            *sequence,
        );
        self.publish(tenant_id, &channel, &envelope).await;
        Ok(envelope)
    }

    async fn propose_delete(&self, request: DeleteRequest) -> Result<MutationEnvelope, SyncError> {
        let tenant_id = &request.tenant_id;
        self.authorize(tenant_id, &request.caller_id).await?;
        let entity = self.require_entity(tenant_id, &request.entity_id).await?;
        let channel = board_channel(tenant_id, &entity.board_id)?;

        let mut sequence = self.sequencer.lock(&channel).await;
        let removed = self.store.persist_delete(tenant_id, &request.entity_id).await?;
        *sequence += 1;
        let envelope = MutationEnvelope::new(
            tenant_id.clone(),
            removed.kind,
            request.entity_id.clone(),
            Mutation::Deleted {
                parent_id: removed.item.parent_id,
            },
            request.origin_client_id.clone(),
            *sequence,
        );
        self.publish(tenant_id, &channel, &envelope).await;

        info!(tenant_id = %tenant_id, entity_id = %request.entity_id, "Entity deleted");
        Ok(envelope)
    }

    async fn rebalance_parent(
        &self,
        tenant_id: &TenantId,
        caller_id: &CallerId,
        parent_id: &EntityId,
    ) -> Result<Option<MutationEnvelope>, SyncError> {
        self.authorize(tenant_id, caller_id).await?;
        let _parent = self.parent_locks.acquire(tenant_id, parent_id).await;
        self.rebalance_locked(tenant_id, parent_id).await
    }

    async fn snapshot(
        &self,
        tenant_id: &TenantId,
        caller_id: &CallerId,
        board_id: &BoardId,
        parents: &[EntityId],
    ) -> Result<OrderSnapshot, SyncError> {
        self.authorize(tenant_id, caller_id).await?;
        let channel = board_channel(tenant_id, board_id)?;

        // Holding the sequencer keeps commits out while the parents are read.
        let sequence = self.sequencer.lock(&channel).await;
        let mut loaded = BTreeMap::new();
        let mut removed = BTreeSet::new();
        for parent_id in parents {
            match self.store.load_children(tenant_id, parent_id).await {
                Ok(parent) if parent.board_id == *board_id => {
                    loaded.insert(parent_id.clone(), parent.children);
                }
                Ok(_) | Err(StoreError::NotFound(_)) => {
                    removed.insert(parent_id.clone());
                }
                Err(err) => return Err(err.into()),
            }
        }
        if !removed.is_empty() {
            debug!(board_id = %board_id, removed = removed.len(), "Snapshot requested parents that are gone");
        }

        Ok(OrderSnapshot {
            board_id: board_id.clone(),
            sequence: *sequence,
            parents: loaded,
            removed,
        })
    }
}
