//! Sync Session
//!
//! Drives one [`ClientOrderView`] end to end:
//! 1. Subscribe to the board channel (before loading, so nothing is missed)
//! 2. Load the authoritative snapshot
//! 3. Run local moves through optimistic apply, propose, confirm or revert
//! 4. Re-fetch the board whenever the bus reports `Connected` again

use crate::domain::errors::ReconcileError;
use crate::domain::value_objects::EntityState;
use crate::domain::view::ClientOrderView;
use crate::ports::inbound::BoardSyncApi;
use crate::ports::outbound::{MoveGateway, SnapshotSource, ViewObserver};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_bus::{ConnectionState, EnvelopeHandler, EventBusClient, SubscriptionHandle};
use shared_types::{
    board_channel, BoardId, ClientId, EntityId, MutationEnvelope, OrderedItem, SyncError,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Feeds bus deliveries into the view, one at a time.
struct ViewApplier(Arc<Mutex<ClientOrderView>>);

#[async_trait]
impl EnvelopeHandler for ViewApplier {
    async fn handle(&self, envelope: MutationEnvelope) {
        self.0.lock().apply_remote(&envelope);
    }
}

/// A connected client's live view of one board.
pub struct SyncSession {
    view: Arc<Mutex<ClientOrderView>>,
    bus: EventBusClient,
    gateway: Arc<dyn MoveGateway>,
    snapshots: Arc<dyn SnapshotSource>,
    board_id: BoardId,
    subscription: SubscriptionHandle,
    monitor: JoinHandle<()>,
}

impl SyncSession {
    /// Subscribe, load `parents` and start watching the connection.
    ///
    /// # Errors
    ///
    /// Channel ownership, subscription and snapshot failures. Nothing stays
    /// subscribed on error.
    pub async fn open(
        bus: EventBusClient,
        board_id: BoardId,
        parents: Vec<EntityId>,
        gateway: Arc<dyn MoveGateway>,
        snapshots: Arc<dyn SnapshotSource>,
    ) -> Result<Self, ReconcileError> {
        let channel = board_channel(bus.tenant_id(), &board_id)?;
        let view = Arc::new(Mutex::new(ClientOrderView::new(
            bus.client_id().clone(),
            board_id.clone(),
        )));

        let subscription = bus
            .subscribe(&channel, Arc::new(ViewApplier(Arc::clone(&view))))
            .await?;

        let snapshot = match snapshots.load(&board_id, &parents).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                bus.unsubscribe(&subscription).await;
                return Err(e.into());
            }
        };
        view.lock().load_snapshot(snapshot);

        let monitor = tokio::spawn(resync_on_reconnect(
            bus.watch_connection(),
            Arc::clone(&view),
            Arc::clone(&snapshots),
            board_id.clone(),
        ));

        info!(
            tenant_id = %bus.tenant_id(),
            client_id = %bus.client_id(),
            board_id = %board_id,
            parents = parents.len(),
            "Sync session opened"
        );

        Ok(Self {
            view,
            bus,
            gateway,
            snapshots,
            board_id,
            subscription,
            monitor,
        })
    }

    pub fn client_id(&self) -> &ClientId {
        self.bus.client_id()
    }

    pub fn board_id(&self) -> &BoardId {
        &self.board_id
    }

    pub fn observe(&self, observer: Arc<dyn ViewObserver>) {
        self.view.lock().observe(observer);
    }

    /// Read the view under its lock.
    pub fn with_view<R>(&self, f: impl FnOnce(&ClientOrderView) -> R) -> R {
        f(&*self.view.lock())
    }

    /// Unsubscribe and stop the reconnect monitor.
    pub async fn close(self) {
        self.monitor.abort();
        self.bus.unsubscribe(&self.subscription).await;
        debug!(board_id = %self.board_id, "Sync session closed");
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.monitor.abort();
    }
}

#[async_trait]
impl BoardSyncApi for SyncSession {
    fn items(&self, parent: &EntityId) -> Vec<OrderedItem> {
        self.view.lock().items(parent)
    }

    fn state_of(&self, entity_id: &EntityId) -> EntityState {
        self.view.lock().state_of(entity_id)
    }

    async fn move_item(
        &self,
        entity_id: &EntityId,
        new_parent_id: &EntityId,
        before_id: Option<&EntityId>,
        after_id: Option<&EntityId>,
    ) -> Result<MutationEnvelope, ReconcileError> {
        let command = self
            .view
            .lock()
            .move_locally(entity_id, new_parent_id, before_id, after_id)?;
        let mutation_id = command.mutation_id;

        match self.gateway.propose_move(command).await {
            Ok(envelope) => {
                self.view.lock().apply_confirmation(mutation_id, &envelope);
                Ok(envelope)
            }
            Err(e) => {
                if e.is_security_relevant() {
                    error!(entity_id = %entity_id, error = %e, "Move rejected");
                } else {
                    warn!(entity_id = %entity_id, error = %e, "Move failed; reverting");
                }
                self.view.lock().revert(entity_id, mutation_id, e.to_string());
                Err(e.into())
            }
        }
    }

    async fn resync(&self) -> Result<(), ReconcileError> {
        resync_view(&self.view, self.snapshots.as_ref(), &self.board_id).await?;
        Ok(())
    }
}

async fn resync_view(
    view: &Mutex<ClientOrderView>,
    snapshots: &dyn SnapshotSource,
    board_id: &BoardId,
) -> Result<(), SyncError> {
    let parents = view.lock().known_parents();
    let snapshot = snapshots.load(board_id, &parents).await?;
    view.lock().load_snapshot(snapshot);
    Ok(())
}

/// The bus only reports `Connected` as a change after re-joining its
/// channels, so every such change is a reconnect.
async fn resync_on_reconnect(
    mut connection: watch::Receiver<ConnectionState>,
    view: Arc<Mutex<ClientOrderView>>,
    snapshots: Arc<dyn SnapshotSource>,
    board_id: BoardId,
) {
    while connection.changed().await.is_ok() {
        let state = *connection.borrow_and_update();
        if !state.is_connected() {
            debug!(board_id = %board_id, "Bus disconnected; waiting to resync");
            continue;
        }

        let pending = view.lock().parents_with_pending().len();
        info!(board_id = %board_id, pending_parents = pending, "Bus reconnected; resyncing board");
        if let Err(e) = resync_view(&view, snapshots.as_ref(), &board_id).await {
            warn!(board_id = %board_id, error = %e, "Resync after reconnect failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{BoardSnapshot, Transition, ViewChange};
    use crate::ports::outbound::mocks::{FixedSnapshots, ScriptedGateway};
    use shared_bus::{BusConfig, InMemoryHub, InMemoryTransport, SubscriptionRegistry};
    use shared_types::{EntityKind, Mutation, RankKey, TenantId};
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::{sleep, timeout};

    fn id(raw: &str) -> EntityId {
        EntityId::new(raw)
    }

    fn snapshot(sequence: u64, l1: &[(&str, &str)]) -> BoardSnapshot {
        let mut parents = BTreeMap::new();
        parents.insert(
            id("l1"),
            l1.iter()
                .map(|(entity, rank)| OrderedItem::new(*entity, "l1", *rank))
                .collect(),
        );
        BoardSnapshot {
            sequence,
            parents,
            ..BoardSnapshot::default()
        }
    }

    fn moved(entity: &str, rank: &str, seq: u64, origin: &ClientId) -> MutationEnvelope {
        MutationEnvelope::new(
            TenantId::new("org_1"),
            EntityKind::Card,
            id(entity),
            Mutation::Moved {
                parent_id: id("l1"),
                rank: RankKey::from(rank),
            },
            Some(origin.clone()),
            seq,
        )
    }

    async fn bus(hub: &InMemoryHub) -> (EventBusClient, Arc<InMemoryTransport>) {
        let transport = Arc::new(hub.connect());
        let bus = EventBusClient::connect(
            BusConfig::default(),
            TenantId::new("org_1"),
            ClientId::generate(),
            transport.clone(),
            SubscriptionRegistry::new(),
        )
        .await
        .unwrap();
        (bus, transport)
    }

    struct Fixture {
        session: SyncSession,
        gateway: Arc<ScriptedGateway>,
        snapshots: Arc<FixedSnapshots>,
        transport: Arc<InMemoryTransport>,
        hub: InMemoryHub,
    }

    async fn open() -> Fixture {
        let hub = InMemoryHub::new();
        let (bus, transport) = bus(&hub).await;
        let gateway = Arc::new(ScriptedGateway::default());
        let snapshots = Arc::new(FixedSnapshots(Mutex::new(snapshot(
            5,
            &[("a", "m"), ("b", "n")],
        ))));
        let session = SyncSession::open(
            bus,
            BoardId::new("b1"),
            vec![id("l1")],
            gateway.clone(),
            snapshots.clone(),
        )
        .await
        .unwrap();
        Fixture {
            session,
            gateway,
            snapshots,
            transport,
            hub,
        }
    }

    fn order(session: &SyncSession) -> Vec<String> {
        session
            .items(&id("l1"))
            .into_iter()
            .map(|item| item.id.to_string())
            .collect()
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        timeout(Duration::from_secs(2), async {
            while !check() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn test_move_round_trip_confirms() {
        let fx = open().await;
        let me = fx.session.client_id().clone();
        fx.gateway.push(Ok(moved("b", "g", 6, &me)));

        let envelope = fx
            .session
            .move_item(&id("b"), &id("l1"), None, Some(&id("a")))
            .await
            .unwrap();

        assert_eq!(envelope.sequence_hint, 6);
        assert_eq!(order(&fx.session), vec!["b", "a"]);
        assert_eq!(fx.session.state_of(&id("b")), EntityState::Idle);
        let sent = fx.gateway.received.lock();
        assert_eq!(sent[0].entity_id, id("b"));
        assert_eq!(sent[0].after_id, Some(id("a")));
    }

    #[tokio::test]
    async fn test_failed_move_reverts_with_notice() {
        let fx = open().await;
        let (tx, mut rx) = mpsc::unbounded_channel::<ViewChange>();
        fx.session.observe(Arc::new(tx));
        fx.gateway.push(Err(SyncError::Conflict {
            parent_id: "l1".into(),
            attempts: 3,
        }));

        let result = fx
            .session
            .move_item(&id("b"), &id("l1"), None, Some(&id("a")))
            .await;

        assert!(matches!(result, Err(ref e) if e.is_recoverable()));
        assert_eq!(order(&fx.session), vec!["a", "b"]);
        assert_eq!(rx.try_recv().unwrap().transition, Transition::Optimistic);
        assert!(matches!(
            rx.try_recv().unwrap().transition,
            Transition::Reverted { .. }
        ));
    }

    #[tokio::test]
    async fn test_remote_envelopes_are_applied() {
        let fx = open().await;
        let (other, _t) = bus(&fx.hub).await;
        let channel = board_channel(other.tenant_id(), &BoardId::new("b1")).unwrap();

        other
            .publish(&channel, &moved("a", "t", 6, other.client_id()))
            .await
            .unwrap();

        wait_until(|| order(&fx.session) == vec!["b", "a"]).await;
    }

    #[tokio::test]
    async fn test_reconnect_resyncs_board() {
        let fx = open().await;
        *fx.snapshots.0.lock() = snapshot(9, &[("a", "m"), ("b", "n"), ("c", "g")]);

        fx.transport.disconnect();
        fx.transport.reconnect();

        wait_until(|| order(&fx.session) == vec!["c", "a", "b"]).await;
        assert_eq!(fx.session.with_view(ClientOrderView::last_sequence), 9);
    }

    #[tokio::test]
    async fn test_explicit_resync() {
        let fx = open().await;
        *fx.snapshots.0.lock() = snapshot(7, &[("b", "c"), ("a", "m")]);
        fx.session.resync().await.unwrap();
        assert_eq!(order(&fx.session), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_close_unsubscribes() {
        let fx = open().await;
        let channel = board_channel(&TenantId::new("org_1"), &BoardId::new("b1")).unwrap();
        assert_eq!(fx.hub.member_count(&channel), 1);
        fx.session.close().await;
        assert_eq!(fx.hub.member_count(&channel), 0);
    }
}
