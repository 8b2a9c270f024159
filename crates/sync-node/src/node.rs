//! # Sync Node
//!
//! Wires the hub, store, identity provider, publisher and coordinator, and
//! opens client sessions against them.

use crate::config::NodeConfig;
use crate::gateway::CoordinatorGateway;
use bs_02_reconciler::{BoardSyncApi, ReconcileError, SyncSession};
use bs_03_reorder_coordinator::{
    AllowListIdentity, BusPublisher, InMemoryOrderStore, ReorderCoordinator,
};
use shared_bus::{BusConfig, EventBusClient, InMemoryHub, InMemoryTransport, SubscriptionRegistry};
use shared_types::{BoardId, CallerId, ClientId, EntityId, SyncError, TenantId};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Node-level failures.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// The in-process runtime.
pub struct SyncNode {
    hub: InMemoryHub,
    store: Arc<InMemoryOrderStore>,
    identity: Arc<AllowListIdentity>,
    publisher: Arc<BusPublisher>,
    coordinator: Arc<ReorderCoordinator>,
    maintenance: Mutex<Option<JoinHandle<()>>>,
    config: NodeConfig,
}

impl SyncNode {
    pub fn new(config: NodeConfig) -> Self {
        let hub = InMemoryHub::new();
        let store = Arc::new(InMemoryOrderStore::new());
        let identity = Arc::new(AllowListIdentity::new());
        let publisher = Arc::new(BusPublisher::for_hub(hub.clone()));
        let coordinator = Arc::new(ReorderCoordinator::new(
            config.coordinator.clone(),
            identity.clone(),
            store.clone(),
            publisher.clone(),
        ));

        info!(
            max_retries = config.coordinator.max_retries,
            retry_budget_ms = config.coordinator.retry_budget_ms,
            rebalance_threshold = config.coordinator.rebalance_threshold,
            "Sync node created"
        );

        Self {
            hub,
            store,
            identity,
            publisher,
            coordinator,
            maintenance: Mutex::new(None),
            config,
        }
    }

    pub fn hub(&self) -> &InMemoryHub {
        &self.hub
    }

    pub fn store(&self) -> &Arc<InMemoryOrderStore> {
        &self.store
    }

    pub fn identity(&self) -> &Arc<AllowListIdentity> {
        &self.identity
    }

    pub fn coordinator(&self) -> &Arc<ReorderCoordinator> {
        &self.coordinator
    }

    /// Start the periodic lock pruning task. Calling twice restarts it.
    pub fn start_maintenance(&self) {
        let coordinator = Arc::clone(&self.coordinator);
        let period = self.config.maintenance_interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let pruned = coordinator.prune_locks();
                if pruned > 0 {
                    debug!(pruned, "Released idle parent locks");
                }
            }
        });

        if let Some(previous) = self.maintenance.lock().replace(task) {
            previous.abort();
        }
    }

    /// Open a session for `caller_id` on `board_id`, tracking `parents`.
    ///
    /// # Errors
    ///
    /// Fails when the caller is not authorized for the tenant, a parent is
    /// unknown, or the tenant id is malformed.
    pub async fn connect_client(
        &self,
        tenant_id: &TenantId,
        caller_id: &CallerId,
        board_id: &BoardId,
        parents: Vec<EntityId>,
    ) -> Result<BoardClient, NodeError> {
        let transport = Arc::new(self.hub.connect());
        let bus = EventBusClient::connect(
            BusConfig {
                client_label: Some(format!("{caller_id}@{tenant_id}")),
                ..BusConfig::default()
            },
            tenant_id.clone(),
            ClientId::generate(),
            transport.clone(),
            SubscriptionRegistry::new(),
        )
        .await?;

        let gateway = Arc::new(CoordinatorGateway::new(
            self.coordinator.clone(),
            tenant_id.clone(),
            caller_id.clone(),
        ));
        let session =
            SyncSession::open(bus, board_id.clone(), parents, gateway.clone(), gateway).await?;

        Ok(BoardClient { session, transport })
    }

    pub async fn shutdown(&self) {
        let maintenance = self.maintenance.lock().take();
        if let Some(task) = maintenance {
            task.abort();
        }
        self.publisher.shutdown().await;
        info!("Sync node shut down");
    }
}

/// A connected client: its session plus its transport connection.
pub struct BoardClient {
    session: SyncSession,
    transport: Arc<InMemoryTransport>,
}

impl BoardClient {
    pub fn session(&self) -> &SyncSession {
        &self.session
    }

    /// Ids under `parent` in rendered order.
    pub fn order(&self, parent: &EntityId) -> Vec<EntityId> {
        self.session
            .items(parent)
            .into_iter()
            .map(|item| item.id)
            .collect()
    }

    /// Drop the connection as a network failure would.
    pub fn disconnect(&self) {
        self.transport.disconnect();
    }

    pub fn reconnect(&self) {
        self.transport.reconnect();
    }

    pub async fn close(self) {
        self.session.close().await;
    }
}
