//! Event bus publisher
//!
//! Publishes through one [`EventBusClient`] per tenant, so every envelope
//! passes the client's ownership checks before it reaches the transport.

use crate::ports::outbound::EnvelopePublisher;
use async_trait::async_trait;
use shared_bus::{
    BusConfig, EventBusClient, InMemoryHub, SubscriptionRegistry, Transport,
};
use shared_types::{ChannelId, ClientId, MutationEnvelope, SyncError, TenantId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Opens a fresh transport connection.
pub type TransportFactory = Arc<dyn Fn() -> Arc<dyn Transport> + Send + Sync>;

pub const COORDINATOR_CLIENT_ID: &str = "reorder-coordinator";

/// [`EnvelopePublisher`] backed by the event bus.
pub struct BusPublisher {
    connect: TransportFactory,
    clients: Mutex<HashMap<TenantId, EventBusClient>>,
}

impl BusPublisher {
    pub fn new(connect: TransportFactory) -> Self {
        Self {
            connect,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Publisher that connects to an in-process hub.
    pub fn for_hub(hub: InMemoryHub) -> Self {
        Self::new(Arc::new(move || Arc::new(hub.connect()) as Arc<dyn Transport>))
    }

    async fn client_for(&self, tenant_id: &TenantId) -> Result<EventBusClient, SyncError> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(tenant_id) {
            return Ok(client.clone());
        }

        let config = BusConfig {
            client_label: Some(format!("{COORDINATOR_CLIENT_ID}/{tenant_id}")),
            ..BusConfig::default()
        };
        let client = EventBusClient::connect(
            config,
            tenant_id.clone(),
            ClientId::new(COORDINATOR_CLIENT_ID),
            (self.connect)(),
            SubscriptionRegistry::new(),
        )
        .await?;
        clients.insert(tenant_id.clone(), client.clone());
        Ok(client)
    }

    /// Close every tenant connection.
    pub async fn shutdown(&self) {
        let clients: Vec<EventBusClient> = self.clients.lock().await.drain().map(|(_, c)| c).collect();
        for client in &clients {
            client.shutdown().await;
        }
        info!(connections = clients.len(), "Coordinator publisher shut down");
    }
}

#[async_trait]
impl EnvelopePublisher for BusPublisher {
    async fn publish(
        &self,
        tenant_id: &TenantId,
        channel: &ChannelId,
        envelope: &MutationEnvelope,
    ) -> Result<(), SyncError> {
        let client = self.client_for(tenant_id).await?;
        client.publish(channel, envelope).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{board_channel, BoardId, EntityId, EntityKind, Mutation, RankKey};
    use tokio::sync::mpsc;

    fn moved(tenant: &str) -> MutationEnvelope {
        MutationEnvelope::new(
            TenantId::new(tenant),
            EntityKind::Card,
            EntityId::new("c1"),
            Mutation::Moved {
                parent_id: EntityId::new("l1"),
                rank: RankKey::from("n"),
            },
            None,
            1,
        )
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let hub = InMemoryHub::new();
        let publisher = BusPublisher::for_hub(hub.clone());
        let tenant = TenantId::new("org_1");
        let channel = board_channel(&tenant, &BoardId::new("b1")).unwrap();

        let subscriber = EventBusClient::connect(
            BusConfig::default(),
            tenant.clone(),
            ClientId::new("viewer"),
            Arc::new(hub.connect()),
            SubscriptionRegistry::new(),
        )
        .await
        .unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        subscriber.subscribe(&channel, Arc::new(tx)).await.unwrap();

        let envelope = moved("org_1");
        publisher.publish(&tenant, &channel, &envelope).await.unwrap();
        assert_eq!(rx.recv().await, Some(envelope));
    }

    #[tokio::test]
    async fn test_foreign_channel_refused() {
        let publisher = BusPublisher::for_hub(InMemoryHub::new());
        let channel = board_channel(&TenantId::new("org_2"), &BoardId::new("b1")).unwrap();

        let result = publisher
            .publish(&TenantId::new("org_1"), &channel, &moved("org_1"))
            .await;
        assert!(matches!(result, Err(SyncError::TenantIsolationViolation { .. })));
    }

    #[tokio::test]
    async fn test_one_connection_per_tenant() {
        let publisher = BusPublisher::for_hub(InMemoryHub::new());
        let tenant = TenantId::new("org_1");
        let channel = board_channel(&tenant, &BoardId::new("b1")).unwrap();

        publisher.publish(&tenant, &channel, &moved("org_1")).await.unwrap();
        publisher.publish(&tenant, &channel, &moved("org_1")).await.unwrap();
        assert_eq!(publisher.clients.lock().await.len(), 1);

        publisher.shutdown().await;
        assert!(publisher.clients.lock().await.is_empty());
    }
}
