//! Tenant boundaries hold on the bus and at the coordinator.

use super::fixtures::{id, ids, BoardFixture, BOARD, TENANT};
use bs_02_reconciler::BoardSyncApi;
use bs_03_reorder_coordinator::{MoveRequest, ReorderApi};
use shared_bus::{BusConfig, EventBusClient, SubscriptionRegistry, Transport};
use shared_types::{
    board_channel, BoardId, CallerId, ClientId, EntityId, EntityKind, Mutation, MutationEnvelope,
    RankKey, SyncError, TenantId,
};
use std::sync::Arc;
use std::time::Duration;
use sync_node::NodeConfig;
use tokio::sync::mpsc;
use tokio::time::sleep;

fn board() -> BoardFixture {
    BoardFixture::new(NodeConfig::default()).with_ordered_list("todo", &["a", "b", "c"])
}

fn move_request(tenant: &str, caller: &str, entity: &str) -> MoveRequest {
    MoveRequest {
        tenant_id: TenantId::new(tenant),
        caller_id: CallerId::new(caller),
        entity_id: id(entity),
        new_parent_id: id("todo"),
        before_id: None,
        after_id: None,
        origin_client_id: None,
    }
}

#[tokio::test]
async fn test_foreign_tenant_cannot_subscribe() {
    let fx = board();
    let bus = EventBusClient::connect(
        BusConfig::default(),
        TenantId::new("globex"),
        ClientId::generate(),
        Arc::new(fx.node.hub().connect()),
        SubscriptionRegistry::new(),
    )
    .await
    .unwrap();
    let acme_channel = board_channel(&TenantId::new(TENANT), &BoardId::new(BOARD)).unwrap();
    let (tx, _rx) = mpsc::unbounded_channel::<MutationEnvelope>();

    let result = bus.subscribe(&acme_channel, Arc::new(tx)).await;

    assert!(matches!(
        result,
        Err(SyncError::TenantIsolationViolation { .. })
    ));
    assert_eq!(fx.node.hub().member_count(&acme_channel), 0);
}

#[tokio::test]
async fn test_foreign_envelope_on_own_channel_is_dropped() {
    let fx = board();
    let alice = fx.client("alice").await;
    let channel = board_channel(&fx.tenant_id, &fx.board_id).unwrap();

    // A raw connection bypasses the bus client's ownership checks.
    let rogue = fx.node.hub().connect();
    rogue.join(&channel).await.unwrap();
    let forged = MutationEnvelope::new(
        TenantId::new("globex"),
        EntityKind::Card,
        id("c"),
        Mutation::Moved {
            parent_id: id("todo"),
            rank: RankKey::from("a"),
        },
        None,
        1_000,
    );
    rogue.send(&channel, forged.encode().unwrap()).await.unwrap();
    sleep(Duration::from_millis(50)).await;

    assert_eq!(alice.order(&id("todo")), ids(&["a", "b", "c"]));
}

#[tokio::test]
async fn test_cross_tenant_move_reveals_nothing() {
    let fx = board();
    fx.node
        .identity()
        .allow(&TenantId::new("globex"), &CallerId::new("mallory"));
    let frames_before = fx.node.hub().frames_sent();

    let result = fx
        .node
        .coordinator()
        .propose_move(move_request("globex", "mallory", "a"))
        .await;

    assert!(matches!(result, Err(SyncError::NotFound(_))));
    assert_eq!(fx.node.hub().frames_sent(), frames_before);
    assert_eq!(fx.authoritative(&id("todo")), ids(&["a", "b", "c"]));
}

#[tokio::test]
async fn test_unauthorized_caller_is_rejected() {
    let fx = board();

    let direct = fx
        .node
        .coordinator()
        .propose_move(move_request(TENANT, "mallory", "a"))
        .await;
    assert!(matches!(direct, Err(SyncError::Unauthorized { .. })));

    let session = fx
        .node
        .connect_client(
            &fx.tenant_id,
            &CallerId::new("mallory"),
            &fx.board_id,
            fx.lists.clone(),
        )
        .await;
    assert!(session.is_err());
}

#[tokio::test]
async fn test_malformed_tenant_rejected_before_io() {
    let fx = board();
    let frames_before = fx.node.hub().frames_sent();

    let result = fx
        .node
        .coordinator()
        .propose_move(move_request("acme:admin", "alice", "a"))
        .await;

    assert!(matches!(result, Err(SyncError::InvalidTenantId { .. })));
    assert_eq!(fx.node.hub().frames_sent(), frames_before);
}

#[tokio::test]
async fn test_own_tenant_traffic_still_flows() {
    let fx = board();
    let alice = fx.client("alice").await;
    let bob = fx.client("bob").await;

    alice
        .session()
        .move_item(&id("c"), &id("todo"), None, Some(&id("a")))
        .await
        .unwrap();

    assert!(fx.converged(&[&alice, &bob]).await);
    assert_eq!(
        bob.session()
            .items(&id("todo"))
            .into_iter()
            .map(|item| item.id)
            .collect::<Vec<EntityId>>(),
        ids(&["c", "a", "b"])
    );
}
