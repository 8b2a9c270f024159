//! # Sync Node Demo
//!
//! Seeds one board, connects two clients and has them reorder cards
//! concurrently, then logs the order each client converged on.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use bs_02_reconciler::BoardSyncApi;
use bs_03_reorder_coordinator::{CreateRequest, ReorderApi};
use shared_types::{BoardId, CallerId, EntityId, EntityKind, TenantId};
use sync_node::{BoardClient, NodeConfig, SyncNode};
use sync_telemetry::{init_telemetry, TelemetryConfig};
use tracing::info;

const LISTS: [&str; 2] = ["todo", "doing"];
const CARDS: [&str; 5] = ["design", "build", "test", "ship", "celebrate"];

async fn seed(node: &SyncNode, tenant_id: &TenantId, caller_id: &CallerId, board_id: &BoardId) -> Result<()> {
    node.store().add_board(tenant_id, board_id);

    let board_entity = EntityId::from(board_id);
    let lists = LISTS.iter().map(|list| (*list, EntityKind::List, board_entity.clone()));
    let cards = CARDS
        .iter()
        .map(|card| (*card, EntityKind::Card, EntityId::new(LISTS[0])));

    for (entity, kind, parent_id) in lists.chain(cards) {
        node.coordinator()
            .propose_create(CreateRequest {
                tenant_id: tenant_id.clone(),
                caller_id: caller_id.clone(),
                entity_id: EntityId::new(entity),
                kind,
                parent_id,
                before_id: None,
                after_id: None,
                payload: serde_json::json!({ "title": entity }),
                origin_client_id: None,
            })
            .await
            .with_context(|| format!("seeding {entity}"))?;
    }
    Ok(())
}

fn render(client: &BoardClient) -> Vec<String> {
    LISTS
        .iter()
        .map(|list| {
            let cards: Vec<String> = client
                .order(&EntityId::new(*list))
                .iter()
                .map(ToString::to_string)
                .collect();
            format!("{list}: [{}]", cards.join(", "))
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = init_telemetry(&TelemetryConfig::for_component("node"))
        .context("initializing telemetry")?;

    let node = SyncNode::new(NodeConfig::from_env());
    node.start_maintenance();

    let tenant_id = TenantId::new("acme");
    let board_id = BoardId::new("roadmap");
    let alice = CallerId::new("alice");
    let bob = CallerId::new("bob");
    node.identity().allow(&tenant_id, &alice);
    node.identity().allow(&tenant_id, &bob);

    seed(&node, &tenant_id, &alice, &board_id).await?;

    let parents: Vec<EntityId> = LISTS.iter().map(|list| EntityId::new(*list)).collect();
    let alice_client = node
        .connect_client(&tenant_id, &alice, &board_id, parents.clone())
        .await
        .context("connecting alice")?;
    let bob_client = node
        .connect_client(&tenant_id, &bob, &board_id, parents)
        .await
        .context("connecting bob")?;

    let todo = EntityId::new("todo");
    let doing = EntityId::new("doing");
    let [design, build, test, ship, celebrate] = CARDS.map(EntityId::new);

    // Both clients drop cards into the same gap at the same time.
    let (first, second) = tokio::join!(
        alice_client
            .session()
            .move_item(&ship, &todo, Some(&design), Some(&build)),
        bob_client
            .session()
            .move_item(&test, &todo, Some(&design), Some(&build)),
    );
    first.context("alice's move")?;
    second.context("bob's move")?;

    let (first, second) = tokio::join!(
        alice_client.session().move_item(&design, &doing, None, None),
        bob_client.session().move_item(&celebrate, &doing, None, None),
    );
    first.context("alice's second move")?;
    second.context("bob's second move")?;

    let converged = tokio::time::timeout(Duration::from_secs(2), async {
        while render(&alice_client) != render(&bob_client) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    if converged.is_err() {
        bail!(
            "clients diverged: alice {:?}, bob {:?}",
            render(&alice_client),
            render(&bob_client)
        );
    }

    for line in render(&alice_client) {
        info!(client = "alice", "{line}");
    }
    for line in render(&bob_client) {
        info!(client = "bob", "{line}");
    }

    let exposition = telemetry.metrics().render().context("rendering metrics")?;
    info!(bytes = exposition.len(), "Metrics rendered");

    alice_client.close().await;
    bob_client.close().await;
    node.shutdown().await;
    Ok(())
}
