//! Rank keys that grow past the threshold get re-spaced for everyone.

use super::fixtures::{id, ids, wait_until, BoardFixture};
use bs_01_rank_keys::rebalanced_ranks;
use bs_02_reconciler::BoardSyncApi;
use bs_03_reorder_coordinator::{CoordinatorConfig, ReorderApi};
use shared_bus::{BusConfig, EventBusClient, SubscriptionRegistry};
use shared_types::{board_channel, CallerId, ClientId, Mutation, MutationEnvelope, RankKey};
use std::sync::Arc;
use std::time::Duration;
use sync_node::NodeConfig;
use tokio::sync::mpsc;
use tokio::time::sleep;

const THRESHOLD: usize = 3;

fn low_threshold() -> NodeConfig {
    NodeConfig {
        coordinator: CoordinatorConfig {
            rebalance_threshold: THRESHOLD,
            ..CoordinatorConfig::default()
        },
        ..NodeConfig::default()
    }
}

/// A plain bus subscriber on the board channel.
async fn watch_board(fx: &BoardFixture) -> (EventBusClient, mpsc::UnboundedReceiver<MutationEnvelope>) {
    let bus = EventBusClient::connect(
        BusConfig {
            client_label: Some("observer".into()),
            ..BusConfig::default()
        },
        fx.tenant_id.clone(),
        ClientId::generate(),
        Arc::new(fx.node.hub().connect()),
        SubscriptionRegistry::new(),
    )
    .await
    .unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let channel = board_channel(&fx.tenant_id, &fx.board_id).unwrap();
    bus.subscribe(&channel, Arc::new(tx)).await.unwrap();
    (bus, rx)
}

fn count_rebalances(rx: &mut mpsc::UnboundedReceiver<MutationEnvelope>) -> usize {
    let mut count = 0;
    while let Ok(envelope) = rx.try_recv() {
        if matches!(envelope.mutation, Mutation::Rebalanced { .. }) {
            count += 1;
        }
    }
    count
}

#[tokio::test]
async fn test_hot_gap_triggers_rebalance() {
    let fx = BoardFixture::new(low_threshold()).with_ordered_list("todo", &["a", "b", "c", "d"]);
    let (_observer, mut rx) = watch_board(&fx).await;
    let alice = fx.client("alice").await;
    let bob = fx.client("bob").await;
    let todo = id("todo");

    // Keep dropping the last card right after the first one.
    for _ in 0..40 {
        let order = fx.authoritative(&todo);
        let (first, second, last) = (&order[0], &order[1], &order[order.len() - 1]);
        alice
            .session()
            .move_item(last, &todo, Some(first), Some(second))
            .await
            .unwrap();
    }
    sleep(Duration::from_millis(50)).await;

    assert!(count_rebalances(&mut rx) >= 1);
    assert!(fx.converged(&[&alice, &bob]).await);
    assert!(fx.store_has_distinct_ranks());
    assert!(fx
        .stored(&todo)
        .iter()
        .all(|item| item.rank.as_str().len() <= THRESHOLD));
}

#[tokio::test]
async fn test_explicit_rebalance_respaces_evenly() {
    let fx = BoardFixture::new(NodeConfig::default()).with_list(
        "todo",
        &[("a", "b"), ("b", "bn"), ("c", "c")],
    );
    let alice = fx.client("alice").await;
    let todo = id("todo");
    let coordinator = fx.node.coordinator();

    let envelope = coordinator
        .rebalance_parent(&fx.tenant_id, &CallerId::new("alice"), &todo)
        .await
        .unwrap()
        .expect("uneven ranks are re-spaced");

    assert_eq!(envelope.entity_id, todo);
    assert_eq!(envelope.origin_client_id, None);
    let ranks: Vec<RankKey> = fx.stored(&todo).into_iter().map(|item| item.rank).collect();
    assert_eq!(ranks, rebalanced_ranks(3));
    assert_eq!(fx.authoritative(&todo), ids(&["a", "b", "c"]));

    let rendered_ranks = || -> Vec<RankKey> {
        alice
            .session()
            .items(&todo)
            .into_iter()
            .map(|item| item.rank)
            .collect()
    };
    assert!(wait_until(Duration::from_secs(2), || rendered_ranks() == rebalanced_ranks(3)).await);

    let again = coordinator
        .rebalance_parent(&fx.tenant_id, &CallerId::new("alice"), &todo)
        .await
        .unwrap();
    assert!(again.is_none());
}
