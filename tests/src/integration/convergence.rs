//! Concurrent moves from several clients settle on the coordinator's order.

use super::fixtures::{id, ids, BoardFixture};
use bs_02_reconciler::{BoardSyncApi, ReconcileError};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use shared_types::{EntityId, RankKey, SyncError};
use std::collections::HashMap;
use sync_node::{BoardClient, NodeConfig};

// =============================================================================
// TEST FIXTURES
// =============================================================================

fn todo_board() -> BoardFixture {
    BoardFixture::new(NodeConfig::default())
        .with_ordered_list("todo", &["a", "b", "c", "d"])
        .with_list("doing", &[])
}

/// One random move chosen from what `client` currently renders.
async fn random_move(
    client: &BoardClient,
    lists: &[EntityId],
    rng: &mut StdRng,
) -> Result<(), ReconcileError> {
    let all: Vec<EntityId> = lists.iter().flat_map(|list| client.order(list)).collect();
    let Some(card) = all.choose(rng).cloned() else {
        return Ok(());
    };
    let Some(target) = lists.choose(rng).cloned() else {
        return Ok(());
    };

    let siblings: Vec<EntityId> = client
        .order(&target)
        .into_iter()
        .filter(|sibling| *sibling != card)
        .collect();
    let gap = rng.gen_range(0..=siblings.len());
    let before = gap.checked_sub(1).and_then(|i| siblings.get(i));
    let after = siblings.get(gap);

    client
        .session()
        .move_item(&card, &target, before, after)
        .await
        .map(|_| ())
}

/// Run a dozen random moves, returning how many were rejected.
async fn drive(client: &BoardClient, lists: &[EntityId], seed: u64) -> usize {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut failures = 0;
    for _ in 0..12 {
        if random_move(client, lists, &mut rng).await.is_err() {
            failures += 1;
        }
    }
    failures
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[tokio::test]
async fn test_move_to_top_lands_before_first_card() {
    let fx = BoardFixture::new(NodeConfig::default()).with_list("todo", &[("a", "m"), ("b", "n")]);
    let alice = fx.client("alice").await;
    let bob = fx.client("bob").await;
    let todo = id("todo");

    let envelope = alice
        .session()
        .move_item(&id("b"), &todo, None, Some(&id("a")))
        .await
        .unwrap();

    let rank = envelope.rank().cloned().unwrap();
    assert!(rank < RankKey::from("m"));
    assert!(fx.converged(&[&alice, &bob]).await);
    assert_eq!(bob.order(&todo), ids(&["b", "a"]));
}

#[tokio::test]
async fn test_concurrent_moves_into_same_gap_converge() {
    let fx = todo_board();
    let alice = fx.client("alice").await;
    let bob = fx.client("bob").await;
    let (todo, doing) = (id("todo"), id("doing"));
    let (a, b, c, d) = (id("a"), id("b"), id("c"), id("d"));

    let (first, second) = tokio::join!(
        alice.session().move_item(&c, &todo, Some(&a), Some(&b)),
        bob.session().move_item(&d, &todo, Some(&a), Some(&b)),
    );
    first.unwrap();
    second.unwrap();

    assert!(fx.converged(&[&alice, &bob]).await);
    let order = fx.authoritative(&todo);
    assert_eq!(order.first(), Some(&a));
    assert_eq!(order.last(), Some(&b));
    assert!(order.contains(&c) && order.contains(&d));
    assert!(fx.authoritative(&doing).is_empty());
    assert!(fx.store_has_distinct_ranks());
}

#[tokio::test]
async fn test_same_card_moved_by_two_clients() {
    let fx = todo_board();
    let alice = fx.client("alice").await;
    let bob = fx.client("bob").await;
    let (todo, doing, card, last) = (id("todo"), id("doing"), id("b"), id("d"));

    let (first, second) = tokio::join!(
        alice.session().move_item(&card, &doing, None, None),
        bob.session().move_item(&card, &todo, Some(&last), None),
    );
    let first = first.unwrap();
    let second = second.unwrap();

    assert!(fx.converged(&[&alice, &bob]).await);
    let winner = if first.sequence_hint > second.sequence_hint {
        &doing
    } else {
        &todo
    };
    assert!(fx.authoritative(winner).contains(&card));
    for client in [&alice, &bob] {
        let copies = fx
            .lists
            .iter()
            .flat_map(|list| client.order(list))
            .filter(|entity| *entity == card)
            .count();
        assert_eq!(copies, 1);
    }
}

#[tokio::test]
async fn test_randomized_concurrent_moves_converge() {
    let fx = BoardFixture::new(NodeConfig::default())
        .with_ordered_list("todo", &["a", "b", "c", "d", "e", "f"])
        .with_ordered_list("doing", &["g", "h"]);
    let alice = fx.client("alice").await;
    let bob = fx.client("bob").await;
    let carol = fx.client("carol").await;

    let (fa, fb, fc) = tokio::join!(
        drive(&alice, &fx.lists, 7),
        drive(&bob, &fx.lists, 11),
        drive(&carol, &fx.lists, 13),
    );
    assert!(fa + fb + fc < 36, "every move failed");

    assert!(fx.converged(&[&alice, &bob, &carol]).await);
    assert!(fx.store_has_distinct_ranks());

    let mut seen: HashMap<EntityId, usize> = HashMap::new();
    for list in &fx.lists {
        for card in fx.authoritative(list) {
            *seen.entry(card).or_default() += 1;
        }
    }
    assert_eq!(seen.len(), 8);
    assert!(seen.values().all(|count| *count == 1));
}

#[tokio::test]
async fn test_exhausted_conflicts_revert_the_view() {
    let fx = todo_board();
    let alice = fx.client("alice").await;
    let todo = id("todo");
    fx.node.store().inject_conflicts(100);

    let result = alice
        .session()
        .move_item(&id("d"), &todo, None, Some(&id("a")))
        .await;

    assert!(matches!(
        result,
        Err(ReconcileError::Sync(SyncError::Conflict { .. }))
    ));
    assert_eq!(alice.order(&todo), fx.authoritative(&todo));
    assert_eq!(alice.order(&todo), ids(&["a", "b", "c", "d"]));
}

#[tokio::test]
async fn test_list_deleted_under_inflight_move() {
    let fx = todo_board();
    let alice = fx.client("alice").await;
    let bob = fx.client("bob").await;
    let (todo, doing, card) = (id("todo"), id("doing"), id("b"));

    let (moved, _) = tokio::join!(
        alice.session().move_item(&card, &doing, None, None),
        fx.delete("bob", "doing"),
    );

    assert!(fx.converged(&[&alice, &bob]).await);
    assert!(fx.authoritative(&doing).is_empty());
    for client in [&alice, &bob] {
        assert!(client.order(&doing).is_empty());
        let in_todo = client.order(&todo).contains(&card);
        // The card survives only if the delete landed before the move.
        assert_eq!(in_todo, moved.is_err());
    }
}
