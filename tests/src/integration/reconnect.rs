//! Clients that drop off the bus catch up once they are back.

use super::fixtures::{id, ids, wait_until, BoardFixture};
use bs_02_reconciler::BoardSyncApi;
use std::time::Duration;
use sync_node::NodeConfig;
use tokio::time::sleep;

fn board() -> BoardFixture {
    BoardFixture::new(NodeConfig::default())
        .with_ordered_list("todo", &["a", "b", "c", "d"])
        .with_list("doing", &[])
}

/// Give the coordinator's publishes time to reach connected members.
async fn settle() {
    sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_missed_envelopes_recovered_on_reconnect() {
    let fx = board();
    let alice = fx.client("alice").await;
    let bob = fx.client("bob").await;
    let (todo, doing) = (id("todo"), id("doing"));

    bob.disconnect();
    alice
        .session()
        .move_item(&id("d"), &todo, None, Some(&id("a")))
        .await
        .unwrap();
    alice
        .session()
        .move_item(&id("b"), &doing, None, None)
        .await
        .unwrap();
    settle().await;
    assert_eq!(bob.order(&todo), ids(&["a", "b", "c", "d"]));

    bob.reconnect();

    assert!(fx.converged(&[&alice, &bob]).await);
    assert_eq!(bob.order(&todo), ids(&["d", "a", "c"]));
    assert_eq!(bob.order(&doing), ids(&["b"]));
}

#[tokio::test]
async fn test_move_made_while_disconnected_converges() {
    let fx = board();
    let alice = fx.client("alice").await;
    let bob = fx.client("bob").await;
    let todo = id("todo");

    alice.disconnect();
    // The coordinator is reached directly; only the bus is down.
    alice
        .session()
        .move_item(&id("a"), &todo, Some(&id("d")), None)
        .await
        .unwrap();
    bob.session()
        .move_item(&id("c"), &todo, None, Some(&id("b")))
        .await
        .unwrap();
    alice.reconnect();

    assert!(fx.converged(&[&alice, &bob]).await);
    assert_eq!(alice.order(&todo), ids(&["c", "b", "d", "a"]));
}

#[tokio::test]
async fn test_connection_flaps_leave_no_drift() {
    let fx = board();
    let alice = fx.client("alice").await;
    let bob = fx.client("bob").await;
    let (todo, doing) = (id("todo"), id("doing"));
    let cards = ["a", "b", "c", "d"];

    for (round, card) in cards.iter().enumerate() {
        bob.disconnect();
        let target = if round % 2 == 0 { &doing } else { &todo };
        alice
            .session()
            .move_item(&id(card), target, None, None)
            .await
            .unwrap();
        bob.reconnect();
        assert!(
            wait_until(Duration::from_secs(2), || fx.matches_store(&[&alice, &bob])).await,
            "diverged after flap {round}"
        );
    }

    assert_eq!(bob.order(&doing), ids(&["a", "c"]));
    assert_eq!(bob.order(&todo), ids(&["b", "d"]));
}

#[tokio::test]
async fn test_explicit_resync_matches_store() {
    let fx = board();
    let alice = fx.client("alice").await;
    let todo = id("todo");

    alice.disconnect();
    let bob = fx.client("bob").await;
    bob.session()
        .move_item(&id("a"), &todo, Some(&id("d")), None)
        .await
        .unwrap();
    settle().await;
    assert_ne!(alice.order(&todo), fx.authoritative(&todo));

    alice.session().resync().await.unwrap();

    assert!(fx.matches_store(&[&alice, &bob]));
}

#[tokio::test]
async fn test_list_deleted_while_disconnected() {
    let fx = board();
    let alice = fx.client("alice").await;
    let bob = fx.client("bob").await;
    let (todo, doing) = (id("todo"), id("doing"));
    alice
        .session()
        .move_item(&id("c"), &doing, None, None)
        .await
        .unwrap();
    assert!(fx.converged(&[&alice, &bob]).await);

    bob.disconnect();
    fx.delete("alice", "doing").await;
    alice
        .session()
        .move_item(&id("d"), &todo, None, Some(&id("a")))
        .await
        .unwrap();
    settle().await;
    assert_eq!(bob.order(&doing), ids(&["c"]));

    bob.session().resync().await.unwrap();
    assert!(fx.matches_store(&[&bob]));
    assert_eq!(bob.order(&todo), ids(&["d", "a", "b"]));
    assert!(bob.order(&doing).is_empty());

    bob.reconnect();
    assert!(fx.converged(&[&alice, &bob]).await);
}

#[tokio::test]
async fn test_client_joins_after_list_deleted() {
    let fx = board();
    let alice = fx.client("alice").await;
    fx.delete("alice", "doing").await;

    // The fixture still names the deleted list; joining must not fail on it.
    let carol = fx.client("carol").await;

    assert!(fx.converged(&[&alice, &carol]).await);
    assert!(carol.order(&id("doing")).is_empty());
    assert_eq!(carol.order(&id("todo")), ids(&["a", "b", "c", "d"]));
}
