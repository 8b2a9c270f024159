//! Shared setup for the scenario tests.

use bs_01_rank_keys::next;
use bs_03_reorder_coordinator::{DeleteRequest, ReorderApi};
use shared_types::{
    has_duplicate_ranks, BoardId, CallerId, EntityId, EntityKind, MutationEnvelope, OrderedItem,
    RankKey, TenantId,
};
use std::time::Duration;
use sync_node::{BoardClient, NodeConfig, SyncNode};
use tokio::time::{sleep, timeout};

pub const TENANT: &str = "acme";
pub const BOARD: &str = "roadmap";
pub const CALLERS: [&str; 3] = ["alice", "bob", "carol"];

pub fn id(raw: &str) -> EntityId {
    EntityId::new(raw)
}

pub fn ids(raw: &[&str]) -> Vec<EntityId> {
    raw.iter().map(|r| EntityId::new(*r)).collect()
}

/// Poll `check` until it holds or `limit` elapses.
pub async fn wait_until(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    timeout(limit, async {
        while !check() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}

/// One tenant, one board, lists seeded straight into the store.
pub struct BoardFixture {
    pub node: SyncNode,
    pub tenant_id: TenantId,
    pub board_id: BoardId,
    pub lists: Vec<EntityId>,
    last_list_rank: Option<RankKey>,
}

impl BoardFixture {
    pub fn new(config: NodeConfig) -> Self {
        let node = SyncNode::new(config);
        let tenant_id = TenantId::new(TENANT);
        let board_id = BoardId::new(BOARD);
        node.store().add_board(&tenant_id, &board_id);
        for caller in CALLERS {
            node.identity().allow(&tenant_id, &CallerId::new(caller));
        }
        Self {
            node,
            tenant_id,
            board_id,
            lists: Vec::new(),
            last_list_rank: None,
        }
    }

    /// Add a list holding `cards` with explicit ranks.
    pub fn with_list(mut self, list: &str, cards: &[(&str, &str)]) -> Self {
        let rank = next(self.last_list_rank.as_ref());
        self.node
            .store()
            .insert_item(
                &self.tenant_id,
                EntityKind::List,
                OrderedItem::new(list, BOARD, rank.clone()),
            )
            .expect("board accepts lists");
        for (card, card_rank) in cards {
            self.node
                .store()
                .insert_item(
                    &self.tenant_id,
                    EntityKind::Card,
                    OrderedItem::new(*card, list, *card_rank),
                )
                .expect("list accepts cards");
        }
        self.last_list_rank = Some(rank);
        self.lists.push(id(list));
        self
    }

    /// Add a list holding `cards` in the given order.
    pub fn with_ordered_list(self, list: &str, cards: &[&str]) -> Self {
        let ranks = bs_01_rank_keys::rebalanced_ranks(cards.len());
        let seeded: Vec<(&str, &str)> = cards
            .iter()
            .zip(&ranks)
            .map(|(card, rank)| (*card, rank.as_str()))
            .collect();
        self.with_list(list, &seeded)
    }

    pub async fn client(&self, caller: &str) -> BoardClient {
        self.node
            .connect_client(
                &self.tenant_id,
                &CallerId::new(caller),
                &self.board_id,
                self.lists.clone(),
            )
            .await
            .expect("client connects")
    }

    /// Delete `entity` at the coordinator on behalf of `caller`.
    pub async fn delete(&self, caller: &str, entity: &str) -> MutationEnvelope {
        self.node
            .coordinator()
            .propose_delete(DeleteRequest {
                tenant_id: self.tenant_id.clone(),
                caller_id: CallerId::new(caller),
                entity_id: id(entity),
                origin_client_id: None,
            })
            .await
            .expect("entity deletes")
    }

    pub fn stored(&self, list: &EntityId) -> Vec<OrderedItem> {
        self.node.store().children(&self.tenant_id, list)
    }

    pub fn authoritative(&self, list: &EntityId) -> Vec<EntityId> {
        self.stored(list).into_iter().map(|item| item.id).collect()
    }

    /// Whether every client renders exactly the stored order of every list.
    pub fn matches_store(&self, clients: &[&BoardClient]) -> bool {
        self.lists.iter().all(|list| {
            let truth = self.authoritative(list);
            clients.iter().all(|client| client.order(list) == truth)
        })
    }

    pub async fn converged(&self, clients: &[&BoardClient]) -> bool {
        wait_until(Duration::from_secs(3), || self.matches_store(clients)).await
    }

    /// No list in the store holds two siblings with the same rank.
    pub fn store_has_distinct_ranks(&self) -> bool {
        self.lists
            .iter()
            .all(|list| !has_duplicate_ranks(&self.stored(list)))
    }
}
