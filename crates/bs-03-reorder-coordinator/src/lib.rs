//! # BS-03: Reorder Coordinator
//!
//! The authority for sibling order. Clients propose moves; the coordinator
//! recomputes the rank against authoritative neighbors, persists it and
//! broadcasts one canonical [`MutationEnvelope`](shared_types::MutationEnvelope)
//! on the board channel.
//!
//! ## Architecture
//!
//! - **Domain**: requests, store snapshots, store errors
//! - **Ports**: `ReorderApi` (inbound); `IdentityProvider`, `OrderStore`,
//!   `EnvelopePublisher` (outbound)
//! - **Application**: `ReorderCoordinator`, per-parent locks, per-channel
//!   sequencer
//! - **Adapters**: in-memory store, allow-list identity, bus publisher
//!
//! ## Ordering Guarantees
//!
//! | Guarantee | Mechanism |
//! |-----------|-----------|
//! | No two siblings share a rank | Per-parent lock plus neighbor check in the store |
//! | Every client applies the same order | One sequence per board channel, assigned at persist time |
//! | Bounded latency under contention | Retry budget covers lock wait and retries |
//! | Keys stay short | Automatic rebalance past `rebalance_threshold` |

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod ports;

pub use adapters::{AllowListIdentity, BusPublisher, InMemoryOrderStore, TransportFactory};
pub use application::ReorderCoordinator;
pub use config::CoordinatorConfig;
pub use domain::{
    CreateRequest, DeleteRequest, MoveRequest, OrderSnapshot, ParentSnapshot, PersistCreate,
    PersistMove, StoreError, StoredEntity, UpdateRequest,
};
pub use ports::{EnvelopePublisher, IdentityProvider, OrderStore, ReorderApi};
