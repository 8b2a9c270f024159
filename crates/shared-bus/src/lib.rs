//! # Shared Bus - Tenant-Isolated Event Bus
//!
//! Moves [`MutationEnvelope`](shared_types::MutationEnvelope)s between the
//! reorder coordinator and every connected client of a board.
//!
//! ## Topology
//!
//! ```text
//! ┌──────────────┐   publish()    ┌──────────────┐   frames    ┌──────────────┐
//! │ Coordinator  │ ─────────────▶ │  Transport   │ ──────────▶ │ Bus Client   │
//! │ (bus client) │                │  (hub/broker)│             │  dispatcher  │
//! └──────────────┘                └──────────────┘             └──────┬───────┘
//!                                                                     │ route
//!                                                          ┌──────────┴─────────┐
//!                                                          ▼                    ▼
//!                                                   subscription queue   subscription queue
//!                                                     + worker             + worker
//! ```
//!
//! ## Security
//!
//! - **Ownership checks:** `assert_ownership` guards publish, subscribe and
//!   every inbound frame.
//! - **Envelope tenant:** an envelope whose `tenant_id` differs from the
//!   client's tenant is never sent and never delivered.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod client;
pub mod handler;
pub mod memory;
pub mod registry;
pub mod sequence;
pub mod transport;

// Re-export main types
pub use client::{BusConfig, EventBusClient};
pub use handler::{EnvelopeHandler, FnHandler};
pub use memory::{InMemoryHub, InMemoryTransport};
pub use registry::{Removal, SubscriptionHandle, SubscriptionRegistry};
pub use sequence::SequenceTracker;
pub use transport::{ConnectionState, Frame, Transport, TransportError};
