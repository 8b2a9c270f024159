//! # Sync Node
//!
//! In-process Board-Sync runtime.
//!
//! ## Components
//!
//! 1. Event bus hub (`shared-bus`) - tenant channels
//! 2. Order store and identity provider (in-memory adapters)
//! 3. Reorder coordinator (bs-03) - authoritative ranks, canonical broadcast
//! 4. Client sessions (bs-02) - optimistic views converging on the broadcast

pub mod config;
pub mod gateway;
pub mod node;

pub use config::NodeConfig;
pub use gateway::CoordinatorGateway;
pub use node::{BoardClient, NodeError, SyncNode};
