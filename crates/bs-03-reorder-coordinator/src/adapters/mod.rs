//! Adapters layer

pub mod identity;
pub mod memory_store;
pub mod publisher;

pub use identity::AllowListIdentity;
pub use memory_store::InMemoryOrderStore;
pub use publisher::{BusPublisher, TransportFactory};
