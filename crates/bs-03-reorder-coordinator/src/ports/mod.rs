//! Ports layer (hexagonal architecture)

pub mod inbound;
pub mod outbound;

pub use inbound::ReorderApi;
pub use outbound::{EnvelopePublisher, IdentityProvider, OrderStore};
