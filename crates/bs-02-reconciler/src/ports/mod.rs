//! Ports (hexagonal boundaries)

pub mod inbound;
pub mod outbound;
