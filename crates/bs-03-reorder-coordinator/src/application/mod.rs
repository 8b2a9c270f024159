//! Application layer

pub mod locks;
pub mod service;

pub use locks::{ChannelSequencer, ParentLocks};
pub use service::ReorderCoordinator;
