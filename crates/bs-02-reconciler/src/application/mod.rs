//! Application layer

pub mod session;
