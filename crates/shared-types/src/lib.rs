//! # Shared Types Crate
//!
//! This crate contains all domain entities, the `MutationEnvelope` broadcast
//! unit, the tenant channel namespace and the error taxonomy used across the
//! Board-Sync engine.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-component types are defined here.
//! - **Tagged Mutations**: Every envelope carries a `Mutation` enum so
//!   consumers match exhaustively on the mutation kind.
//! - **Single Enforcement Point**: Tenant isolation at the transport layer is
//!   decided by [`channel::assert_ownership`] and nowhere else.

pub mod channel;
pub mod entities;
pub mod envelope;
pub mod errors;

pub use channel::{
    assert_ownership, board_channel, channel_for, extract_tenant_id, validate_tenant_id,
    ChannelId, ChannelKind,
};
pub use entities::*;
pub use envelope::{Mutation, MutationEnvelope, MutationKind, RankAssignment};
pub use errors::SyncError;
