//! # BS-02: Optimistic Reconciler
//!
//! Per-client in-memory ordered view that applies local moves immediately
//! and merges canonical envelopes deterministically.
//!
//! ## Architecture
//!
//! - **Domain**: `ClientOrderView` state machine (Idle / Pending /
//!   Reconciling), transitions, snapshots
//! - **Ports**: Inbound (`BoardSyncApi`) and Outbound (`MoveGateway`,
//!   `SnapshotSource`, `ViewObserver`)
//! - **Application**: `SyncSession`, which binds a view to the event bus and
//!   the coordinator
//!
//! ## Conflict Policy
//!
//! Canonical wins. A durably accepted envelope always replaces the local
//! optimistic guess for the same entity; the user sees at most a transient
//! correction, never an error.

pub mod application;
pub mod domain;
pub mod ports;

pub use application::session::SyncSession;
pub use domain::errors::ReconcileError;
pub use domain::value_objects::{
    BoardSnapshot, EntityState, MoveCommand, PendingMove, Transition, ViewChange,
};
pub use domain::view::ClientOrderView;
pub use ports::inbound::BoardSyncApi;
pub use ports::outbound::{MoveGateway, SnapshotSource, ViewObserver};
