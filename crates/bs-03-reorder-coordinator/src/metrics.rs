//! # Coordinator Metrics
//!
//! Prometheus metrics for the reorder coordinator.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! bs-03-reorder-coordinator = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `reorder_moves_proposed_total` - Counter of move proposals received
//! - `reorder_moves_committed_total` - Counter of moves persisted and published
//! - `reorder_conflict_retries_total` - Counter of rank re-computations after a conflict
//! - `reorder_conflicts_exhausted_total` - Counter of proposals failed with `Conflict`
//! - `reorder_rebalances_total` - Counter of parent rebalances
//! - `reorder_envelopes_published_total` - Counter of envelopes published (by kind)
//! - `reorder_publish_failures_total` - Counter of publishes that failed after persist
//! - `reorder_isolation_violations_total` - Counter of rejected cross-tenant attempts

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Move proposals received
    pub static ref MOVES_PROPOSED: IntCounter = register_int_counter!(
        "reorder_moves_proposed_total",
        "Total number of move proposals received"
    )
    .expect("Failed to create MOVES_PROPOSED metric");

    /// Moves persisted and published
    pub static ref MOVES_COMMITTED: IntCounter = register_int_counter!(
        "reorder_moves_committed_total",
        "Total number of moves persisted"
    )
    .expect("Failed to create MOVES_COMMITTED metric");

    /// Conflict retries
    pub static ref CONFLICT_RETRIES: IntCounter = register_int_counter!(
        "reorder_conflict_retries_total",
        "Total number of rank re-computations after a store conflict"
    )
    .expect("Failed to create CONFLICT_RETRIES metric");

    /// Proposals that ran out of retries or time
    pub static ref CONFLICTS_EXHAUSTED: IntCounter = register_int_counter!(
        "reorder_conflicts_exhausted_total",
        "Total number of proposals failed with Conflict"
    )
    .expect("Failed to create CONFLICTS_EXHAUSTED metric");

    /// Parent rebalances
    pub static ref REBALANCES: IntCounter = register_int_counter!(
        "reorder_rebalances_total",
        "Total number of parent rebalances"
    )
    .expect("Failed to create REBALANCES metric");

    /// Envelopes published, labeled by mutation kind
    pub static ref ENVELOPES_PUBLISHED: IntCounterVec = register_int_counter_vec!(
        "reorder_envelopes_published_total",
        "Total number of envelopes published",
        &["kind"]
    )
    .expect("Failed to create ENVELOPES_PUBLISHED metric");

    /// Publishes that failed after the mutation was persisted
    pub static ref PUBLISH_FAILURES: IntCounter = register_int_counter!(
        "reorder_publish_failures_total",
        "Total number of publishes failed after persist"
    )
    .expect("Failed to create PUBLISH_FAILURES metric");

    /// Rejected cross-tenant attempts
    pub static ref ISOLATION_VIOLATIONS: IntCounter = register_int_counter!(
        "reorder_isolation_violations_total",
        "Total number of rejected tenant isolation violations"
    )
    .expect("Failed to create ISOLATION_VIOLATIONS metric");
}

// =============================================================================
// METRIC RECORDING FUNCTIONS
// =============================================================================

#[cfg(feature = "metrics")]
pub fn record_move_proposed() {
    MOVES_PROPOSED.inc();
}

#[cfg(feature = "metrics")]
pub fn record_move_committed() {
    MOVES_COMMITTED.inc();
}

#[cfg(feature = "metrics")]
pub fn record_conflict_retry() {
    CONFLICT_RETRIES.inc();
}

#[cfg(feature = "metrics")]
pub fn record_conflict_exhausted() {
    CONFLICTS_EXHAUSTED.inc();
}

#[cfg(feature = "metrics")]
pub fn record_rebalance() {
    REBALANCES.inc();
}

/// Record an envelope published, labeled by mutation kind
#[cfg(feature = "metrics")]
pub fn record_envelope_published(kind: &str) {
    ENVELOPES_PUBLISHED.with_label_values(&[kind]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_publish_failure() {
    PUBLISH_FAILURES.inc();
}

#[cfg(feature = "metrics")]
pub fn record_isolation_violation() {
    ISOLATION_VIOLATIONS.inc();
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn record_move_proposed() {}

#[cfg(not(feature = "metrics"))]
pub fn record_move_committed() {}

#[cfg(not(feature = "metrics"))]
pub fn record_conflict_retry() {}

#[cfg(not(feature = "metrics"))]
pub fn record_conflict_exhausted() {}

#[cfg(not(feature = "metrics"))]
pub fn record_rebalance() {}

#[cfg(not(feature = "metrics"))]
pub fn record_envelope_published(_kind: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_publish_failure() {}

#[cfg(not(feature = "metrics"))]
pub fn record_isolation_violation() {}
