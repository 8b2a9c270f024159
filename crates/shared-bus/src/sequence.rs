//! # Sequence Tracker
//!
//! Stale and duplicate envelope detection for one board channel.
//!
//! ## Rules
//!
//! - An envelope is stale when its `sequence_hint` is at or below the
//!   snapshot floor, or at or below the last sequence applied to the same
//!   entity.
//! - Raising the floor forgets per-entity entries it covers, which bounds
//!   memory the same way a time-bounded replay cache would.

use shared_types::EntityId;
use std::collections::HashMap;

/// Per-entity highest applied sequence plus a snapshot floor.
#[derive(Debug, Clone, Default)]
pub struct SequenceTracker {
    floor: u64,
    applied: HashMap<EntityId, u64>,
}

impl SequenceTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an envelope at `sequence` for `entity` was already covered.
    #[must_use]
    pub fn is_stale(&self, entity: &EntityId, sequence: u64) -> bool {
        sequence <= self.floor || self.applied.get(entity).is_some_and(|last| sequence <= *last)
    }

    /// Record that `sequence` was applied to `entity`.
    pub fn record(&mut self, entity: &EntityId, sequence: u64) {
        let last = self.applied.entry(entity.clone()).or_insert(0);
        *last = (*last).max(sequence);
    }

    /// Highest sequence applied to `entity` above the floor.
    #[must_use]
    pub fn last_applied(&self, entity: &EntityId) -> Option<u64> {
        self.applied.get(entity).copied()
    }

    /// Raise the floor to `sequence` (never lowers it).
    pub fn raise_floor(&mut self, sequence: u64) {
        self.floor = self.floor.max(sequence);
        let floor = self.floor;
        self.applied.retain(|_, last| *last > floor);
    }

    #[must_use]
    pub fn floor(&self) -> u64 {
        self.floor
    }

    /// Highest sequence seen overall.
    #[must_use]
    pub fn high_water(&self) -> u64 {
        self.applied.values().copied().fold(self.floor, u64::max)
    }
}
