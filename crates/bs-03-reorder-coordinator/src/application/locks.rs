//! Serialization primitives for the coordinator.

use parking_lot::Mutex;
use shared_types::{ChannelId, EntityId, TenantId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per `(tenant, parent)`.
///
/// Rank computation for a parent happens under its lock, so two proposals
/// for the same parent never compute against the same neighbors.
#[derive(Debug, Default)]
pub struct ParentLocks {
    locks: Mutex<HashMap<(TenantId, EntityId), Arc<AsyncMutex<()>>>>,
}

impl ParentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, tenant_id: &TenantId, parent_id: &EntityId) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(
            self.locks
                .lock()
                .entry((tenant_id.clone(), parent_id.clone()))
                .or_default(),
        );
        lock.lock_owned().await
    }

    /// Drop locks nobody holds or waits on.
    pub fn prune(&self) -> usize {
        let mut locks = self.locks.lock();
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-channel sequence counter.
///
/// The guard holds the channel's last assigned sequence. Commits persist,
/// bump and publish while holding it, so sequence order on a channel is
/// persist order and publish order.
///
/// Idle channels give up their mutex on [`prune`](Self::prune); only the
/// last sequence is kept, and a later lock resumes from it.
#[derive(Debug, Default)]
pub struct ChannelSequencer {
    state: Mutex<SequencerState>,
}

#[derive(Debug, Default)]
struct SequencerState {
    active: HashMap<ChannelId, Arc<AsyncMutex<u64>>>,
    parked: HashMap<ChannelId, u64>,
}

impl ChannelSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, channel: &ChannelId) -> OwnedMutexGuard<u64> {
        let counter = {
            let mut state = self.state.lock();
            let SequencerState { active, parked } = &mut *state;
            Arc::clone(active.entry(channel.clone()).or_insert_with(|| {
                Arc::new(AsyncMutex::new(parked.remove(channel).unwrap_or(0)))
            }))
        };
        counter.lock_owned().await
    }

    /// Last sequence assigned on `channel`; 0 before the first commit.
    pub async fn current(&self, channel: &ChannelId) -> u64 {
        *self.lock(channel).await
    }

    /// Park channels nobody holds or waits on. Returns how many were parked.
    pub fn prune(&self) -> usize {
        let mut state = self.state.lock();
        let idle: Vec<(ChannelId, u64)> = state
            .active
            .iter()
            .filter(|(_, counter)| Arc::strong_count(counter) == 1)
            .filter_map(|(channel, counter)| {
                counter.try_lock().ok().map(|sequence| (channel.clone(), *sequence))
            })
            .collect();
        for (channel, sequence) in &idle {
            state.active.remove(channel);
            if *sequence > 0 {
                state.parked.insert(channel.clone(), *sequence);
            }
        }
        idle.len()
    }

    /// Channels currently holding a mutex.
    pub fn active(&self) -> usize {
        self.state.lock().active.len()
    }
}
