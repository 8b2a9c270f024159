//! # Subscription Registry
//!
//! Tracks the active subscriptions of one bus client and routes inbound
//! envelopes to their delivery queues. Owned by exactly one
//! [`EventBusClient`](crate::EventBusClient) and torn down with it.

use parking_lot::RwLock;
use shared_types::{ChannelId, MutationEnvelope};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Identifies one subscription. Cheap to clone; unsubscribing is idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    channel: ChannelId,
}

impl SubscriptionHandle {
    #[must_use]
    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }
}

struct Entry {
    channel: ChannelId,
    queue: mpsc::UnboundedSender<MutationEnvelope>,
}

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    entries: HashMap<u64, Entry>,
    by_channel: HashMap<ChannelId, Vec<u64>>,
}

/// Outcome of removing a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The handle was already gone.
    Unknown,
    /// Other subscriptions on the channel remain.
    Removed,
    /// That was the last subscription on its channel.
    LastOnChannel,
}

/// Registry of active subscriptions.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a delivery queue for `channel`.
    pub fn insert(
        &self,
        channel: ChannelId,
        queue: mpsc::UnboundedSender<MutationEnvelope>,
    ) -> SubscriptionHandle {
        let mut state = self.state.write();
        let id = state.next_id;
        state.next_id += 1;
        state.entries.insert(
            id,
            Entry {
                channel: channel.clone(),
                queue,
            },
        );
        state.by_channel.entry(channel.clone()).or_default().push(id);
        SubscriptionHandle { id, channel }
    }

    /// Remove a subscription, dropping its queue so its worker drains and
    /// exits.
    pub fn remove(&self, handle: &SubscriptionHandle) -> Removal {
        let mut state = self.state.write();
        let Some(entry) = state.entries.remove(&handle.id) else {
            return Removal::Unknown;
        };

        let Some(ids) = state.by_channel.get_mut(&entry.channel) else {
            return Removal::LastOnChannel;
        };
        ids.retain(|id| *id != handle.id);
        if ids.is_empty() {
            state.by_channel.remove(&entry.channel);
            Removal::LastOnChannel
        } else {
            Removal::Removed
        }
    }

    /// Queue `envelope` for every subscription on `channel`. Returns the
    /// number of queues reached.
    pub fn route(&self, channel: &ChannelId, envelope: &MutationEnvelope) -> usize {
        let state = self.state.read();
        let Some(ids) = state.by_channel.get(channel) else {
            debug!(channel = %channel, "No subscription for inbound envelope");
            return 0;
        };

        ids.iter()
            .filter_map(|id| state.entries.get(id))
            .filter(|entry| entry.queue.send(envelope.clone()).is_ok())
            .count()
    }

    /// Channels with at least one subscription.
    #[must_use]
    pub fn channels(&self) -> Vec<ChannelId> {
        let mut channels: Vec<_> = self.state.read().by_channel.keys().cloned().collect();
        channels.sort();
        channels
    }

    #[must_use]
    pub fn is_active(&self, handle: &SubscriptionHandle) -> bool {
        self.state.read().entries.contains_key(&handle.id)
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Drop every subscription; returns the channels that were active.
    pub fn clear(&self) -> Vec<ChannelId> {
        let mut state = self.state.write();
        state.entries.clear();
        let mut channels: Vec<_> = state.by_channel.drain().map(|(channel, _)| channel).collect();
        channels.sort();
        channels
    }
}
