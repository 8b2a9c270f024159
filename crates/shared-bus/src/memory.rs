//! # In-Memory Hub
//!
//! A single-process broker standing in for a hosted pub/sub service.
//!
//! Fan-out happens under the hub lock, so every member of a channel sees the
//! channel's frames in one global send order. A disconnect drops all of the
//! connection's memberships, like a real broker would.

use crate::transport::{ConnectionState, Frame, Transport, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::ChannelId;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

type ConnectionId = u64;

struct Connection {
    inbound: mpsc::UnboundedSender<Frame>,
    state: watch::Sender<ConnectionState>,
    channels: HashSet<ChannelId>,
}

impl Connection {
    fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }
}

#[derive(Default)]
struct HubState {
    next_id: ConnectionId,
    connections: HashMap<ConnectionId, Connection>,
    members: HashMap<ChannelId, BTreeSet<ConnectionId>>,
}

impl HubState {
    fn drop_memberships(&mut self, id: ConnectionId) {
        let Some(connection) = self.connections.get_mut(&id) else {
            return;
        };
        for channel in connection.channels.drain() {
            if let Some(set) = self.members.get_mut(&channel) {
                set.remove(&id);
                if set.is_empty() {
                    self.members.remove(&channel);
                }
            }
        }
    }
}

/// Shared broker all in-memory transports connect to.
#[derive(Clone, Default)]
pub struct InMemoryHub {
    state: Arc<Mutex<HubState>>,
    frames_sent: Arc<AtomicU64>,
}

impl InMemoryHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new connection to the hub.
    #[must_use]
    pub fn connect(&self) -> InMemoryTransport {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connected);

        let id = {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.connections.insert(
                id,
                Connection {
                    inbound: inbound_tx,
                    state: state_tx,
                    channels: HashSet::new(),
                },
            );
            id
        };

        debug!(connection = id, "Hub connection opened");
        InMemoryTransport {
            id,
            hub: self.clone(),
            inbound: Mutex::new(Some(inbound_rx)),
            state: state_rx,
        }
    }

    /// Number of connections currently joined to `channel`.
    #[must_use]
    pub fn member_count(&self, channel: &ChannelId) -> usize {
        self.state.lock().members.get(channel).map_or(0, BTreeSet::len)
    }

    /// Total frames delivered to members.
    #[must_use]
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }
}

/// One connection to an [`InMemoryHub`].
pub struct InMemoryTransport {
    id: ConnectionId,
    hub: InMemoryHub,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<Frame>>>,
    state: watch::Receiver<ConnectionState>,
}

impl InMemoryTransport {
    /// Simulate a network drop. Memberships are lost.
    pub fn disconnect(&self) {
        let mut state = self.hub.state.lock();
        state.drop_memberships(self.id);
        if let Some(connection) = state.connections.get(&self.id) {
            connection.state.send_replace(ConnectionState::Disconnected);
        }
        info!(connection = self.id, "Hub connection dropped");
    }

    /// Simulate the network coming back. Channels must be re-joined.
    pub fn reconnect(&self) {
        let state = self.hub.state.lock();
        if let Some(connection) = state.connections.get(&self.id) {
            connection.state.send_replace(ConnectionState::Connected);
        }
        info!(connection = self.id, "Hub connection restored");
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send(&self, channel: &ChannelId, payload: Vec<u8>) -> Result<(), TransportError> {
        let state = self.hub.state.lock();
        let sender = state
            .connections
            .get(&self.id)
            .ok_or(TransportError::Closed)?;
        if !sender.is_connected() {
            return Err(TransportError::Disconnected);
        }

        let Some(members) = state.members.get(channel) else {
            debug!(channel = %channel, "Frame sent to channel without members");
            return Ok(());
        };

        let mut delivered = 0u64;
        for member in members {
            let Some(connection) = state.connections.get(member) else {
                continue;
            };
            let frame = Frame {
                channel: channel.clone(),
                payload: payload.clone(),
            };
            if connection.inbound.send(frame).is_ok() {
                delivered += 1;
            }
        }
        self.hub.frames_sent.fetch_add(delivered, Ordering::Relaxed);

        debug!(channel = %channel, receivers = delivered, "Frame fanned out");
        Ok(())
    }

    async fn join(&self, channel: &ChannelId) -> Result<(), TransportError> {
        let mut state = self.hub.state.lock();
        let connection = state
            .connections
            .get_mut(&self.id)
            .ok_or(TransportError::Closed)?;
        if !connection.is_connected() {
            return Err(TransportError::Disconnected);
        }
        connection.channels.insert(channel.clone());
        state
            .members
            .entry(channel.clone())
            .or_default()
            .insert(self.id);
        Ok(())
    }

    async fn leave(&self, channel: &ChannelId) -> Result<(), TransportError> {
        let mut state = self.hub.state.lock();
        if let Some(connection) = state.connections.get_mut(&self.id) {
            connection.channels.remove(channel);
        }
        if let Some(set) = state.members.get_mut(channel) {
            set.remove(&self.id);
            if set.is_empty() {
                state.members.remove(channel);
            }
        }
        Ok(())
    }

    fn take_inbound(&self) -> Option<mpsc::UnboundedReceiver<Frame>> {
        self.inbound.lock().take()
    }

    fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }
}

impl Drop for InMemoryTransport {
    fn drop(&mut self) {
        let mut state = self.hub.state.lock();
        state.drop_memberships(self.id);
        state.connections.remove(&self.id);
        debug!(connection = self.id, "Hub connection closed");
    }
}
