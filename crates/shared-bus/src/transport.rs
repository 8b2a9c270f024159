//! # Transport Port
//!
//! The publish/subscribe transport the [`EventBusClient`](crate::EventBusClient)
//! wraps. Treated as a black box offering `send(channel, bytes)` plus an
//! inbound frame stream and a connection-state signal.

use async_trait::async_trait;
use shared_types::{ChannelId, SyncError};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

/// One message as seen on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub channel: ChannelId,
    pub payload: Vec<u8>,
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

impl ConnectionState {
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Errors from transport operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection is down.
    #[error("Transport disconnected")]
    Disconnected,

    /// The transport was torn down and will not come back.
    #[error("Transport closed")]
    Closed,

    /// Any other delivery failure.
    #[error("Send failed: {0}")]
    SendFailed(String),
}

impl From<TransportError> for SyncError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Disconnected => SyncError::Disconnected,
            other => SyncError::Transport(other.to_string()),
        }
    }
}

/// The raw pub/sub transport.
///
/// Implementations must deliver frames of one channel to each member in the
/// order they were sent. Memberships are not expected to survive a
/// disconnect; the bus client re-joins after reconnecting.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `payload` to every current member of `channel`.
    async fn send(&self, channel: &ChannelId, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Start receiving frames for `channel`. Joining twice is a no-op.
    async fn join(&self, channel: &ChannelId) -> Result<(), TransportError>;

    /// Stop receiving frames for `channel`. Leaving an unjoined channel is a
    /// no-op.
    async fn leave(&self, channel: &ChannelId) -> Result<(), TransportError>;

    /// Hand out the inbound frame stream. Only the first call returns it.
    fn take_inbound(&self) -> Option<mpsc::UnboundedReceiver<Frame>>;

    /// Watch the connection state.
    fn state(&self) -> watch::Receiver<ConnectionState>;
}
