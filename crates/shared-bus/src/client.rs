//! # Event Bus Client
//!
//! Tenant-bound publish/subscribe over a [`Transport`].
//!
//! ## Guarantees
//!
//! - `assert_ownership` runs before every publish and subscribe, and again on
//!   every inbound frame before it reaches a handler.
//! - Each subscription owns an ordered queue and a worker task; a slow
//!   handler delays only its own subscription.
//! - While disconnected, `publish` fails fast with `SyncError::Disconnected`.
//!   Subscriptions made meanwhile are joined on reconnect.
//! - After a reconnect every active channel is re-joined before the client
//!   reports `Connected`; failed joins are retried with a doubling pause. Missed envelopes are not replayed; callers resync
//!   from authoritative state.

use crate::handler::EnvelopeHandler;
use crate::registry::{Removal, SubscriptionHandle, SubscriptionRegistry};
use crate::transport::{ConnectionState, Frame, Transport, TransportError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared_types::{
    assert_ownership, validate_tenant_id, ChannelId, ClientId, MutationEnvelope, SyncError,
    TenantId,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Bus client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Label attached to the client's log lines.
    pub client_label: Option<String>,
    /// First pause before retrying a failed re-join (milliseconds)
    pub rejoin_backoff_ms: u64,
    /// Cap for the doubling re-join pause (milliseconds)
    pub rejoin_max_backoff_ms: u64,
}

impl BusConfig {
    fn rejoin_backoff(&self) -> Duration {
        Duration::from_millis(self.rejoin_backoff_ms.max(1))
    }

    fn rejoin_max_backoff(&self) -> Duration {
        Duration::from_millis(self.rejoin_max_backoff_ms.max(self.rejoin_backoff_ms))
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            client_label: None,
            rejoin_backoff_ms: 50,
            rejoin_max_backoff_ms: 2000,
        }
    }
}

struct ClientInner {
    tenant_id: TenantId,
    client_id: ClientId,
    label: String,
    transport: Arc<dyn Transport>,
    registry: SubscriptionRegistry,
    state: Arc<watch::Sender<ConnectionState>>,
    closed: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

/// A tenant-bound event bus connection.
#[derive(Clone)]
pub struct EventBusClient {
    inner: Arc<ClientInner>,
}

impl EventBusClient {
    /// Bind a transport connection to `tenant_id`.
    ///
    /// # Errors
    ///
    /// - `SyncError::InvalidTenantId` for a malformed tenant id
    /// - `SyncError::Transport` when the transport's inbound stream was
    ///   already claimed
    pub async fn connect(
        config: BusConfig,
        tenant_id: TenantId,
        client_id: ClientId,
        transport: Arc<dyn Transport>,
        registry: SubscriptionRegistry,
    ) -> Result<Self, SyncError> {
        validate_tenant_id(&tenant_id)?;

        let inbound = transport
            .take_inbound()
            .ok_or_else(|| SyncError::Transport("inbound stream already claimed".into()))?;
        let transport_state = transport.state();
        let initial = *transport_state.borrow();
        let (state_tx, _) = watch::channel(initial);
        let label = config
            .client_label
            .clone()
            .unwrap_or_else(|| client_id.as_str().to_string());

        let inner = Arc::new(ClientInner {
            tenant_id,
            client_id,
            label,
            transport,
            registry,
            state: Arc::new(state_tx),
            closed: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        });

        let dispatcher = tokio::spawn(dispatch_loop(
            inner.tenant_id.clone(),
            inner.label.clone(),
            inner.registry.clone(),
            inbound,
        ));
        let monitor = tokio::spawn(monitor_loop(
            inner.label.clone(),
            Arc::clone(&inner.transport),
            inner.registry.clone(),
            Arc::clone(&inner.state),
            transport_state,
            config,
        ));
        inner.tasks.lock().extend([dispatcher, monitor]);

        info!(
            tenant_id = %inner.tenant_id,
            client = %inner.label,
            state = ?initial,
            "Event bus client connected"
        );
        Ok(Self { inner })
    }

    #[must_use]
    pub fn tenant_id(&self) -> &TenantId {
        &self.inner.tenant_id
    }

    #[must_use]
    pub fn client_id(&self) -> &ClientId {
        &self.inner.client_id
    }

    /// Current client-level connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Watch the client-level connection state.
    #[must_use]
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Send `envelope` to every subscriber of `channel`.
    ///
    /// # Errors
    ///
    /// - `SyncError::TenantIsolationViolation` - channel or envelope belongs
    ///   to another tenant; nothing is sent
    /// - `SyncError::Disconnected` - the bus is down
    /// - `SyncError::Codec` / `SyncError::Transport` - delivery failed
    pub async fn publish(
        &self,
        channel: &ChannelId,
        envelope: &MutationEnvelope,
    ) -> Result<(), SyncError> {
        let inner = &self.inner;
        assert_ownership(channel, &inner.tenant_id)?;
        if envelope.tenant_id != inner.tenant_id {
            error!(
                channel = %channel,
                caller_tenant = %inner.tenant_id,
                envelope_tenant = %envelope.tenant_id,
                "SECURITY: refusing to publish foreign-tenant envelope"
            );
            return Err(SyncError::TenantIsolationViolation {
                channel: channel.as_str().to_string(),
                caller_tenant: inner.tenant_id.as_str().to_string(),
            });
        }
        if inner.closed.load(Ordering::Acquire) || !self.connection_state().is_connected() {
            return Err(SyncError::Disconnected);
        }

        let bytes = envelope.encode()?;
        inner.transport.send(channel, bytes).await?;

        debug!(
            channel = %channel,
            client = %inner.label,
            kind = envelope.kind().as_str(),
            sequence = envelope.sequence_hint,
            "Envelope published"
        );
        Ok(())
    }

    /// Deliver every envelope later published on `channel` to `handler`.
    ///
    /// # Errors
    ///
    /// - `SyncError::TenantIsolationViolation` - channel belongs to another
    ///   tenant; nothing is registered
    /// - `SyncError::Disconnected` - the client was shut down
    /// - `SyncError::Transport` - the transport refused the join
    pub async fn subscribe(
        &self,
        channel: &ChannelId,
        handler: Arc<dyn EnvelopeHandler>,
    ) -> Result<SubscriptionHandle, SyncError> {
        let inner = &self.inner;
        assert_ownership(channel, &inner.tenant_id)?;
        if inner.closed.load(Ordering::Acquire) {
            return Err(SyncError::Disconnected);
        }

        let (queue_tx, mut queue_rx) = mpsc::unbounded_channel::<MutationEnvelope>();
        let handle = inner.registry.insert(channel.clone(), queue_tx);

        match inner.transport.join(channel).await {
            Ok(()) => {}
            Err(TransportError::Disconnected) => {
                debug!(channel = %channel, client = %inner.label, "Subscribed while disconnected; joining on reconnect");
            }
            Err(e) => {
                inner.registry.remove(&handle);
                return Err(e.into());
            }
        }

        let worker = tokio::spawn(async move {
            while let Some(envelope) = queue_rx.recv().await {
                handler.handle(envelope).await;
            }
        });
        {
            let mut tasks = inner.tasks.lock();
            tasks.retain(|task| !task.is_finished());
            tasks.push(worker);
        }

        info!(channel = %channel, client = %inner.label, "Subscribed");
        Ok(handle)
    }

    /// Stop delivery for `handle`. Unknown or already removed handles are a
    /// no-op.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let inner = &self.inner;
        match inner.registry.remove(handle) {
            Removal::Unknown => {}
            Removal::Removed => {
                debug!(channel = %handle.channel(), client = %inner.label, "Unsubscribed");
            }
            Removal::LastOnChannel => {
                if let Err(e) = inner.transport.leave(handle.channel()).await {
                    debug!(channel = %handle.channel(), error = %e, "Leave failed");
                }
                debug!(channel = %handle.channel(), client = %inner.label, "Unsubscribed, channel left");
            }
        }
    }

    #[must_use]
    pub fn is_subscribed(&self, handle: &SubscriptionHandle) -> bool {
        self.inner.registry.is_active(handle)
    }

    /// Tear down every subscription and stop background tasks. Publishing
    /// afterwards fails with `SyncError::Disconnected`.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        for channel in inner.registry.clear() {
            if let Err(e) = inner.transport.leave(&channel).await {
                debug!(channel = %channel, error = %e, "Leave failed during shutdown");
            }
        }
        let tasks: Vec<_> = inner.tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
        }
        inner.state.send_replace(ConnectionState::Disconnected);
        info!(client = %inner.label, "Event bus client shut down");
    }
}

async fn dispatch_loop(
    tenant_id: TenantId,
    label: String,
    registry: SubscriptionRegistry,
    mut inbound: mpsc::UnboundedReceiver<Frame>,
) {
    while let Some(frame) = inbound.recv().await {
        if assert_ownership(&frame.channel, &tenant_id).is_err() {
            continue;
        }

        let envelope = match MutationEnvelope::decode(&frame.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(channel = %frame.channel, client = %label, error = %e, "Dropping undecodable frame");
                continue;
            }
        };

        if envelope.tenant_id != tenant_id {
            error!(
                channel = %frame.channel,
                caller_tenant = %tenant_id,
                envelope_tenant = %envelope.tenant_id,
                "SECURITY: dropping foreign-tenant envelope"
            );
            continue;
        }

        let reached = registry.route(&frame.channel, &envelope);
        debug!(
            channel = %frame.channel,
            client = %label,
            sequence = envelope.sequence_hint,
            subscriptions = reached,
            "Envelope delivered"
        );
    }
    debug!(client = %label, "Inbound stream closed");
}

async fn monitor_loop(
    label: String,
    transport: Arc<dyn Transport>,
    registry: SubscriptionRegistry,
    state: Arc<watch::Sender<ConnectionState>>,
    mut transport_state: watch::Receiver<ConnectionState>,
    config: BusConfig,
) {
    let mut unseen = false;
    loop {
        if !unseen && transport_state.changed().await.is_err() {
            break;
        }
        unseen = false;
        let current = *transport_state.borrow_and_update();
        match current {
            ConnectionState::Disconnected => {
                state.send_replace(ConnectionState::Disconnected);
                warn!(client = %label, "Event bus disconnected");
            }
            ConnectionState::Connected => {
                match rejoin(&label, transport.as_ref(), &registry, &mut transport_state, &config).await {
                    Rejoin::Done(channels) => {
                        state.send_replace(ConnectionState::Connected);
                        info!(client = %label, channels, "Event bus reconnected");
                    }
                    Rejoin::Interrupted => unseen = true,
                    Rejoin::Closed => break,
                }
            }
        }
    }
}

enum Rejoin {
    Done(usize),
    /// The transport changed state before every channel was joined.
    Interrupted,
    Closed,
}

/// Join every registered channel, retrying failures with a doubling pause
/// until all succeed or the transport state moves on.
async fn rejoin(
    label: &str,
    transport: &dyn Transport,
    registry: &SubscriptionRegistry,
    transport_state: &mut watch::Receiver<ConnectionState>,
    config: &BusConfig,
) -> Rejoin {
    let mut delay = config.rejoin_backoff();
    loop {
        let channels = registry.channels();
        let mut failed = 0usize;
        for channel in &channels {
            if let Err(e) = transport.join(channel).await {
                failed += 1;
                warn!(client = %label, channel = %channel, error = %e, "Re-join failed");
            }
        }
        if failed == 0 {
            return Rejoin::Done(channels.len());
        }

        debug!(client = %label, failed, delay_ms = delay.as_millis() as u64, "Retrying re-join");
        tokio::select! {
            changed = transport_state.changed() => {
                return if changed.is_ok() { Rejoin::Interrupted } else { Rejoin::Closed };
            }
            () = sleep(delay) => {}
        }
        delay = (delay * 2).min(config.rejoin_max_backoff());
    }
}
