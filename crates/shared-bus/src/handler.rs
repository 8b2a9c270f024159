//! Envelope handlers invoked by subscription workers.

use async_trait::async_trait;
use shared_types::MutationEnvelope;
use tokio::sync::mpsc;
use tracing::debug;

/// Receives every envelope delivered to one subscription, in channel order.
///
/// A handler may suspend; it only delays its own subscription.
#[async_trait]
pub trait EnvelopeHandler: Send + Sync {
    async fn handle(&self, envelope: MutationEnvelope);
}

/// Adapts a synchronous closure into a handler.
pub struct FnHandler<F>(F);

impl<F> FnHandler<F>
where
    F: Fn(MutationEnvelope) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> EnvelopeHandler for FnHandler<F>
where
    F: Fn(MutationEnvelope) + Send + Sync,
{
    async fn handle(&self, envelope: MutationEnvelope) {
        (self.0)(envelope);
    }
}

#[async_trait]
impl EnvelopeHandler for mpsc::UnboundedSender<MutationEnvelope> {
    async fn handle(&self, envelope: MutationEnvelope) {
        if self.send(envelope).is_err() {
            debug!("Envelope receiver dropped");
        }
    }
}
