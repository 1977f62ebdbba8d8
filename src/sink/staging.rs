//! Downstream staging notifications
//!
//! After a daily snapshot persists, the keys it touched are forwarded to
//! dependents (cache invalidation, re-indexing). Delivery is
//! fire-and-forget: losing a staging hint is acceptable, blocking the
//! single consumer is not.

use super::types::StagingAggregateKeys;
use tokio::sync::mpsc;

pub trait StagingDispatcher: Send + Sync {
    /// Forward a staged key set downstream; must never block the caller
    fn dispatch(&self, staged: StagingAggregateKeys);
}

/// Channel-backed dispatcher feeding an in-process downstream task
pub struct ChannelStagingDispatcher {
    tx: mpsc::Sender<StagingAggregateKeys>,
}

impl ChannelStagingDispatcher {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<StagingAggregateKeys>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

impl StagingDispatcher for ChannelStagingDispatcher {
    fn dispatch(&self, staged: StagingAggregateKeys) {
        if let Err(e) = self.tx.try_send(staged) {
            log::warn!("⚠️  Dropped staging notification: {}", e);
        }
    }
}
