//! Observer side of the live queue.
//!
//! A subscriber is anything that implements [`SnapshotSink`]. The hub pushes
//! every complete snapshot into each sink; a sink that refuses a push is
//! detached on the spot.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::models::queue::QueueSnapshot;
use crate::services::hub::QueueHub;

pub type SubscriberId = u64;

/// Snapshots an in-process subscriber may have pending before it is
/// considered stalled and detached.
pub const SUBSCRIBER_BUFFER: usize = 64;

/// Destination for broadcast snapshots.
///
/// `deliver` runs while the hub holds its (non-reentrant) lock. It must not
/// block and must not call back into the hub; calling `attach`, `detach` or
/// any mutation from inside `deliver` deadlocks. A sink that wants to leave
/// returns an error instead and the hub detaches it.
pub trait SnapshotSink: Send + Sync {
    fn deliver(&self, snapshot: Arc<QueueSnapshot>) -> Result<(), DeliveryError>;
}

/// Sink half of an in-process subscription.
pub struct ChannelSink {
    tx: mpsc::Sender<Arc<QueueSnapshot>>,
}

impl SnapshotSink for ChannelSink {
    fn deliver(&self, snapshot: Arc<QueueSnapshot>) -> Result<(), DeliveryError> {
        self.tx.try_send(snapshot).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Lagged(SUBSCRIBER_BUFFER),
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Receiving half handed to an observer.
///
/// The first snapshot received is the queue state at attach time. Dropping
/// the subscription detaches it from the hub.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Arc<QueueSnapshot>>,
    hub: Arc<QueueHub>,
}

impl Subscription {
    pub(crate) fn channel() -> (ChannelSink, mpsc::Receiver<Arc<QueueSnapshot>>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        (ChannelSink { tx }, rx)
    }

    pub(crate) fn new(
        id: SubscriberId,
        rx: mpsc::Receiver<Arc<QueueSnapshot>>,
        hub: Arc<QueueHub>,
    ) -> Self {
        Self { id, rx, hub }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next snapshot, or `None` once the hub has dropped this subscriber and
    /// the pending snapshots are drained.
    pub async fn recv(&mut self) -> Option<Arc<QueueSnapshot>> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<Arc<QueueSnapshot>> {
        self.rx.try_recv().ok()
    }

    pub fn detach(&self) {
        self.hub.detach(self.id);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.detach(self.id);
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DeliveryError {
    #[error("subscriber channel closed")]
    Closed,

    #[error("subscriber fell behind by {0} snapshots")]
    Lagged(usize),

    #[error("subscriber rejected snapshot: {0}")]
    Rejected(String),
}
