//! Live queue of in-flight cases.
//!
//! Every mutation rebuilds the full snapshot and fans it out to all
//! subscribers under a single lock, so observers see whole mutations in one
//! global order. The lock covers bookkeeping and non-blocking delivery only;
//! no inference or I/O ever runs while it is held.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::models::queue::{QueueEntry, QueueSnapshot, StageLabel};
use crate::services::subscription::{SnapshotSink, SubscriberId, Subscription};

pub struct QueueHub {
    inner: Mutex<HubInner>,
    next_subscriber: AtomicU64,
}

#[derive(Default)]
struct HubInner {
    /// Kept in registration order.
    entries: Vec<QueueEntry>,
    subscribers: Vec<(SubscriberId, Box<dyn SnapshotSink>)>,
    seq: u64,
}

impl HubInner {
    fn snapshot(&self) -> Arc<QueueSnapshot> {
        Arc::new(QueueSnapshot {
            entries: self.entries.clone(),
            seq: self.seq,
        })
    }

    /// Advance the sequence and push the new state to every subscriber,
    /// dropping the ones whose delivery fails.
    fn broadcast(&mut self) -> Arc<QueueSnapshot> {
        self.seq += 1;
        let snapshot = self.snapshot();

        self.subscribers.retain(|(id, sink)| match sink.deliver(Arc::clone(&snapshot)) {
            Ok(()) => true,
            Err(e) => {
                debug!(subscriber_id = id, error = %e, "Detaching subscriber after failed delivery");
                false
            }
        });

        metrics::gauge!("media_verify_queue_depth").set(self.entries.len() as f64);
        metrics::gauge!("media_verify_queue_subscribers").set(self.subscribers.len() as f64);
        snapshot
    }
}

impl Default for QueueHub {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueHub {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HubInner::default()),
            next_subscriber: AtomicU64::new(1),
        }
    }

    /// Add a new in-flight case and broadcast.
    pub fn register(&self, entry: QueueEntry) -> Result<Arc<QueueSnapshot>, HubError> {
        let mut inner = self.inner.lock();
        if inner.entries.iter().any(|e| e.id == entry.id) {
            warn!(case_id = %entry.id, "Refusing duplicate queue registration");
            return Err(HubError::Duplicate(entry.id));
        }
        debug!(case_id = %entry.id, media_type = %entry.media_type, "Queue entry registered");
        inner.entries.push(entry);
        Ok(inner.broadcast())
    }

    /// Move a case to a new stage and progress value, then broadcast.
    ///
    /// Progress never moves backwards; a lower value keeps the current one.
    /// Returns `false` without broadcasting when the case is not queued,
    /// which happens when an update races the case's removal.
    pub fn update_progress(&self, id: &str, progress: u8, stage: StageLabel) -> bool {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.entries.iter_mut().find(|e| e.id == id) else {
            warn!(case_id = %id, progress, stage = %stage, "Progress update for unknown queue entry dropped");
            return false;
        };

        let progress = progress.min(100);
        if progress < entry.progress {
            warn!(
                case_id = %id,
                current = entry.progress,
                requested = progress,
                "Ignoring progress regression"
            );
        } else {
            entry.progress = progress;
        }
        entry.stage = stage;
        inner.broadcast();
        true
    }

    /// Remove a case and broadcast. Absent ids are a no-op.
    pub fn unregister(&self, id: &str) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|e| e.id != id);
        if inner.entries.len() == before {
            return false;
        }
        debug!(case_id = %id, "Queue entry removed");
        inner.broadcast();
        true
    }

    /// Attach an arbitrary sink.
    ///
    /// The current snapshot is delivered before the sink joins the subscriber
    /// set; if that first delivery fails the sink is never attached.
    pub fn attach(&self, sink: Box<dyn SnapshotSink>) -> Option<SubscriberId> {
        let mut inner = self.inner.lock();
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = sink.deliver(inner.snapshot()) {
            debug!(subscriber_id = id, error = %e, "Initial snapshot delivery failed");
            return None;
        }
        inner.subscribers.push((id, sink));
        metrics::gauge!("media_verify_queue_subscribers").set(inner.subscribers.len() as f64);
        debug!(subscriber_id = id, "Subscriber attached");
        Some(id)
    }

    /// Attach an in-process channel subscriber.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let (sink, rx) = Subscription::channel();
        // A fresh channel cannot be closed, so the initial delivery succeeds.
        let id = self.attach(Box::new(sink)).unwrap_or_default();
        Subscription::new(id, rx, Arc::clone(self))
    }

    /// Remove a subscriber. Idempotent.
    pub fn detach(&self, id: SubscriberId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(sid, _)| *sid != id);
        let removed = inner.subscribers.len() != before;
        if removed {
            metrics::gauge!("media_verify_queue_subscribers").set(inner.subscribers.len() as f64);
            debug!(subscriber_id = id, "Subscriber detached");
        }
        removed
    }

    /// Current state, without broadcasting.
    pub fn snapshot(&self) -> Arc<QueueSnapshot> {
        self.inner.lock().snapshot()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().entries.iter().any(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum HubError {
    #[error("case {0} is already in the live queue")]
    Duplicate(String),
}
