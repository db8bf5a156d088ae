use crate::metrics::MetricsCollector;
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;
use vigil_core::AccessEvent;

pub type EventSender = mpsc::Sender<Arc<AccessEvent>>;
pub type EventReceiver = mpsc::Receiver<Arc<AccessEvent>>;

/// Fan-out point for access events.
///
/// The subscriber list is append-only and copy-on-write: registration swaps
/// in a new `Vec`, publishers work on whatever snapshot they loaded. Publishing
/// never waits on a subscriber. A full or closed channel loses the event and
/// bumps the drop counter.
pub struct SinkRegistry {
    sinks: ArcSwap<Vec<EventSender>>,
    dropped: AtomicU64,
    metrics: Option<Arc<MetricsCollector>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self {
            sinks: ArcSwap::from_pointee(Vec::new()),
            dropped: AtomicU64::new(0),
            metrics: None,
        }
    }

    /// Registry that also reports drops to `metrics`.
    pub fn with_metrics(metrics: Arc<MetricsCollector>) -> Self {
        Self {
            metrics: Some(metrics),
            ..Self::new()
        }
    }

    /// Append a subscriber. There is no way to remove one.
    pub fn register_sink(&self, sink: EventSender) {
        self.sinks.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(sink.clone());
            next
        });
    }

    /// Create a bounded channel, register its sender and return the receiver.
    pub fn subscribe(&self, capacity: usize) -> EventReceiver {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.register_sink(tx);
        rx
    }

    /// Broadcast one event to every subscriber. Returns how many accepted it.
    pub fn publish(&self, event: AccessEvent) -> usize {
        let event = Arc::new(event);
        let sinks = self.sinks.load();
        let mut delivered = 0;
        for sink in sinks.iter() {
            match sink.try_send(Arc::clone(&event)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => self.record_drop("full"),
                Err(TrySendError::Closed(_)) => self.record_drop("closed"),
            }
        }
        delivered
    }

    fn record_drop(&self, reason: &'static str) {
        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(ref metrics) = self.metrics {
            metrics.record_dropped_event();
        }
        debug!(reason, total, "Access event dropped");
    }

    /// Events lost to full or closed subscribers since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.sinks.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}
