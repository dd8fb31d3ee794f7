// ── Event bus ──
//
// Process-wide broadcast of `LinkEvent`s. Transient events reach whoever
// is subscribed at emission time; the latest directory snapshot is kept
// aside and replayed to each new subscriber.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::model::{DiscoveredPeripheral, LinkEvent};

const EVENT_CHANNEL_SIZE: usize = 256;

/// Cheaply cloneable handle to the process-wide event bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    tx: broadcast::Sender<LinkEvent>,
    directory: ArcSwapOption<Vec<DiscoveredPeripheral>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            inner: Arc::new(BusInner {
                tx,
                directory: ArcSwapOption::empty(),
            }),
        }
    }

    /// Deliver a transient event to all current subscribers.
    pub fn publish(&self, event: LinkEvent) {
        trace!(%event, "publishing link event");
        // No subscribers is not an error.
        let _ = self.inner.tx.send(event);
    }

    /// Publish a directory snapshot and keep it for late subscribers.
    pub fn publish_directory(&self, peripherals: Arc<Vec<DiscoveredPeripheral>>) {
        self.inner.directory.store(Some(Arc::clone(&peripherals)));
        self.publish(LinkEvent::ScanResults { peripherals });
    }

    /// Replace the retained snapshot without notifying anyone.
    pub(crate) fn reset_directory(&self, peripherals: Arc<Vec<DiscoveredPeripheral>>) {
        self.inner.directory.store(Some(peripherals));
    }

    /// Latest directory snapshot, if a scan ever published one.
    pub fn latest_directory(&self) -> Option<Arc<Vec<DiscoveredPeripheral>>> {
        self.inner.directory.load_full()
    }

    /// Attach a subscriber. The first item it receives is the retained
    /// directory snapshot, when there is one.
    pub fn subscribe(&self) -> Subscription {
        // Subscribe before reading the snapshot so nothing published in
        // between is lost; at worst the snapshot is seen twice.
        let rx = self.inner.tx.subscribe();
        let replay = self
            .latest_directory()
            .map(|peripherals| LinkEvent::ScanResults { peripherals });
        Subscription { replay, rx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.tx.receiver_count()
    }
}

/// One subscriber's view of the bus.
pub struct Subscription {
    replay: Option<LinkEvent>,
    rx: broadcast::Receiver<LinkEvent>,
}

impl Subscription {
    /// Next event, or `None` once the bus is gone. A subscriber that falls
    /// behind skips the events it missed.
    pub async fn recv(&mut self) -> Option<LinkEvent> {
        if let Some(event) = self.replay.take() {
            return Some(event);
        }
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<LinkEvent> {
        if let Some(event) = self.replay.take() {
            return Some(event);
        }
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }
}
