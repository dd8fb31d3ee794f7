// ── Tracker change feed ──
//
// A store publishes whole snapshots. Readers mostly want the trackers
// that appeared or moved, so `TrackerStream` remembers the `last_seen_at`
// it has already reported for each id and turns successive snapshots into
// update batches.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::{TrackerId, TrackerRecord};

/// Every record in a store, ordered by id.
pub type TrackerSnapshot = Arc<Vec<Arc<TrackerRecord>>>;

/// A live view of a tracker store.
pub struct TrackerStream {
    receiver: watch::Receiver<TrackerSnapshot>,
    current: TrackerSnapshot,
    reported: HashMap<TrackerId, DateTime<Utc>>,
}

impl TrackerStream {
    /// Records already in the snapshot at creation count as reported.
    pub fn new(mut receiver: watch::Receiver<TrackerSnapshot>) -> Self {
        let current = receiver.borrow_and_update().clone();
        let reported = current.iter().map(|r| (r.id, r.last_seen_at)).collect();
        Self {
            receiver,
            current,
            reported,
        }
    }

    /// Snapshot as of creation or the last `changed()` / `updates()`.
    pub fn current(&self) -> &TrackerSnapshot {
        &self.current
    }

    /// Latest published snapshot, without marking it seen.
    pub fn latest(&self) -> TrackerSnapshot {
        self.receiver.borrow().clone()
    }

    /// Wait for the next published snapshot. `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<TrackerSnapshot> {
        self.receiver.changed().await.ok()?;
        self.current = self.receiver.borrow_and_update().clone();
        Some(Arc::clone(&self.current))
    }

    /// Wait until at least one tracker was created or moved since the
    /// last batch and return those records, ordered by id.
    ///
    /// Snapshots published in quick succession may be coalesced; a record
    /// that moved twice is reported once, at its newest position.
    pub async fn updates(&mut self) -> Option<Vec<Arc<TrackerRecord>>> {
        loop {
            let snapshot = self.changed().await?;
            let batch = self.take_unreported(&snapshot);
            if !batch.is_empty() {
                return Some(batch);
            }
        }
    }

    fn take_unreported(&mut self, snapshot: &[Arc<TrackerRecord>]) -> Vec<Arc<TrackerRecord>> {
        let batch: Vec<Arc<TrackerRecord>> = snapshot
            .iter()
            .filter(|r| self.reported.get(&r.id) != Some(&r.last_seen_at))
            .cloned()
            .collect();
        for record in &batch {
            self.reported.insert(record.id, record.last_seen_at);
        }
        batch
    }

    /// Snapshot stream: the current snapshot first, then one per change.
    pub fn into_stream(self) -> impl Stream<Item = TrackerSnapshot> + Send + Unpin {
        WatchStream::new(self.receiver)
    }
}
