// ── In-memory tracker store ──
//
// `DashMap` for per-id atomic upserts and a `watch` channel carrying the
// full snapshot, rebuilt on every mutation.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

use super::stream::{TrackerSnapshot, TrackerStream};
use super::TrackerStore;
use crate::model::{TrackerId, TrackerRecord};

pub struct MemoryTrackerStore {
    by_id: DashMap<TrackerId, Arc<TrackerRecord>>,
    snapshot: watch::Sender<TrackerSnapshot>,
}

impl Default for MemoryTrackerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTrackerStore {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_id: DashMap::new(),
            snapshot,
        }
    }

    /// Current snapshot, ordered by id.
    pub fn snapshot(&self) -> TrackerSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Several upsert workers write concurrently. The map is read while
    /// the watch lock is held, so the last rebuild to publish has seen
    /// every insert that finished before it.
    fn rebuild_snapshot(&self) {
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| {
            let mut values: Vec<Arc<TrackerRecord>> =
                self.by_id.iter().map(|r| Arc::clone(r.value())).collect();
            values.sort_by_key(|r| r.id);
            *snap = Arc::new(values);
        });
    }
}

impl TrackerStore for MemoryTrackerStore {
    fn get_by_id(&self, id: TrackerId) -> Option<TrackerRecord> {
        self.by_id.get(&id).map(|r| TrackerRecord::clone(r.value()))
    }

    fn upsert(&self, record: TrackerRecord) {
        self.by_id.insert(record.id, Arc::new(record));
        self.rebuild_snapshot();
    }

    fn all(&self) -> TrackerStream {
        TrackerStream::new(self.snapshot.subscribe())
    }
}
