// ── Upsert pipeline ──
//
// Valid frames are applied to the tracker store off the event loop.
// Frames are sharded by tracker id over a fixed set of workers, so every
// frame for one id is applied in arrival order while different ids
// proceed concurrently.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::EventBus;
use crate::frame::TelemetryFrame;
use crate::model::{LinkEvent, TrackerRecord};
use crate::store::TrackerStore;

/// What applying one frame did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Apply one frame: insert a fresh record or move an existing one.
///
/// Re-applying the same frame with the same `now` yields the same record.
pub fn apply_frame(
    store: &dyn TrackerStore,
    frame: &TelemetryFrame,
    now: DateTime<Utc>,
) -> (UpsertOutcome, TrackerRecord) {
    match store.get_by_id(frame.id) {
        Some(mut record) => {
            record.apply_fix(frame.latitude, frame.longitude, now);
            store.upsert(record.clone());
            (UpsertOutcome::Updated, record)
        }
        None => {
            let record =
                TrackerRecord::first_sighting(frame.id, frame.latitude, frame.longitude, now);
            store.upsert(record.clone());
            (UpsertOutcome::Created, record)
        }
    }
}

struct Job {
    frame: TelemetryFrame,
    received_at: DateTime<Utc>,
}

/// Sharded worker pool applying frames to the store.
pub struct UpsertPipeline {
    shards: Vec<mpsc::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl UpsertPipeline {
    /// Spawn `workers` shards, each with a queue of `queue` frames.
    pub fn spawn(
        workers: usize,
        queue: usize,
        store: Arc<dyn TrackerStore>,
        bus: EventBus,
    ) -> Self {
        let count = workers.max(1);
        let mut shards = Vec::with_capacity(count);
        let mut handles = Vec::with_capacity(count);

        for shard in 0..count {
            let (tx, rx) = mpsc::channel(queue.max(1));
            shards.push(tx);
            handles.push(tokio::spawn(run_worker(
                shard,
                rx,
                Arc::clone(&store),
                bus.clone(),
            )));
        }

        debug!(workers = count, queue, "upsert pipeline started");
        Self {
            shards,
            workers: handles,
        }
    }

    /// Queue a frame without waiting. A full shard drops the frame.
    pub fn submit(&self, frame: TelemetryFrame, received_at: DateTime<Utc>) {
        let index = usize::try_from(frame.id.get().unsigned_abs()).unwrap_or_default()
            % self.shards.len();
        let job = Job { frame, received_at };

        if let Err(e) = self.shards[index].try_send(job) {
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "worker stopped",
            };
            warn!(tracker_id = %frame.id, shard = index, reason, "dropping frame");
        }
    }

    /// Stop accepting frames and wait for every queued frame to land.
    pub async fn shutdown(self) {
        drop(self.shards);
        for handle in self.workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "upsert worker panicked");
            }
        }
        debug!("upsert pipeline drained");
    }
}

async fn run_worker(
    shard: usize,
    mut rx: mpsc::Receiver<Job>,
    store: Arc<dyn TrackerStore>,
    bus: EventBus,
) {
    while let Some(job) = rx.recv().await {
        let (outcome, record) = apply_frame(store.as_ref(), &job.frame, job.received_at);
        match outcome {
            UpsertOutcome::Created => {
                info!(tracker_id = %record.id, shard, "new tracker");
                bus.publish(LinkEvent::NewTracker {
                    id: record.id,
                    name: record.name,
                });
            }
            UpsertOutcome::Updated => {
                debug!(tracker_id = %record.id, shard, "tracker updated");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::TrackerId;
    use crate::store::MemoryTrackerStore;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn frame(id: i32, latitude: f64, longitude: f64) -> TelemetryFrame {
        TelemetryFrame {
            id: TrackerId::new(id),
            latitude,
            longitude,
        }
    }

    #[test]
    fn first_frame_creates_record() {
        let store = MemoryTrackerStore::new();
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap();

        let (outcome, record) = apply_frame(&store, &frame(7, 24.10, -110.30), now);

        assert_eq!(outcome, UpsertOutcome::Created);
        assert_eq!(record.name, "Device 7");
        assert_eq!(store.get_by_id(TrackerId::new(7)).unwrap(), record);
    }

    #[test]
    fn later_frame_moves_record_and_keeps_identity() {
        let store = MemoryTrackerStore::new();
        let t0 = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2026, 5, 1, 8, 1, 0).unwrap();
        apply_frame(&store, &frame(7, 1.0, 2.0), t0);

        let mut renamed = store.get_by_id(TrackerId::new(7)).unwrap();
        renamed.name = "Bessie".into();
        renamed.description = "North paddock".into();
        store.upsert(renamed);

        let (outcome, record) = apply_frame(&store, &frame(7, 3.0, 4.0), t1);
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(record.name, "Bessie");
        assert_eq!(record.description, "North paddock");
        assert_eq!(record.first_seen_at, t0);
        assert_eq!(record.last_seen_at, t1);
        assert!((record.latitude - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reapplying_a_frame_is_idempotent() {
        let store = MemoryTrackerStore::new();
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap();
        let f = frame(7, 24.10, -110.30);

        apply_frame(&store, &f, now);
        let once = store.get_by_id(TrackerId::new(7)).unwrap();
        apply_frame(&store, &f, now);
        let twice = store.get_by_id(TrackerId::new(7)).unwrap();

        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn workers_emit_new_tracker_once_per_id() {
        let store = Arc::new(MemoryTrackerStore::new());
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let pipeline = UpsertPipeline::spawn(2, 8, store.clone(), bus.clone());

        let now = Utc::now();
        pipeline.submit(frame(1, 1.0, 1.0), now);
        pipeline.submit(frame(1, 2.0, 2.0), now);
        pipeline.submit(frame(2, 3.0, 3.0), now);
        pipeline.shutdown().await;

        let mut created = Vec::new();
        while let Some(event) = events.try_recv() {
            if let LinkEvent::NewTracker { id, .. } = event {
                created.push(id.get());
            }
        }
        created.sort_unstable();
        assert_eq!(created, [1, 2]);

        let record = store.get_by_id(TrackerId::new(1)).unwrap();
        assert!((record.latitude - 2.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let store = Arc::new(MemoryTrackerStore::new());
        let pipeline = UpsertPipeline::spawn(1, 1, store.clone(), EventBus::new());

        // The single-threaded test runtime cannot run the worker until we
        // yield, so only the first frame fits.
        let now = Utc::now();
        for id in 0..4 {
            pipeline.submit(frame(id, 0.0, 0.0), now);
        }
        pipeline.shutdown().await;

        assert_eq!(store.len(), 1);
    }
}
