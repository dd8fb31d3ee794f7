// ── Tracker store ──
//
// The store is an external collaborator: the link manager only needs
// lookup, upsert and a live view of every record. `MemoryTrackerStore`
// is the in-process implementation used by the CLI and the tests.

mod memory;
mod stream;

pub use memory::MemoryTrackerStore;
pub use stream::{TrackerSnapshot, TrackerStream};

use crate::model::{TrackerId, TrackerRecord};

/// Persistence boundary for tracker records.
///
/// `upsert` must be atomic per id: a concurrent reader sees either the old
/// or the new record, never a mix.
pub trait TrackerStore: Send + Sync + 'static {
    fn get_by_id(&self, id: TrackerId) -> Option<TrackerRecord>;

    fn upsert(&self, record: TrackerRecord);

    /// Live view of every record.
    fn all(&self) -> TrackerStream;
}
