// ── Domain model ──
//
// Canonical types shared by the link manager, the frame pipeline and
// every consumer of the event bus.

pub mod address;
pub mod event;
pub mod peripheral;
pub mod preference;
pub mod tracker;

// ── Re-exports ──────────────────────────────────────────────────────

pub use address::{AddressParseError, PeripheralAddress};
pub use event::LinkEvent;
pub use peripheral::DiscoveredPeripheral;
pub use preference::LinkPreference;
pub use tracker::{AnimalType, TrackerId, TrackerRecord};
