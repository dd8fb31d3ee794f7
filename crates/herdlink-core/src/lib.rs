//! Telemetry link manager for BLE animal-tracking tags.
//!
//! This crate owns the radio-facing business logic of the herdlink
//! workspace. It never touches disk or hardware directly: the radio, the
//! authorization gate, the tracker store and durable preference storage
//! are all injected through narrow traits.
//!
//! - **[`LinkManager`]**: Single event loop serializing every hardware
//!   callback, command and timer. Drives discovery, the
//!   connect → discover → subscribe → steady-state session, teardown, and
//!   automatic reconnection of the last linked peripheral.
//!
//! - **[`EventBus`]**: Process-wide broadcast of typed [`LinkEvent`]s.
//!   Transient events reach current subscribers only; the latest directory
//!   snapshot is replayed to late subscribers.
//!
//! - **Frame pipeline** ([`frame`], [`pipeline`]): Decodes `id,lat,lon`
//!   notification payloads and upserts [`TrackerRecord`]s on a sharded
//!   worker pool that keeps per-tracker ordering.
//!
//! - **Seams** ([`radio`], [`host`], [`store`], [`preference`]): The
//!   [`Radio`] trait and its [`RadioEvent`] stream, authorization and
//!   keep-alive hooks, the [`TrackerStore`] collaborator, and the
//!   key-value storage behind [`LinkPreferenceStore`].

pub mod bus;
pub mod command;
pub mod config;
pub mod directory;
pub mod error;
pub mod frame;
pub mod host;
pub mod link;
pub mod manager;
pub mod model;
pub mod pipeline;
pub mod preference;
pub mod radio;
pub mod scanner;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bus::{EventBus, Subscription};
pub use command::{Command, CommandParseError, CommandResult, LinkStatus};
pub use config::{GattProfile, LinkConfig, ReconnectConfig};
pub use directory::PeripheralDirectory;
pub use error::{FrameError, LinkError, RadioError, StorageError};
pub use frame::{TelemetryFrame, parse_frame};
pub use host::{AllowAll, AuthorizationGate, KeepAlive, NoKeepAlive};
pub use link::{ConnectMode, LinkState};
pub use manager::{LinkDeps, LinkManager};
pub use preference::{KeyValueStore, LinkPreferenceStore, MemoryKeyValueStore};
pub use radio::{
    GattCharacteristic, GattService, HandleId, Radio, RadioEvent, RadioEventReceiver,
    RadioEventSender, RadioHandle,
};
pub use store::{MemoryTrackerStore, TrackerStore, TrackerStream};

pub use model::{
    AddressParseError, AnimalType, DiscoveredPeripheral, LinkEvent, LinkPreference,
    PeripheralAddress, TrackerId, TrackerRecord,
};
