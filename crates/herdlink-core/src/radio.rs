// ── Radio hardware seam ──
//
// Every request is fire-and-forget: the backend acknowledges or rejects
// it immediately, and the outcome arrives later as a `RadioEvent` on the
// single serialized stream the link manager consumes.

use std::fmt;

use bytes::Bytes;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::RadioError;
use crate::model::PeripheralAddress;

/// GATT status reported for a successful operation.
pub const GATT_SUCCESS: i32 = 0;

pub type RadioEventSender = mpsc::UnboundedSender<RadioEvent>;
pub type RadioEventReceiver = mpsc::UnboundedReceiver<RadioEvent>;

/// Create the channel a backend publishes hardware callbacks on.
pub fn event_channel() -> (RadioEventSender, RadioEventReceiver) {
    mpsc::unbounded_channel()
}

// ── Handles ──────────────────────────────────────────────────────────

/// Identity of one opened connection. Events carry it so callbacks from a
/// released handle can be told apart from the live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u64);

impl HandleId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Exclusive ownership of an opened connection.
///
/// Not `Clone`: [`Radio::close`] consumes it, so a handle is released at
/// most once.
#[derive(Debug, PartialEq, Eq)]
pub struct RadioHandle {
    id: HandleId,
    address: PeripheralAddress,
}

impl RadioHandle {
    pub const fn new(id: HandleId, address: PeripheralAddress) -> Self {
        Self { id, address }
    }

    pub const fn id(&self) -> HandleId {
        self.id
    }

    pub const fn address(&self) -> &PeripheralAddress {
        &self.address
    }
}

// ── Capabilities ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristic {
    pub uuid: Uuid,
    pub descriptors: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<GattCharacteristic>,
}

impl GattService {
    pub fn characteristic(&self, uuid: Uuid) -> Option<&GattCharacteristic> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }
}

// ── Events ───────────────────────────────────────────────────────────

/// One hardware callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    Discovered {
        address: PeripheralAddress,
        name: Option<String>,
    },
    ScanFailed {
        code: i32,
    },
    Connected {
        handle: HandleId,
    },
    Disconnected {
        handle: HandleId,
    },
    ServicesDiscovered {
        handle: HandleId,
        services: Vec<GattService>,
    },
    ServiceDiscoveryFailed {
        handle: HandleId,
        code: i32,
    },
    DescriptorWritten {
        handle: HandleId,
        characteristic: Uuid,
        descriptor: Uuid,
        status: i32,
    },
    Notification {
        handle: HandleId,
        characteristic: Uuid,
        value: Bytes,
    },
    Error {
        handle: HandleId,
        code: i32,
    },
}

impl RadioEvent {
    /// Connection the event belongs to; `None` for discovery callbacks.
    pub fn handle(&self) -> Option<HandleId> {
        match self {
            Self::Discovered { .. } | Self::ScanFailed { .. } => None,
            Self::Connected { handle }
            | Self::Disconnected { handle }
            | Self::ServicesDiscovered { handle, .. }
            | Self::ServiceDiscoveryFailed { handle, .. }
            | Self::DescriptorWritten { handle, .. }
            | Self::Notification { handle, .. }
            | Self::Error { handle, .. } => Some(*handle),
        }
    }
}

// ── Radio ────────────────────────────────────────────────────────────

/// A single short-range radio.
///
/// Implementations must not block: each request is queued and its outcome
/// reported through the [`RadioEventSender`] the backend was built with.
pub trait Radio: Send + Sync + 'static {
    /// Whether the radio is present and powered on.
    fn is_enabled(&self) -> bool;

    /// Begin discovery filtered to peripherals advertising `service`.
    fn start_discovery(&self, service: Uuid) -> Result<(), RadioError>;

    fn stop_discovery(&self);

    /// Request a connection. `auto_connect` asks the stack to re-establish
    /// the link by itself after a drop, where supported.
    ///
    /// Returns [`RadioError::UnknownPeripheral`] when the address does not
    /// identify a peripheral this radio can reach.
    fn open(
        &self,
        address: &PeripheralAddress,
        auto_connect: bool,
    ) -> Result<RadioHandle, RadioError>;

    fn discover_services(&self, handle: &RadioHandle) -> Result<(), RadioError>;

    /// Enable local delivery of notifications for `characteristic`.
    fn enable_notifications(
        &self,
        handle: &RadioHandle,
        characteristic: Uuid,
    ) -> Result<(), RadioError>;

    fn write_descriptor(
        &self,
        handle: &RadioHandle,
        characteristic: Uuid,
        descriptor: Uuid,
        value: &[u8],
    ) -> Result<(), RadioError>;

    /// Formal disconnect handshake. The handle stays owned by the caller.
    fn disconnect(&self, handle: &RadioHandle) -> Result<(), RadioError>;

    /// Release the connection and every resource behind it.
    fn close(&self, handle: RadioHandle);
}
