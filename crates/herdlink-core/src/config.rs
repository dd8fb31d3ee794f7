// ── Runtime link configuration ──
//
// These types describe *how* the link manager behaves: GATT identifiers,
// scan window, timeouts, worker pool sizing. They never touch disk; the
// config crate builds a `LinkConfig` and hands it in.

use std::time::Duration;

use uuid::Uuid;

/// Telemetry service advertised by the tags.
pub const TELEMETRY_SERVICE: Uuid = Uuid::from_u128(0x0000_ffe0_0000_1000_8000_0080_5f9b_34fb);

/// Notifying characteristic carrying `id,lat,lon` frames.
pub const TELEMETRY_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x0000_ffe1_0000_1000_8000_0080_5f9b_34fb);

/// Client characteristic configuration descriptor.
pub const CLIENT_CONFIG_DESCRIPTOR: Uuid =
    Uuid::from_u128(0x0000_2902_0000_1000_8000_0080_5f9b_34fb);

/// CCCD value that turns notifications on.
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

/// Identifiers the session negotiates against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattProfile {
    pub service: Uuid,
    pub characteristic: Uuid,
    pub config_descriptor: Uuid,
    pub enable_value: Vec<u8>,
}

impl Default for GattProfile {
    fn default() -> Self {
        Self {
            service: TELEMETRY_SERVICE,
            characteristic: TELEMETRY_CHARACTERISTIC,
            config_descriptor: CLIENT_CONFIG_DESCRIPTOR,
            enable_value: ENABLE_NOTIFICATION_VALUE.to_vec(),
        }
    }
}

/// Exponential backoff for auto-reconnecting sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

/// Configuration for one [`LinkManager`](crate::LinkManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// How long a scan runs before stopping on its own.
    pub scan_window: Duration,
    /// Bound on reaching `Connected` once a connect attempt starts.
    pub connect_timeout: Duration,
    pub gatt: GattProfile,
    /// Surface peripherals that never advertised a name.
    pub include_anonymous: bool,
    /// Number of upsert worker shards.
    pub upsert_workers: usize,
    /// Queue depth per upsert shard.
    pub upsert_queue: usize,
    pub reconnect: ReconnectConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            scan_window: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(30),
            gatt: GattProfile::default(),
            include_anonymous: false,
            upsert_workers: 4,
            upsert_queue: 64,
            reconnect: ReconnectConfig::default(),
        }
    }
}
