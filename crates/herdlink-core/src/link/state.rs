use serde::Serialize;
use strum::Display;

/// Where the single link session stands.
///
/// `Idle → Connecting → ServiceDiscovery → SubscribingNotifications →
/// Connected → Disconnected | Failed`. A session only returns to
/// `Connecting` through an automatic reconnect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LinkState {
    #[default]
    Idle,
    Connecting,
    ServiceDiscovery,
    SubscribingNotifications,
    Connected,
    Disconnected,
    Failed,
}

impl LinkState {
    /// A session exists and owns a radio handle.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            Self::Connecting
                | Self::ServiceDiscovery
                | Self::SubscribingNotifications
                | Self::Connected
        )
    }

    /// Still negotiating; bounded by the connect timeout.
    pub fn is_negotiating(self) -> bool {
        self.is_live() && self != Self::Connected
    }
}

/// How a session was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectMode {
    /// Explicit user request: failures are reported and left alone.
    Manual,
    /// Resumed from the stored preference: transient drops are retried.
    Auto,
}
