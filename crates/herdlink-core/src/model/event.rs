// ── Link lifecycle events ──

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::address::PeripheralAddress;
use super::peripheral::DiscoveredPeripheral;
use super::tracker::TrackerId;

/// Everything the link manager tells the outside world.
///
/// Immutable and one-shot. `ScanResults` is the only variant the event bus
/// replays to late subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LinkEvent {
    ScanStarted,
    ScanResults {
        peripherals: Arc<Vec<DiscoveredPeripheral>>,
    },
    ScanFailed {
        reason: String,
        code: Option<i32>,
    },
    ScanStopped,
    Connecting {
        name: String,
    },
    Connected {
        name: String,
        address: PeripheralAddress,
    },
    ConnectFailed {
        name: String,
        reason: String,
        code: Option<i32>,
    },
    Disconnected {
        name: String,
    },
    NewTracker {
        id: TrackerId,
        name: String,
    },
}

impl LinkEvent {
    /// `Disconnected` or `ConnectFailed`: the end of a session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected { .. } | Self::ConnectFailed { .. })
    }
}

impl fmt::Display for LinkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScanStarted => write!(f, "scan started"),
            Self::ScanResults { peripherals } => {
                write!(f, "scan results: {} peripheral(s)", peripherals.len())
            }
            Self::ScanFailed { reason, code } => match code {
                Some(code) => write!(f, "scan failed: {reason} ({code})"),
                None => write!(f, "scan failed: {reason}"),
            },
            Self::ScanStopped => write!(f, "scan stopped"),
            Self::Connecting { name } => write!(f, "connecting to {name}"),
            Self::Connected { name, address } => write!(f, "connected to {name} [{address}]"),
            Self::ConnectFailed { name, reason, .. } => {
                write!(f, "connection to {name} failed: {reason}")
            }
            Self::Disconnected { name } => write!(f, "disconnected from {name}"),
            Self::NewTracker { id, name } => write!(f, "new tracker {id} ({name})"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn display_strings() {
        let address: PeripheralAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        insta::assert_snapshot!(
            LinkEvent::Connected { name: "Tag-1".into(), address }.to_string(),
            @"connected to Tag-1 [AA:BB:CC:DD:EE:FF]"
        );
        insta::assert_snapshot!(
            LinkEvent::ConnectFailed {
                name: "Tag-1".into(),
                reason: "timed out".into(),
                code: None,
            }
            .to_string(),
            @"connection to Tag-1 failed: timed out"
        );
        insta::assert_snapshot!(
            LinkEvent::ScanFailed { reason: "link error".into(), code: Some(2) }.to_string(),
            @"scan failed: link error (2)"
        );
    }

    #[test]
    fn serializes_with_event_tag() {
        let json = serde_json::to_value(LinkEvent::Disconnected {
            name: "Tag-1".into(),
        })
        .unwrap();
        assert_eq!(json["event"], "disconnected");
        assert_eq!(json["name"], "Tag-1");
    }

    #[test]
    fn terminal_events() {
        assert!(LinkEvent::Disconnected { name: "x".into() }.is_terminal());
        assert!(!LinkEvent::ScanStopped.is_terminal());
    }
}
