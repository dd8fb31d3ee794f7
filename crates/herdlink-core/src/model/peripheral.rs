// ── Discovered peripheral ──

use serde::Serialize;

use super::address::PeripheralAddress;

/// A peripheral seen during a scan session.
///
/// `resolved_name` may arrive after the first sighting; once known it is
/// never replaced by an absent name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredPeripheral {
    pub address: PeripheralAddress,
    pub resolved_name: Option<String>,
    pub first_seen_scan_id: u64,
}

impl DiscoveredPeripheral {
    /// Resolved name, falling back to the address.
    pub fn display_name(&self) -> String {
        self.resolved_name
            .clone()
            .unwrap_or_else(|| self.address.to_string())
    }

    pub fn is_anonymous(&self) -> bool {
        self.resolved_name.is_none()
    }
}
