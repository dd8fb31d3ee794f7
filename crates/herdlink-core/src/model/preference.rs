// ── Persisted link preference ──

use serde::{Deserialize, Serialize};

/// The last peripheral that reached steady state.
///
/// `address` is kept as the raw stored text: a value that no longer parses
/// as a [`PeripheralAddress`](super::PeripheralAddress) is detected at
/// resume time and cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPreference {
    pub address: String,
    pub display_name: Option<String>,
}

impl LinkPreference {
    pub fn display_name_or_address(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.address)
    }
}
