// ── Peripheral directory ──
//
// Address-keyed, insertion-ordered set of peripherals seen in the current
// scan session. A known name is never overwritten by an absent one.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::model::{DiscoveredPeripheral, PeripheralAddress};

/// What an upsert did to the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryChange {
    Inserted,
    NameResolved,
    Unchanged,
}

#[derive(Debug, Default)]
pub struct PeripheralDirectory {
    entries: IndexMap<PeripheralAddress, DiscoveredPeripheral>,
}

impl PeripheralDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sighting. Blank names count as unresolved.
    pub fn upsert(
        &mut self,
        address: PeripheralAddress,
        name: Option<String>,
        scan_id: u64,
    ) -> DirectoryChange {
        let name = name.filter(|n| !n.trim().is_empty());

        if let Some(existing) = self.entries.get_mut(&address) {
            return match (&existing.resolved_name, name) {
                (None, Some(name)) => {
                    existing.resolved_name = Some(name);
                    DirectoryChange::NameResolved
                }
                _ => DirectoryChange::Unchanged,
            };
        }

        self.entries.insert(
            address,
            DiscoveredPeripheral {
                address,
                resolved_name: name,
                first_seen_scan_id: scan_id,
            },
        );
        DirectoryChange::Inserted
    }

    pub fn get(&self, address: &PeripheralAddress) -> Option<&DiscoveredPeripheral> {
        self.entries.get(address)
    }

    pub fn name_of(&self, address: &PeripheralAddress) -> Option<&str> {
        self.entries.get(address)?.resolved_name.as_deref()
    }

    /// Snapshot for callers. Anonymous peripherals stay in the directory
    /// but are only surfaced when `include_anonymous` is set.
    pub fn snapshot(&self, include_anonymous: bool) -> Arc<Vec<DiscoveredPeripheral>> {
        Arc::new(
            self.entries
                .values()
                .filter(|p| include_anonymous || !p.is_anonymous())
                .cloned()
                .collect(),
        )
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
