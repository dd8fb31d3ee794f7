// ── Link preference store ──
//
// The last peripheral that reached steady state, kept in durable
// key-value storage so the link can be resumed after a restart. The link
// manager is the only writer; its writes go through `PreferenceWriter`,
// which keeps an in-memory mirror and persists on a background task.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::model::{LinkPreference, PeripheralAddress};

const ADDRESS_KEY: &str = "link.address";
const NAME_KEY: &str = "link.name";

/// Durable string key-value storage.
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Non-durable storage for tests and one-shot commands.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: DashMap<String, String>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Typed view over the two preference keys.
#[derive(Clone)]
pub struct LinkPreferenceStore {
    storage: Arc<dyn KeyValueStore>,
}

impl LinkPreferenceStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    /// In-memory store, mainly for tests.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKeyValueStore::new()))
    }

    pub fn load(&self) -> Option<LinkPreference> {
        let address = self.storage.get(ADDRESS_KEY)?;
        Some(LinkPreference {
            address,
            display_name: self.storage.get(NAME_KEY),
        })
    }

    /// Overwrite the address. The name is only overwritten when given.
    pub fn save(&self, address: &PeripheralAddress, name: Option<&str>) -> Result<(), StorageError> {
        self.storage.set(ADDRESS_KEY, &address.to_string())?;
        if let Some(name) = name {
            self.storage.set(NAME_KEY, name)?;
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove(ADDRESS_KEY)?;
        self.storage.remove(NAME_KEY)
    }
}

// ── Background writer ────────────────────────────────────────────────

#[derive(Debug)]
enum PreferenceOp {
    Save {
        address: PeripheralAddress,
        name: Option<String>,
    },
    Clear,
}

/// Write-through mirror of the stored preference.
///
/// Reads are served from memory; writes update the mirror immediately and
/// are persisted in order on a background task.
pub(crate) struct PreferenceWriter {
    current: Option<LinkPreference>,
    tx: mpsc::UnboundedSender<PreferenceOp>,
    task: JoinHandle<()>,
}

impl PreferenceWriter {
    pub(crate) fn spawn(store: LinkPreferenceStore) -> Self {
        let current = store.load();
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_writer(store, rx));
        Self { current, tx, task }
    }

    pub(crate) fn current(&self) -> Option<&LinkPreference> {
        self.current.as_ref()
    }

    pub(crate) fn save(&mut self, address: PeripheralAddress, name: Option<String>) {
        let display_name = match (&name, self.current.take()) {
            (Some(name), _) => Some(name.clone()),
            (None, Some(previous)) => previous.display_name,
            (None, None) => None,
        };
        self.current = Some(LinkPreference {
            address: address.to_string(),
            display_name,
        });
        self.send(PreferenceOp::Save { address, name });
    }

    pub(crate) fn clear(&mut self) {
        self.current = None;
        self.send(PreferenceOp::Clear);
    }

    fn send(&self, op: PreferenceOp) {
        if self.tx.send(op).is_err() {
            warn!("preference writer stopped, change not persisted");
        }
    }

    /// Flush pending writes and stop the background task.
    pub(crate) async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            warn!(error = %e, "preference writer panicked");
        }
    }
}

async fn run_writer(store: LinkPreferenceStore, mut rx: mpsc::UnboundedReceiver<PreferenceOp>) {
    while let Some(op) = rx.recv().await {
        let store = store.clone();
        let result = tokio::task::spawn_blocking(move || match op {
            PreferenceOp::Save { address, name } => {
                debug!(%address, "saving link preference");
                store.save(&address, name.as_deref())
            }
            PreferenceOp::Clear => {
                debug!("clearing link preference");
                store.clear()
            }
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "link preference write failed"),
            Err(e) => warn!(error = %e, "link preference write aborted"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn addr() -> PeripheralAddress {
        "AA:BB:CC:DD:EE:FF".parse().unwrap()
    }

    #[test]
    fn save_and_load() {
        let store = LinkPreferenceStore::in_memory();
        assert!(store.load().is_none());

        store.save(&addr(), Some("Tag-1")).unwrap();
        assert_eq!(
            store.load().unwrap(),
            LinkPreference {
                address: "AA:BB:CC:DD:EE:FF".into(),
                display_name: Some("Tag-1".into()),
            }
        );
    }

    #[test]
    fn save_without_name_keeps_previous_name() {
        let store = LinkPreferenceStore::in_memory();
        store.save(&addr(), Some("Tag-1")).unwrap();

        let other: PeripheralAddress = "11:22:33:44:55:66".parse().unwrap();
        store.save(&other, None).unwrap();

        let pref = store.load().unwrap();
        assert_eq!(pref.address, "11:22:33:44:55:66");
        assert_eq!(pref.display_name.as_deref(), Some("Tag-1"));
    }

    #[test]
    fn clear_removes_both_keys() {
        let storage = Arc::new(MemoryKeyValueStore::new());
        let store = LinkPreferenceStore::new(storage.clone());
        store.save(&addr(), Some("Tag-1")).unwrap();
        store.clear().unwrap();

        assert!(store.load().is_none());
        assert!(storage.get(NAME_KEY).is_none());
    }

    #[tokio::test]
    async fn writer_mirrors_and_persists_in_order() {
        let store = LinkPreferenceStore::in_memory();
        let mut writer = PreferenceWriter::spawn(store.clone());
        assert!(writer.current().is_none());

        writer.save(addr(), Some("Tag-1".into()));
        writer.save(addr(), None);
        assert_eq!(
            writer.current().unwrap().display_name.as_deref(),
            Some("Tag-1")
        );

        writer.clear();
        writer.save(addr(), Some("Tag-2".into()));
        writer.shutdown().await;

        assert_eq!(store.load().unwrap().display_name.as_deref(), Some("Tag-2"));
    }
}
