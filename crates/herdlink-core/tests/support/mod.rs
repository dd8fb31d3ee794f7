// Shared fixtures: a scripted radio, a switchable host and a harness
// wiring them into a running `LinkManager`.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;

use herdlink_core::config::{CLIENT_CONFIG_DESCRIPTOR, TELEMETRY_CHARACTERISTIC, TELEMETRY_SERVICE};
use herdlink_core::radio::{GATT_SUCCESS, event_channel};
use herdlink_core::{
    AuthorizationGate, GattCharacteristic, GattService, HandleId, KeepAlive, LinkConfig, LinkDeps,
    LinkEvent, LinkManager, LinkPreferenceStore, LinkStatus, MemoryTrackerStore,
    PeripheralAddress, Radio, RadioError, RadioEvent, RadioEventSender, RadioHandle, Subscription,
};

// ── Fake radio ──────────────────────────────────────────────────────

/// Every request the manager made, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    StartDiscovery(Uuid),
    StopDiscovery,
    Open {
        address: PeripheralAddress,
        auto_connect: bool,
        handle: Option<HandleId>,
    },
    DiscoverServices(HandleId),
    EnableNotifications(HandleId, Uuid),
    WriteDescriptor {
        handle: HandleId,
        descriptor: Uuid,
        value: Vec<u8>,
    },
    Disconnect(HandleId),
    Close(HandleId),
}

pub struct FakeRadio {
    enabled: AtomicBool,
    next_handle: AtomicU64,
    reject_open: Mutex<Option<RadioError>>,
    unknown: Mutex<HashSet<PeripheralAddress>>,
    calls: Mutex<Vec<RadioCall>>,
}

impl Default for FakeRadio {
    fn default() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            next_handle: AtomicU64::new(1),
            reject_open: Mutex::new(None),
            unknown: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeRadio {
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Make `open` fail with `err` until cleared.
    pub fn reject_open(&self, err: Option<RadioError>) {
        *self.reject_open.lock().unwrap() = err;
    }

    /// Make `address` unreachable.
    pub fn forget_peripheral(&self, address: PeripheralAddress) {
        self.unknown.lock().unwrap().insert(address);
    }

    pub fn calls(&self) -> Vec<RadioCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn opens(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RadioCall::Open { .. }))
            .count()
    }

    pub fn close_count(&self, handle: HandleId) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == RadioCall::Close(handle))
            .count()
    }

    pub fn disconnect_count(&self, handle: HandleId) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == RadioCall::Disconnect(handle))
            .count()
    }

    /// Handle returned by the most recent successful `open`.
    pub fn last_handle(&self) -> HandleId {
        self.calls()
            .iter()
            .rev()
            .find_map(|c| match c {
                RadioCall::Open {
                    handle: Some(handle),
                    ..
                } => Some(*handle),
                _ => None,
            })
            .unwrap()
    }

    fn record(&self, call: RadioCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Radio for FakeRadio {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn start_discovery(&self, service: Uuid) -> Result<(), RadioError> {
        self.record(RadioCall::StartDiscovery(service));
        Ok(())
    }

    fn stop_discovery(&self) {
        self.record(RadioCall::StopDiscovery);
    }

    fn open(
        &self,
        address: &PeripheralAddress,
        auto_connect: bool,
    ) -> Result<RadioHandle, RadioError> {
        let result = if self.unknown.lock().unwrap().contains(address) {
            Err(RadioError::UnknownPeripheral(address.to_string()))
        } else if let Some(err) = self.reject_open.lock().unwrap().clone() {
            Err(err)
        } else {
            let id = HandleId::new(self.next_handle.fetch_add(1, Ordering::SeqCst));
            Ok(RadioHandle::new(id, *address))
        };
        self.record(RadioCall::Open {
            address: *address,
            auto_connect,
            handle: result.as_ref().ok().map(RadioHandle::id),
        });
        result
    }

    fn discover_services(&self, handle: &RadioHandle) -> Result<(), RadioError> {
        self.record(RadioCall::DiscoverServices(handle.id()));
        Ok(())
    }

    fn enable_notifications(
        &self,
        handle: &RadioHandle,
        characteristic: Uuid,
    ) -> Result<(), RadioError> {
        self.record(RadioCall::EnableNotifications(handle.id(), characteristic));
        Ok(())
    }

    fn write_descriptor(
        &self,
        handle: &RadioHandle,
        _characteristic: Uuid,
        descriptor: Uuid,
        value: &[u8],
    ) -> Result<(), RadioError> {
        self.record(RadioCall::WriteDescriptor {
            handle: handle.id(),
            descriptor,
            value: value.to_vec(),
        });
        Ok(())
    }

    fn disconnect(&self, handle: &RadioHandle) -> Result<(), RadioError> {
        self.record(RadioCall::Disconnect(handle.id()));
        Ok(())
    }

    fn close(&self, handle: RadioHandle) {
        self.record(RadioCall::Close(handle.id()));
    }
}

// ── Fake host ───────────────────────────────────────────────────────

pub struct FakeHost {
    scan_allowed: AtomicBool,
    connect_allowed: AtomicBool,
    pub promoted: AtomicUsize,
    pub demoted: AtomicUsize,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self {
            scan_allowed: AtomicBool::new(true),
            connect_allowed: AtomicBool::new(true),
            promoted: AtomicUsize::new(0),
            demoted: AtomicUsize::new(0),
        }
    }
}

impl FakeHost {
    pub fn allow_scan(&self, allowed: bool) {
        self.scan_allowed.store(allowed, Ordering::SeqCst);
    }

    pub fn allow_connect(&self, allowed: bool) {
        self.connect_allowed.store(allowed, Ordering::SeqCst);
    }

    pub fn promotions(&self) -> usize {
        self.promoted.load(Ordering::SeqCst)
    }

    pub fn demotions(&self) -> usize {
        self.demoted.load(Ordering::SeqCst)
    }
}

impl AuthorizationGate for FakeHost {
    fn has_scan_authorization(&self) -> bool {
        self.scan_allowed.load(Ordering::SeqCst)
    }

    fn has_connect_authorization(&self) -> bool {
        self.connect_allowed.load(Ordering::SeqCst)
    }
}

impl KeepAlive for FakeHost {
    fn promote(&self, _peripheral_name: &str) {
        self.promoted.fetch_add(1, Ordering::SeqCst);
    }

    fn demote(&self) {
        self.demoted.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Harness ─────────────────────────────────────────────────────────

pub struct Harness {
    pub manager: LinkManager,
    pub radio: Arc<FakeRadio>,
    pub host: Arc<FakeHost>,
    pub trackers: Arc<MemoryTrackerStore>,
    pub preferences: LinkPreferenceStore,
    pub events: Subscription,
    radio_tx: RadioEventSender,
}

impl Harness {
    pub fn start() -> Self {
        Self::with(LinkConfig::default(), LinkPreferenceStore::in_memory())
    }

    pub fn with_config(config: LinkConfig) -> Self {
        Self::with(config, LinkPreferenceStore::in_memory())
    }

    pub fn with(config: LinkConfig, preferences: LinkPreferenceStore) -> Self {
        let radio = Arc::new(FakeRadio::default());
        let host = Arc::new(FakeHost::default());
        let trackers = Arc::new(MemoryTrackerStore::new());
        let (radio_tx, radio_rx) = event_channel();

        let deps = LinkDeps::new(radio.clone())
            .with_gate(host.clone())
            .with_keep_alive(host.clone())
            .with_trackers(trackers.clone())
            .with_preferences(preferences.clone());
        let events = deps.bus.subscribe();
        let manager = LinkManager::spawn(deps, config, radio_rx);

        Self {
            manager,
            radio,
            host,
            trackers,
            preferences,
            events,
            radio_tx,
        }
    }

    /// Deliver a hardware callback to the manager.
    pub fn inject(&self, event: RadioEvent) {
        self.radio_tx.send(event).unwrap();
    }

    /// Round-trip through the event loop. Radio events are served before
    /// commands, so everything injected earlier has been handled.
    pub async fn settle(&self) -> LinkStatus {
        self.manager.status().await.unwrap()
    }

    pub async fn next_event(&mut self) -> LinkEvent {
        tokio::time::timeout(Duration::from_secs(120), self.events.recv())
            .await
            .expect("timed out waiting for a link event")
            .unwrap()
    }

    /// Skip ahead to the first event matching `wanted`.
    pub async fn wait_for(&mut self, wanted: impl Fn(&LinkEvent) -> bool) -> LinkEvent {
        loop {
            let event = self.next_event().await;
            if wanted(&event) {
                return event;
            }
        }
    }

    /// Everything published so far, without waiting.
    pub fn drain(&mut self) -> Vec<LinkEvent> {
        std::iter::from_fn(|| self.events.try_recv()).collect()
    }

    /// Drive a connect through the full handshake. Returns the handle.
    pub async fn connect_fully(&mut self, address: PeripheralAddress) -> HandleId {
        self.manager.connect(address).await.unwrap();
        self.complete_handshake().await
    }

    /// Answer the pending session's requests until it reaches `Connected`.
    pub async fn complete_handshake(&mut self) -> HandleId {
        let handle = self.radio.last_handle();
        self.inject(RadioEvent::Connected { handle });
        self.inject(RadioEvent::ServicesDiscovered {
            handle,
            services: telemetry_services(),
        });
        self.inject(descriptor_written(handle, GATT_SUCCESS));
        self.settle().await;
        handle
    }

    pub fn notify(&self, handle: HandleId, payload: &str) {
        self.inject(RadioEvent::Notification {
            handle,
            characteristic: TELEMETRY_CHARACTERISTIC,
            value: bytes::Bytes::copy_from_slice(payload.as_bytes()),
        });
    }

    /// Poll `condition` until it holds.
    pub async fn wait_until(&self, mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(120), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition never held");
    }
}

// ── Builders ────────────────────────────────────────────────────────

pub fn addr(last: u8) -> PeripheralAddress {
    PeripheralAddress::new([0xC0, 0xFF, 0xEE, 0x00, 0x00, last])
}

pub fn telemetry_services() -> Vec<GattService> {
    vec![
        GattService {
            uuid: Uuid::from_u128(0x0000_1800_0000_1000_8000_0080_5f9b_34fb),
            characteristics: Vec::new(),
        },
        GattService {
            uuid: TELEMETRY_SERVICE,
            characteristics: vec![GattCharacteristic {
                uuid: TELEMETRY_CHARACTERISTIC,
                descriptors: vec![CLIENT_CONFIG_DESCRIPTOR],
            }],
        },
    ]
}

pub fn descriptor_written(handle: HandleId, status: i32) -> RadioEvent {
    RadioEvent::DescriptorWritten {
        handle,
        characteristic: TELEMETRY_CHARACTERISTIC,
        descriptor: CLIENT_CONFIG_DESCRIPTOR,
        status,
    }
}

pub fn terminal_events(events: &[LinkEvent]) -> usize {
    events.iter().filter(|e| e.is_terminal()).count()
}
