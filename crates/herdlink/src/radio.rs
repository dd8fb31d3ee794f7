// ── btleplug radio backend ──
//
// Adapts btleplug's async central API to the fire-and-forget `Radio`
// seam. One pump task turns adapter events into discovery and drop
// callbacks while tracking adapter power and the peripherals the adapter
// knows; each opened handle gets its own link task that serializes the
// requests made against it.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use btleplug::api::{
    BDAddr, Central, CentralEvent, CentralState, CharPropFlags, Manager as _, Peripheral as _,
    ScanFilter, ValueNotification,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use herdlink_core::config::CLIENT_CONFIG_DESCRIPTOR;
use herdlink_core::error::UNKNOWN_CODE;
use herdlink_core::radio::GATT_SUCCESS;
use herdlink_core::{
    GattCharacteristic, GattService, HandleId, PeripheralAddress, Radio, RadioError, RadioEvent,
    RadioEventSender, RadioHandle,
};

type CentralEvents = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;
type Notifications = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

enum LinkRequest {
    DiscoverServices,
    Subscribe { characteristic: Uuid, descriptor: Uuid },
    Disconnect,
    Close,
}

/// [`Radio`] backed by the first Bluetooth adapter btleplug reports.
pub struct BtleplugRadio {
    shared: Arc<Shared>,
    pump: JoinHandle<()>,
}

struct Shared {
    adapter: Adapter,
    events: RadioEventSender,
    powered: AtomicBool,
    scanning: AtomicBool,
    next_handle: AtomicU64,
    known: KnownPeripherals<PeripheralId>,
    links: DashMap<HandleId, mpsc::UnboundedSender<LinkRequest>>,
    by_peripheral: DashMap<PeripheralId, HandleId>,
}

impl BtleplugRadio {
    /// Bind to the first adapter. Callbacks are published on `events`.
    pub async fn open(events: RadioEventSender) -> Result<Self, RadioError> {
        let manager = Manager::new().await.map_err(backend)?;
        let adapter = manager
            .adapters()
            .await
            .map_err(backend)?
            .into_iter()
            .next()
            .ok_or(RadioError::Unavailable)?;

        if let Ok(info) = adapter.adapter_info().await {
            info!(adapter = %info, "bluetooth adapter ready");
        }

        let powered = match adapter.adapter_state().await {
            Ok(state) => is_powered(state),
            Err(e) => {
                warn!(error = %e, "could not read adapter state, assuming powered");
                true
            }
        };

        // Peripherals the stack already knows (bonded or cached) can be
        // opened without a scan.
        let known = KnownPeripherals::default();
        for peripheral in adapter.peripherals().await.map_err(backend)? {
            known.record(to_address(peripheral.address()), peripheral.id());
        }
        debug!(powered, known = known.len(), "adapter state loaded");

        let central_events = adapter.events().await.map_err(backend)?;
        let shared = Arc::new(Shared {
            adapter,
            events,
            powered: AtomicBool::new(powered),
            scanning: AtomicBool::new(false),
            next_handle: AtomicU64::new(1),
            known,
            links: DashMap::new(),
            by_peripheral: DashMap::new(),
        });
        let pump = tokio::spawn(pump(Arc::clone(&shared), central_events));

        Ok(Self { shared, pump })
    }

    fn request(&self, handle: &RadioHandle, request: LinkRequest) -> Result<(), RadioError> {
        let link = self
            .shared
            .links
            .get(&handle.id())
            .ok_or_else(|| RadioError::Backend(format!("handle {} is closed", handle.id())))?;
        link.send(request)
            .map_err(|_| RadioError::Backend(format!("link task for {} ended", handle.id())))
    }
}

impl Drop for BtleplugRadio {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

impl Radio for BtleplugRadio {
    /// Last power state the adapter reported.
    fn is_enabled(&self) -> bool {
        self.shared.powered.load(Ordering::Acquire)
    }

    fn start_discovery(&self, service: Uuid) -> Result<(), RadioError> {
        self.shared.scanning.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let filter = ScanFilter {
                services: vec![service],
            };
            if let Err(e) = shared.adapter.start_scan(filter).await {
                warn!(error = %e, "adapter refused to scan");
                shared.scanning.store(false, Ordering::Release);
                shared.emit(RadioEvent::ScanFailed { code: UNKNOWN_CODE });
            }
        });
        Ok(())
    }

    fn stop_discovery(&self) {
        self.shared.scanning.store(false, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            if let Err(e) = shared.adapter.stop_scan().await {
                debug!(error = %e, "failed to stop adapter scan cleanly");
            }
        });
    }

    fn open(
        &self,
        address: &PeripheralAddress,
        auto_connect: bool,
    ) -> Result<RadioHandle, RadioError> {
        let peripheral = self.shared.known.resolve(address)?;
        let id = HandleId::new(self.shared.next_handle.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.links.insert(id, tx);

        debug!(%address, handle = %id, auto_connect, "opening link");
        tokio::spawn(run_link(
            Arc::clone(&self.shared),
            id,
            *address,
            peripheral,
            rx,
        ));
        Ok(RadioHandle::new(id, *address))
    }

    fn discover_services(&self, handle: &RadioHandle) -> Result<(), RadioError> {
        self.request(handle, LinkRequest::DiscoverServices)
    }

    /// btleplug enables local delivery together with the descriptor write.
    fn enable_notifications(
        &self,
        handle: &RadioHandle,
        _characteristic: Uuid,
    ) -> Result<(), RadioError> {
        if self.shared.links.contains_key(&handle.id()) {
            Ok(())
        } else {
            Err(RadioError::Backend(format!("handle {} is closed", handle.id())))
        }
    }

    fn write_descriptor(
        &self,
        handle: &RadioHandle,
        characteristic: Uuid,
        descriptor: Uuid,
        _value: &[u8],
    ) -> Result<(), RadioError> {
        if descriptor != CLIENT_CONFIG_DESCRIPTOR {
            return Err(RadioError::Backend(format!(
                "only the client configuration descriptor can be written, got {descriptor}"
            )));
        }
        self.request(
            handle,
            LinkRequest::Subscribe {
                characteristic,
                descriptor,
            },
        )
    }

    fn disconnect(&self, handle: &RadioHandle) -> Result<(), RadioError> {
        self.request(handle, LinkRequest::Disconnect)
    }

    fn close(&self, handle: RadioHandle) {
        if let Some((_, link)) = self.shared.links.remove(&handle.id()) {
            let _ = link.send(LinkRequest::Close);
        }
    }
}

impl Shared {
    fn emit(&self, event: RadioEvent) {
        // The manager going away first is not an error.
        let _ = self.events.send(event);
    }

    fn on_state_update(&self, state: CentralState) {
        let powered = is_powered(state.clone());
        let was = self.powered.swap(powered, Ordering::AcqRel);
        if was == powered {
            return;
        }
        info!(?state, "adapter power changed");
        if !powered && self.scanning.swap(false, Ordering::AcqRel) {
            self.emit(RadioEvent::ScanFailed { code: UNKNOWN_CODE });
        }
    }
}

// ── Known peripherals ────────────────────────────────────────────────

/// Addresses the adapter has reported, mapped to the backend's own
/// peripheral id. Opening an address outside this map fails up front.
struct KnownPeripherals<I> {
    by_address: DashMap<PeripheralAddress, I>,
}

impl<I> Default for KnownPeripherals<I> {
    fn default() -> Self {
        Self {
            by_address: DashMap::new(),
        }
    }
}

impl<I: Clone> KnownPeripherals<I> {
    fn record(&self, address: PeripheralAddress, id: I) {
        self.by_address.insert(address, id);
    }

    fn forget(&self, address: &PeripheralAddress) {
        self.by_address.remove(address);
    }

    fn resolve(&self, address: &PeripheralAddress) -> Result<I, RadioError> {
        self.by_address
            .get(address)
            .map(|id| id.value().clone())
            .ok_or_else(|| RadioError::UnknownPeripheral(address.to_string()))
    }

    fn len(&self) -> usize {
        self.by_address.len()
    }
}

// ── Adapter event pump ───────────────────────────────────────────────

async fn pump(shared: Arc<Shared>, mut events: CentralEvents) {
    while let Some(event) = events.next().await {
        match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                let Ok(peripheral) = shared.adapter.peripheral(&id).await else {
                    continue;
                };
                let address = to_address(peripheral.address());
                shared.known.record(address, id);

                if !shared.scanning.load(Ordering::Acquire) {
                    continue;
                }
                let name = match peripheral.properties().await {
                    Ok(Some(props)) => props.local_name,
                    _ => None,
                };
                shared.emit(RadioEvent::Discovered { address, name });
            }
            CentralEvent::StateUpdate(state) => shared.on_state_update(state),
            CentralEvent::DeviceDisconnected(id) => {
                if let Some((_, handle)) = shared.by_peripheral.remove(&id) {
                    shared.emit(RadioEvent::Disconnected { handle });
                }
            }
            _ => {}
        }
    }
    debug!("adapter event stream ended");
}

// ── Per-handle link task ─────────────────────────────────────────────

async fn run_link(
    shared: Arc<Shared>,
    handle: HandleId,
    address: PeripheralAddress,
    id: PeripheralId,
    mut requests: mpsc::UnboundedReceiver<LinkRequest>,
) {
    let peripheral = match shared.adapter.peripheral(&id).await {
        Ok(peripheral) => peripheral,
        Err(e) => {
            // Dropped by the stack since it was recorded: the next open
            // reports it as unknown.
            warn!(%address, error = %e, "peripheral vanished from the adapter");
            shared.known.forget(&address);
            shared.emit(RadioEvent::Error {
                handle,
                code: UNKNOWN_CODE,
            });
            return;
        }
    };

    shared.by_peripheral.insert(peripheral.id(), handle);
    if let Err(e) = peripheral.connect().await {
        warn!(%address, error = %e, "connect failed");
        shared.by_peripheral.remove(&peripheral.id());
        shared.emit(RadioEvent::Error {
            handle,
            code: UNKNOWN_CODE,
        });
        return;
    }
    shared.emit(RadioEvent::Connected { handle });

    let mut notifications: Notifications = match peripheral.notifications().await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(%address, error = %e, "notification stream unavailable");
            shared.emit(RadioEvent::Error {
                handle,
                code: UNKNOWN_CODE,
            });
            Box::pin(tokio_stream::empty())
        }
    };

    loop {
        tokio::select! {
            request = requests.recv() => match request {
                Some(LinkRequest::DiscoverServices) => {
                    let event = match peripheral.discover_services().await {
                        Ok(()) => RadioEvent::ServicesDiscovered {
                            handle,
                            services: gatt_services(&peripheral),
                        },
                        Err(e) => {
                            warn!(%address, error = %e, "service discovery failed");
                            RadioEvent::ServiceDiscoveryFailed { handle, code: UNKNOWN_CODE }
                        }
                    };
                    shared.emit(event);
                }
                Some(LinkRequest::Subscribe { characteristic, descriptor }) => {
                    let status = subscribe(&peripheral, characteristic).await;
                    shared.emit(RadioEvent::DescriptorWritten {
                        handle,
                        characteristic,
                        descriptor,
                        status,
                    });
                }
                Some(LinkRequest::Disconnect) => {
                    if let Err(e) = peripheral.disconnect().await {
                        debug!(%address, error = %e, "disconnect request failed");
                    }
                }
                Some(LinkRequest::Close) | None => break,
            },
            Some(notification) = notifications.next() => {
                shared.emit(RadioEvent::Notification {
                    handle,
                    characteristic: notification.uuid,
                    value: Bytes::from(notification.value),
                });
            }
        }
    }

    shared.by_peripheral.remove(&peripheral.id());
    if peripheral.is_connected().await.unwrap_or(false) {
        if let Err(e) = peripheral.disconnect().await {
            debug!(%address, error = %e, "disconnect on close failed");
        }
    }
    debug!(%address, %handle, "link closed");
}

async fn subscribe(peripheral: &Peripheral, characteristic: Uuid) -> i32 {
    let Some(target) = peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == characteristic)
    else {
        return UNKNOWN_CODE;
    };
    match peripheral.subscribe(&target).await {
        Ok(()) => GATT_SUCCESS,
        Err(e) => {
            warn!(error = %e, %characteristic, "subscribe failed");
            UNKNOWN_CODE
        }
    }
}

// ── Conversions ──────────────────────────────────────────────────────

fn to_address(addr: BDAddr) -> PeripheralAddress {
    PeripheralAddress::new(addr.into_inner())
}

/// CoreBluetooth reports `Unknown` until it settles, so only an explicit
/// power-off counts as unavailable.
fn is_powered(state: CentralState) -> bool {
    !matches!(state, CentralState::PoweredOff)
}

/// BlueZ manages the client configuration descriptor itself and does not
/// list it, so notifying characteristics always report one.
fn gatt_services(peripheral: &Peripheral) -> Vec<GattService> {
    peripheral
        .services()
        .into_iter()
        .map(|service| GattService {
            uuid: service.uuid,
            characteristics: service
                .characteristics
                .into_iter()
                .map(|c| {
                    let mut descriptors: Vec<Uuid> =
                        c.descriptors.iter().map(|d| d.uuid).collect();
                    let notifies = c
                        .properties
                        .intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE);
                    if notifies && !descriptors.contains(&CLIENT_CONFIG_DESCRIPTOR) {
                        descriptors.push(CLIENT_CONFIG_DESCRIPTOR);
                    }
                    GattCharacteristic {
                        uuid: c.uuid,
                        descriptors,
                    }
                })
                .collect(),
        })
        .collect()
}

fn backend(err: btleplug::Error) -> RadioError {
    RadioError::Backend(err.to_string())
}
