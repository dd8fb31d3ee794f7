// ── Scanner ──
//
// Owns discovery on the radio and the peripheral directory it fills.
// Lives inside the link manager's event loop; the loop watches
// `deadline()` to stop the scan when its window elapses.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bus::EventBus;
use crate::config::LinkConfig;
use crate::directory::{DirectoryChange, PeripheralDirectory};
use crate::error::LinkError;
use crate::host::AuthorizationGate;
use crate::model::{LinkEvent, PeripheralAddress};
use crate::radio::Radio;

#[derive(Debug, Clone, Copy)]
struct ActiveScan {
    id: u64,
    deadline: Instant,
}

pub struct Scanner {
    directory: PeripheralDirectory,
    active: Option<ActiveScan>,
    last_scan_id: u64,
    window: Duration,
    service: Uuid,
    include_anonymous: bool,
}

impl Scanner {
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            directory: PeripheralDirectory::new(),
            active: None,
            last_scan_id: 0,
            window: config.scan_window,
            service: config.gatt.service,
            include_anonymous: config.include_anonymous,
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.active.is_some()
    }

    /// When the running scan should stop on its own.
    pub fn deadline(&self) -> Option<Instant> {
        self.active.map(|scan| scan.deadline)
    }

    pub fn directory(&self) -> &PeripheralDirectory {
        &self.directory
    }

    /// Start a fresh scan session. A scan already in progress is stopped
    /// first.
    pub fn start(
        &mut self,
        radio: &dyn Radio,
        gate: &dyn AuthorizationGate,
        bus: &EventBus,
    ) -> Result<(), LinkError> {
        if !gate.has_scan_authorization() {
            return Err(fail(bus, LinkError::PermissionDenied { operation: "scan" }));
        }
        if !radio.is_enabled() {
            return Err(fail(bus, LinkError::RadioUnavailable));
        }

        if self.is_scanning() {
            debug!("restarting scan");
            self.stop(radio, bus);
        }

        self.directory.clear();
        bus.reset_directory(self.directory.snapshot(self.include_anonymous));
        self.last_scan_id += 1;
        bus.publish(LinkEvent::ScanStarted);

        if let Err(e) = radio.start_discovery(self.service) {
            return Err(fail(bus, LinkError::from(e)));
        }

        self.active = Some(ActiveScan {
            id: self.last_scan_id,
            deadline: Instant::now() + self.window,
        });
        info!(
            scan_id = self.last_scan_id,
            window_secs = self.window.as_secs(),
            "scan started"
        );
        Ok(())
    }

    /// Stop the running scan. Returns `false` (and does nothing) when no
    /// scan is active.
    pub fn stop(&mut self, radio: &dyn Radio, bus: &EventBus) -> bool {
        let Some(scan) = self.active.take() else {
            return false;
        };
        radio.stop_discovery();
        bus.publish(LinkEvent::ScanStopped);
        info!(
            scan_id = scan.id,
            peripherals = self.directory.len(),
            "scan stopped"
        );
        true
    }

    /// Discovery callback: upsert and republish the directory.
    pub fn on_discovered(
        &mut self,
        address: PeripheralAddress,
        name: Option<String>,
        bus: &EventBus,
    ) {
        let Some(scan) = self.active else {
            debug!(%address, "discovery outside of a scan ignored");
            return;
        };
        let change = self.directory.upsert(address, name, scan.id);
        if change != DirectoryChange::Unchanged {
            debug!(%address, ?change, "directory updated");
        }
        bus.publish_directory(self.directory.snapshot(self.include_anonymous));
    }

    /// The radio aborted discovery.
    pub fn on_scan_failed(&mut self, code: i32, bus: &EventBus) {
        if self.active.take().is_none() {
            return;
        }
        warn!(code, "scan failed");
        bus.publish(LinkEvent::ScanFailed {
            reason: "scan failed".into(),
            code: Some(code),
        });
    }
}

fn fail(bus: &EventBus, err: LinkError) -> LinkError {
    warn!(error = %err, "scan rejected");
    bus.publish(LinkEvent::ScanFailed {
        reason: err.reason(),
        code: err.code(),
    });
    err
}
