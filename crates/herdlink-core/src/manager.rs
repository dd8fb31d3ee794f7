// ── Link manager ──
//
// Single event loop owning the radio. Hardware callbacks, commands and
// timers are serialized through one `select!`, so no two transitions of
// the session ever run concurrently. Upserts and preference writes are
// handed off to background tasks and never block the loop.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bus::{EventBus, Subscription};
use crate::command::{Command, CommandEnvelope, CommandResult, LinkStatus};
use crate::config::{GattProfile, LinkConfig};
use crate::error::{LinkError, RadioError, UNKNOWN_CODE};
use crate::frame::parse_frame;
use crate::host::{AllowAll, AuthorizationGate, KeepAlive, NoKeepAlive};
use crate::link::{ConnectMode, LinkSession, LinkState, PendingReconnect, SessionEnd};
use crate::model::{LinkEvent, PeripheralAddress};
use crate::pipeline::UpsertPipeline;
use crate::preference::{LinkPreferenceStore, PreferenceWriter};
use crate::radio::{GATT_SUCCESS, GattService, Radio, RadioEvent, RadioEventReceiver};
use crate::scanner::Scanner;
use crate::store::{MemoryTrackerStore, TrackerStore};

const COMMAND_CHANNEL_SIZE: usize = 64;

// ── Dependencies ─────────────────────────────────────────────────

/// Collaborators injected into a [`LinkManager`].
#[derive(Clone)]
pub struct LinkDeps {
    pub radio: Arc<dyn Radio>,
    pub gate: Arc<dyn AuthorizationGate>,
    pub keep_alive: Arc<dyn KeepAlive>,
    pub trackers: Arc<dyn TrackerStore>,
    pub preferences: LinkPreferenceStore,
    pub bus: EventBus,
}

impl LinkDeps {
    /// Permissive host hooks, in-memory stores and a fresh bus.
    pub fn new(radio: Arc<dyn Radio>) -> Self {
        Self {
            radio,
            gate: Arc::new(AllowAll),
            keep_alive: Arc::new(NoKeepAlive),
            trackers: Arc::new(MemoryTrackerStore::new()),
            preferences: LinkPreferenceStore::in_memory(),
            bus: EventBus::new(),
        }
    }

    #[must_use]
    pub fn with_gate(mut self, gate: Arc<dyn AuthorizationGate>) -> Self {
        self.gate = gate;
        self
    }

    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: Arc<dyn KeepAlive>) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    #[must_use]
    pub fn with_trackers(mut self, trackers: Arc<dyn TrackerStore>) -> Self {
        self.trackers = trackers;
        self
    }

    #[must_use]
    pub fn with_preferences(mut self, preferences: LinkPreferenceStore) -> Self {
        self.preferences = preferences;
        self
    }

    #[must_use]
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }
}

// ── LinkManager ──────────────────────────────────────────────────

/// Handle to the running link manager.
///
/// Cheaply cloneable via `Arc<ManagerInner>`. Every operation is
/// acknowledged as soon as the event loop has accepted it; outcomes are
/// delivered on the [`EventBus`].
#[derive(Clone)]
pub struct LinkManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    bus: EventBus,
    state: watch::Receiver<LinkState>,
    command_tx: mpsc::Sender<CommandEnvelope>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LinkManager {
    /// Start the event loop. Must be called inside a Tokio runtime.
    ///
    /// `radio_events` is the receiving half of the channel the radio
    /// backend publishes its callbacks on.
    pub fn spawn(deps: LinkDeps, config: LinkConfig, radio_events: RadioEventReceiver) -> Self {
        let (state_tx, state) = watch::channel(LinkState::Idle);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let cancel = CancellationToken::new();

        let pipeline = UpsertPipeline::spawn(
            config.upsert_workers,
            config.upsert_queue,
            Arc::clone(&deps.trackers),
            deps.bus.clone(),
        );
        let driver = LinkDriver {
            scanner: Scanner::new(&config),
            config,
            radio: deps.radio,
            gate: deps.gate,
            keep_alive: deps.keep_alive,
            bus: deps.bus.clone(),
            session: None,
            reconnect: None,
            pipeline,
            preferences: PreferenceWriter::spawn(deps.preferences),
            state_tx,
        };

        let task = tokio::spawn(driver.run(radio_events, command_rx, cancel.clone()));
        debug!("link manager started");

        Self {
            inner: Arc::new(ManagerInner {
                bus: deps.bus,
                state,
                command_tx,
                cancel,
                task: Mutex::new(Some(task)),
            }),
        }
    }

    // ── Command execution ────────────────────────────────────────

    /// Send a command to the event loop and await its acknowledgement.
    pub async fn execute(&self, command: Command) -> Result<CommandResult, LinkError> {
        let (tx, rx) = oneshot::channel();

        self.inner
            .command_tx
            .send(CommandEnvelope {
                command,
                response_tx: tx,
            })
            .await
            .map_err(|_| LinkError::ManagerStopped)?;

        rx.await.map_err(|_| LinkError::ManagerStopped)?
    }

    pub async fn start_scan(&self) -> Result<(), LinkError> {
        self.execute(Command::StartScan).await.map(drop)
    }

    pub async fn stop_scan(&self) -> Result<(), LinkError> {
        self.execute(Command::StopScan).await.map(drop)
    }

    pub async fn connect(&self, address: PeripheralAddress) -> Result<(), LinkError> {
        self.execute(Command::Connect { address }).await.map(drop)
    }

    pub async fn disconnect(&self) -> Result<(), LinkError> {
        self.execute(Command::Disconnect).await.map(drop)
    }

    /// Reconnect to the stored peripheral. Returns the address being
    /// reconnected, or `None` when a session is already live or nothing
    /// is stored.
    pub async fn resume(&self) -> Result<Option<PeripheralAddress>, LinkError> {
        match self.execute(Command::Resume).await? {
            CommandResult::Resumed { address } => Ok(address),
            _ => Ok(None),
        }
    }

    pub async fn forget(&self) -> Result<(), LinkError> {
        self.execute(Command::Forget).await.map(drop)
    }

    pub async fn status(&self) -> Result<LinkStatus, LinkError> {
        match self.execute(Command::Status).await? {
            CommandResult::Status(status) => Ok(status),
            _ => Err(LinkError::ManagerStopped),
        }
    }

    // ── State observation ────────────────────────────────────────

    /// Subscribe to link state changes.
    pub fn state(&self) -> watch::Receiver<LinkState> {
        self.inner.state.clone()
    }

    pub fn current_state(&self) -> LinkState {
        *self.inner.state.borrow()
    }

    /// Subscribe to the event bus.
    pub fn subscribe(&self) -> Subscription {
        self.inner.bus.subscribe()
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Tear down any session, stop scanning, drain background work and
    /// join the event loop. Later commands fail with
    /// [`LinkError::ManagerStopped`].
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let task = self.inner.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "link manager task panicked");
            }
            debug!("link manager stopped");
        }
    }
}

// ── Event loop ───────────────────────────────────────────────────

struct LinkDriver {
    config: LinkConfig,
    radio: Arc<dyn Radio>,
    gate: Arc<dyn AuthorizationGate>,
    keep_alive: Arc<dyn KeepAlive>,
    bus: EventBus,
    scanner: Scanner,
    session: Option<LinkSession>,
    reconnect: Option<PendingReconnect>,
    pipeline: UpsertPipeline,
    preferences: PreferenceWriter,
    state_tx: watch::Sender<LinkState>,
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl LinkDriver {
    async fn run(
        mut self,
        mut radio_events: RadioEventReceiver,
        mut commands: mpsc::Receiver<CommandEnvelope>,
        cancel: CancellationToken,
    ) {
        let mut radio_open = true;

        loop {
            let scan_deadline = self.scanner.deadline();
            let connect_deadline = self
                .session
                .as_ref()
                .filter(|s| s.state.is_negotiating())
                .map(|s| s.deadline);
            let reconnect_due = self.reconnect.as_ref().map(|r| r.due);

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = radio_events.recv(), if radio_open => {
                    match event {
                        Some(event) => self.on_radio_event(event),
                        None => {
                            warn!("radio event stream closed");
                            radio_open = false;
                        }
                    }
                }
                envelope = commands.recv() => {
                    let Some(envelope) = envelope else { break };
                    let result = self.execute(envelope.command);
                    let _ = envelope.response_tx.send(result);
                }
                () = sleep_until_opt(scan_deadline) => self.on_scan_window_elapsed(),
                () = sleep_until_opt(connect_deadline) => self.on_connect_timeout(),
                () = sleep_until_opt(reconnect_due) => self.on_reconnect_due(),
            }
        }

        self.finish().await;
    }

    // ── Command routing ──────────────────────────────────────────

    fn execute(&mut self, command: Command) -> Result<CommandResult, LinkError> {
        debug!(%command, "executing command");
        match command {
            Command::StartScan => {
                self.scanner
                    .start(self.radio.as_ref(), self.gate.as_ref(), &self.bus)?;
                Ok(CommandResult::Accepted)
            }
            Command::StopScan => {
                self.scanner.stop(self.radio.as_ref(), &self.bus);
                Ok(CommandResult::Accepted)
            }
            Command::Connect { address } => {
                self.cancel_reconnect();
                self.connect(address, None, ConnectMode::Manual, 0)?;
                Ok(CommandResult::Accepted)
            }
            Command::Disconnect => {
                self.cancel_reconnect();
                self.end_current(SessionEnd::UserDisconnect, true);
                Ok(CommandResult::Accepted)
            }
            Command::Resume => self.resume(),
            Command::Forget => {
                self.cancel_reconnect();
                self.preferences.clear();
                info!("stored link forgotten");
                Ok(CommandResult::Accepted)
            }
            Command::Status => Ok(CommandResult::Status(self.status())),
        }
    }

    fn status(&self) -> LinkStatus {
        let session = self.session.as_ref();
        LinkStatus {
            state: *self.state_tx.borrow(),
            address: session.map(|s| s.address),
            name: session.and_then(|s| s.name.clone()),
            scanning: self.scanner.is_scanning(),
            peripherals: self.bus.latest_directory().map_or(0, |d| d.len()),
        }
    }

    // ── Session start ────────────────────────────────────────────

    /// Begin a session. Any live session is torn down first.
    fn connect(
        &mut self,
        address: PeripheralAddress,
        name_hint: Option<String>,
        mode: ConnectMode,
        attempt: u32,
    ) -> Result<(), LinkError> {
        let name = name_hint.or_else(|| {
            self.scanner
                .directory()
                .name_of(&address)
                .map(str::to_owned)
        });
        let target_name = name.clone().unwrap_or_else(|| address.to_string());

        if !self.gate.has_connect_authorization() {
            return Err(self.reject_connect(
                &target_name,
                LinkError::PermissionDenied {
                    operation: "connect",
                },
            ));
        }
        if !self.radio.is_enabled() {
            return Err(self.reject_connect(&target_name, LinkError::RadioUnavailable));
        }

        // One radio: connecting and scanning are mutually exclusive.
        self.scanner.stop(self.radio.as_ref(), &self.bus);
        self.end_current(SessionEnd::Superseded, true);

        self.bus.publish(LinkEvent::Connecting {
            name: target_name.clone(),
        });

        match self.radio.open(&address, true) {
            Ok(handle) => {
                info!(%address, handle = %handle.id(), %mode, attempt, "connecting");
                let deadline = Instant::now() + self.config.connect_timeout;
                self.session = Some(LinkSession::new(handle, name, mode, attempt, deadline));
                self.advance(LinkState::Connecting);
                Ok(())
            }
            Err(e) => {
                let err = LinkError::from(e);
                warn!(%address, error = %err, "connect request rejected");
                self.advance(LinkState::Failed);
                self.bus.publish(LinkEvent::ConnectFailed {
                    name: target_name,
                    reason: err.reason(),
                    code: err.code(),
                });

                if mode == ConnectMode::Auto {
                    if matches!(err, LinkError::InvalidAddress(_)) {
                        warn!(%address, "stored peripheral no longer resolves, forgetting it");
                        self.preferences.clear();
                    } else if err.is_retryable() {
                        self.schedule_reconnect(address, name, attempt);
                    }
                }
                Err(err)
            }
        }
    }

    fn reject_connect(&self, name: &str, err: LinkError) -> LinkError {
        warn!(error = %err, "connect rejected");
        self.bus.publish(LinkEvent::ConnectFailed {
            name: name.to_owned(),
            reason: err.reason(),
            code: err.code(),
        });
        err
    }

    fn resume(&mut self) -> Result<CommandResult, LinkError> {
        if self.session.is_some() {
            debug!("session already live, nothing to resume");
            return Ok(CommandResult::Resumed { address: None });
        }

        if let Some(pending) = self.reconnect.take() {
            debug!(address = %pending.address, "running pending reconnect now");
            self.connect(pending.address, pending.name, ConnectMode::Auto, pending.attempt)?;
            return Ok(CommandResult::Resumed {
                address: Some(pending.address),
            });
        }

        let Some(preference) = self.preferences.current().cloned() else {
            debug!("no stored link");
            return Ok(CommandResult::Resumed { address: None });
        };

        match preference.address.parse::<PeripheralAddress>() {
            Ok(address) => {
                info!(%address, "resuming stored link");
                self.connect(address, preference.display_name, ConnectMode::Auto, 0)?;
                Ok(CommandResult::Resumed {
                    address: Some(address),
                })
            }
            Err(e) => {
                warn!(error = %e, "stored link address is invalid, forgetting it");
                let name = preference.display_name_or_address().to_owned();
                let err = LinkError::InvalidAddress(preference.address);
                self.bus.publish(LinkEvent::Connecting { name: name.clone() });
                self.bus.publish(LinkEvent::ConnectFailed {
                    name,
                    reason: err.reason(),
                    code: err.code(),
                });
                self.preferences.clear();
                Err(err)
            }
        }
    }

    // ── Radio events ─────────────────────────────────────────────

    fn on_radio_event(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::Discovered { address, name } => {
                self.scanner.on_discovered(address, name, &self.bus);
            }
            RadioEvent::ScanFailed { code } => self.scanner.on_scan_failed(code, &self.bus),
            event => self.on_session_event(event),
        }
    }

    fn on_session_event(&mut self, event: RadioEvent) {
        let Some(handle) = event.handle() else { return };
        let Some(state) = self
            .session
            .as_ref()
            .filter(|s| s.owns(handle))
            .map(|s| s.state)
        else {
            debug!(%handle, "event for released handle ignored");
            return;
        };

        match (state, event) {
            (_, RadioEvent::Disconnected { .. }) => {
                self.end_current(SessionEnd::Dropped, false);
            }
            (_, RadioEvent::Error { code, .. }) => {
                self.end_current(SessionEnd::Failed(LinkError::Transport { code }), false);
            }
            (LinkState::Connecting, RadioEvent::Connected { .. }) => self.on_link_up(),
            (LinkState::ServiceDiscovery, RadioEvent::ServicesDiscovered { services, .. }) => {
                self.on_services_discovered(&services);
            }
            (LinkState::ServiceDiscovery, RadioEvent::ServiceDiscoveryFailed { code, .. }) => {
                self.fail(LinkError::Transport { code });
            }
            (
                LinkState::SubscribingNotifications,
                RadioEvent::DescriptorWritten {
                    characteristic,
                    descriptor,
                    status,
                    ..
                },
            ) => self.on_descriptor_written(characteristic, descriptor, status),
            (
                LinkState::Connected,
                RadioEvent::Notification {
                    characteristic,
                    value,
                    ..
                },
            ) => self.on_notification(characteristic, &value),
            (state, event) => debug!(%state, ?event, "unexpected radio event ignored"),
        }
    }

    /// Low-level link is up: enumerate capabilities.
    fn on_link_up(&mut self) {
        self.advance(LinkState::ServiceDiscovery);

        let Some(session) = self.session.as_mut() else {
            return;
        };
        self.keep_alive.promote(&session.display_name());
        session.promoted = true;

        let result = match session.handle() {
            Some(handle) => self.radio.discover_services(handle),
            None => return,
        };
        if let Err(e) = result {
            self.fail(e.into());
        }
    }

    fn on_services_discovered(&mut self, services: &[GattService]) {
        let gatt = self.config.gatt.clone();
        if let Err(err) = locate_telemetry(services, &gatt) {
            self.fail(err);
            return;
        }

        let Some(handle) = self.session.as_ref().and_then(LinkSession::handle) else {
            return;
        };
        if let Err(e) = self.radio.enable_notifications(handle, gatt.characteristic) {
            self.fail(e.into());
            return;
        }

        self.advance(LinkState::SubscribingNotifications);

        let Some(handle) = self.session.as_ref().and_then(LinkSession::handle) else {
            return;
        };
        let written = self.radio.write_descriptor(
            handle,
            gatt.characteristic,
            gatt.config_descriptor,
            &gatt.enable_value,
        );
        if let Err(e) = written {
            let status = match e {
                RadioError::Rejected { code } => code,
                _ => UNKNOWN_CODE,
            };
            self.fail(LinkError::DescriptorWriteFailed { status });
        }
    }

    fn on_descriptor_written(&mut self, characteristic: Uuid, descriptor: Uuid, status: i32) {
        if status != GATT_SUCCESS {
            self.fail(LinkError::DescriptorWriteFailed { status });
            return;
        }
        if characteristic != self.config.gatt.characteristic
            || descriptor != self.config.gatt.config_descriptor
        {
            debug!(%characteristic, %descriptor, "unrelated descriptor write ignored");
            return;
        }

        self.advance(LinkState::Connected);
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.attempt = 0;
        let address = session.address;
        let name = session.name.clone();
        let session_name = session.display_name();

        self.preferences.save(address, name);
        info!(%address, name = %session_name, "link established");
        self.bus.publish(LinkEvent::Connected {
            name: session_name,
            address,
        });
    }

    fn on_notification(&self, characteristic: Uuid, value: &[u8]) {
        if characteristic != self.config.gatt.characteristic {
            debug!(%characteristic, "notification on foreign characteristic ignored");
            return;
        }
        match parse_frame(value) {
            Ok(frame) => self.pipeline.submit(frame, Utc::now()),
            Err(e) => warn!(error = %e, len = value.len(), "dropping malformed frame"),
        }
    }

    // ── Timers ───────────────────────────────────────────────────

    fn on_scan_window_elapsed(&mut self) {
        debug!("scan window elapsed");
        self.scanner.stop(self.radio.as_ref(), &self.bus);
    }

    fn on_connect_timeout(&mut self) {
        let after_secs = self.config.connect_timeout.as_secs();
        warn!(after_secs, "connect attempt timed out");
        self.fail(LinkError::Timeout { after_secs });
    }

    fn on_reconnect_due(&mut self) {
        let Some(pending) = self.reconnect.take() else {
            return;
        };
        info!(address = %pending.address, attempt = pending.attempt, "reconnecting");
        if let Err(e) = self.connect(
            pending.address,
            pending.name,
            ConnectMode::Auto,
            pending.attempt,
        ) {
            debug!(error = %e, "reconnect attempt rejected");
        }
    }

    // ── Teardown ─────────────────────────────────────────────────

    /// Fail the live session, with a formal disconnect.
    fn fail(&mut self, err: LinkError) {
        self.end_current(SessionEnd::Failed(err), true);
    }

    fn end_current(&mut self, end: SessionEnd, handshake: bool) {
        if let Some(session) = self.session.take() {
            self.end_session(session, end, handshake);
        }
    }

    /// Release the session's handle exactly once and emit exactly one
    /// terminal event.
    fn end_session(&mut self, mut session: LinkSession, end: SessionEnd, handshake: bool) {
        if handshake {
            if let Some(handle) = session.handle() {
                if self.gate.has_connect_authorization() {
                    if let Err(e) = self.radio.disconnect(handle) {
                        warn!(handle = %handle.id(), error = %e, "disconnect request failed");
                    }
                } else {
                    debug!(handle = %handle.id(), "not authorized to disconnect, closing directly");
                }
            }
        }
        session.release(self.radio.as_ref());
        if session.promoted {
            self.keep_alive.demote();
        }

        self.advance(end.final_state());
        let name = session.display_name();
        match &end {
            SessionEnd::Failed(err) => {
                warn!(address = %session.address, error = %err, "session failed");
                self.bus.publish(LinkEvent::ConnectFailed {
                    name,
                    reason: err.reason(),
                    code: err.code(),
                });
            }
            _ => {
                info!(address = %session.address, reason = ?end, "disconnected");
                self.bus.publish(LinkEvent::Disconnected { name });
            }
        }

        if session.mode == ConnectMode::Auto && end.is_retryable() {
            self.schedule_reconnect(session.address, session.name, session.attempt);
        }
    }

    fn schedule_reconnect(
        &mut self,
        address: PeripheralAddress,
        name: Option<String>,
        failed_attempts: u32,
    ) {
        match PendingReconnect::schedule(address, name, failed_attempts, &self.config.reconnect) {
            Some(pending) => {
                debug!(%address, attempt = pending.attempt, "reconnect scheduled");
                self.reconnect = Some(pending);
            }
            None => warn!(%address, failed_attempts, "giving up on reconnect"),
        }
    }

    fn cancel_reconnect(&mut self) {
        if let Some(pending) = self.reconnect.take() {
            debug!(address = %pending.address, "pending reconnect cancelled");
        }
    }

    fn advance(&mut self, state: LinkState) {
        if let Some(session) = self.session.as_mut() {
            session.state = state;
        }
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "link state");
        }
    }

    async fn finish(mut self) {
        self.reconnect = None;
        self.end_current(SessionEnd::Shutdown, true);
        self.scanner.stop(self.radio.as_ref(), &self.bus);

        let Self {
            pipeline,
            preferences,
            ..
        } = self;
        pipeline.shutdown().await;
        preferences.shutdown().await;
    }
}

/// Check the enumerated capabilities expose the telemetry channel.
fn locate_telemetry(services: &[GattService], gatt: &GattProfile) -> Result<(), LinkError> {
    let service = services
        .iter()
        .find(|s| s.uuid == gatt.service)
        .ok_or_else(|| LinkError::ProtocolMismatch {
            missing: format!("service {}", gatt.service),
        })?;
    let characteristic =
        service
            .characteristic(gatt.characteristic)
            .ok_or_else(|| LinkError::ProtocolMismatch {
                missing: format!("characteristic {}", gatt.characteristic),
            })?;
    if !characteristic.descriptors.contains(&gatt.config_descriptor) {
        return Err(LinkError::ProtocolMismatch {
            missing: format!("descriptor {}", gatt.config_descriptor),
        });
    }
    Ok(())
}
