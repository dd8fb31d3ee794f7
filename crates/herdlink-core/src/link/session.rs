use tokio::time::Instant;
use tracing::debug;

use super::state::{ConnectMode, LinkState};
use crate::error::LinkError;
use crate::model::PeripheralAddress;
use crate::radio::{HandleId, Radio, RadioHandle};

/// The one live link.
///
/// Owns the radio handle and every per-connection attribute; all of it is
/// dropped together when the session ends.
#[derive(Debug)]
pub struct LinkSession {
    pub address: PeripheralAddress,
    pub name: Option<String>,
    pub state: LinkState,
    pub mode: ConnectMode,
    /// Consecutive failed attempts preceding this one.
    pub attempt: u32,
    /// Connect timeout; unused once `Connected`.
    pub deadline: Instant,
    /// Keep-alive was promoted for this session.
    pub promoted: bool,
    handle: Option<RadioHandle>,
}

impl LinkSession {
    pub fn new(
        handle: RadioHandle,
        name: Option<String>,
        mode: ConnectMode,
        attempt: u32,
        deadline: Instant,
    ) -> Self {
        Self {
            address: *handle.address(),
            name,
            state: LinkState::Connecting,
            mode,
            attempt,
            deadline,
            promoted: false,
            handle: Some(handle),
        }
    }

    /// Name shown in events: the resolved name, else the address.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.address.to_string())
    }

    /// Whether an event for `id` belongs to this session.
    pub fn owns(&self, id: HandleId) -> bool {
        self.handle.as_ref().is_some_and(|h| h.id() == id)
    }

    pub fn handle(&self) -> Option<&RadioHandle> {
        self.handle.as_ref()
    }

    /// Close the handle. Later calls are no-ops.
    pub fn release(&mut self, radio: &dyn Radio) {
        if let Some(handle) = self.handle.take() {
            debug!(handle = %handle.id(), address = %self.address, "releasing radio handle");
            radio.close(handle);
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peripheral or the stack dropped the link.
    Dropped,
    /// `disconnect()` was called.
    UserDisconnect,
    /// A new `connect()` replaced it.
    Superseded,
    /// The manager is stopping.
    Shutdown,
    Failed(LinkError),
}

impl SessionEnd {
    /// State the manager settles in afterwards.
    pub fn final_state(&self) -> LinkState {
        match self {
            Self::Failed(_) => LinkState::Failed,
            _ => LinkState::Disconnected,
        }
    }

    /// Whether an auto-mode session should be re-attempted.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Dropped => true,
            Self::Failed(err) => err.is_retryable(),
            Self::UserDisconnect | Self::Superseded | Self::Shutdown => false,
        }
    }
}
