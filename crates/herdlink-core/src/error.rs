// ── Core error types ──
//
// `LinkError` is what consumers see: every failure is reduced to a short
// reason for the event bus, with the raw radio code kept for diagnostics.
// `RadioError` is what a radio backend returns when it rejects a request
// outright; the `From` impl folds it into the link taxonomy.

use thiserror::Error;

/// Code reported when a backend failure carries no numeric status.
pub const UNKNOWN_CODE: i32 = -1;

/// Unified error type for link operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    // ── Precondition failures (never retried) ────────────────────────
    #[error("Permission denied for {operation}")]
    PermissionDenied { operation: &'static str },

    #[error("Radio is powered off or absent")]
    RadioUnavailable,

    #[error("Invalid peripheral address '{0}'")]
    InvalidAddress(String),

    // ── Session failures ─────────────────────────────────────────────
    #[error("Protocol mismatch: {missing} not found on peripheral")]
    ProtocolMismatch { missing: String },

    #[error("Descriptor write failed with status {status}")]
    DescriptorWriteFailed { status: i32 },

    #[error("Transport error (code {code})")]
    Transport { code: i32 },

    #[error("Connection attempt timed out after {after_secs}s")]
    Timeout { after_secs: u64 },

    // ── Frame failures (recovered locally) ───────────────────────────
    #[error("Malformed frame: {0}")]
    MalformedFrame(#[from] FrameError),

    // ── Runtime ──────────────────────────────────────────────────────
    #[error("Link manager is not running")]
    ManagerStopped,
}

impl LinkError {
    /// Short reason string carried by `ScanFailed` / `ConnectFailed` events.
    pub fn reason(&self) -> String {
        match self {
            Self::PermissionDenied { operation } => format!("{operation} permission denied"),
            Self::RadioUnavailable => "radio unavailable".into(),
            Self::InvalidAddress(_) => "invalid address".into(),
            Self::ProtocolMismatch { missing } => format!("{missing} not found"),
            Self::DescriptorWriteFailed { .. } => "could not enable notifications".into(),
            Self::Transport { code } => format!("link error {code}"),
            Self::Timeout { .. } => "timed out".into(),
            Self::MalformedFrame(_) => "malformed frame".into(),
            Self::ManagerStopped => "link manager stopped".into(),
        }
    }

    /// Raw radio status code, when the failure came from the radio stack.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::DescriptorWriteFailed { status } => Some(*status),
            Self::Transport { code } => Some(*code),
            _ => None,
        }
    }

    /// Whether an auto-reconnecting session should try again after this.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }
}

// ── Radio backend errors ─────────────────────────────────────────────

/// Immediate rejection of a radio request by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RadioError {
    #[error("radio is powered off or absent")]
    Unavailable,

    #[error("operation '{0}' is not authorized by the host")]
    NotAuthorized(&'static str),

    #[error("unknown peripheral {0}")]
    UnknownPeripheral(String),

    #[error("request rejected by the radio stack (code {code})")]
    Rejected { code: i32 },

    #[error("radio backend error: {0}")]
    Backend(String),
}

impl From<RadioError> for LinkError {
    fn from(err: RadioError) -> Self {
        match err {
            RadioError::Unavailable => Self::RadioUnavailable,
            RadioError::NotAuthorized(operation) => Self::PermissionDenied { operation },
            RadioError::UnknownPeripheral(address) => Self::InvalidAddress(address),
            RadioError::Rejected { code } => Self::Transport { code },
            RadioError::Backend(_) => Self::Transport { code: UNKNOWN_CODE },
        }
    }
}

// ── Frame errors ─────────────────────────────────────────────────────

/// Why a notification payload was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("payload is not valid UTF-8")]
    NotUtf8,

    #[error("expected 3 comma-separated fields, found {found}")]
    FieldCount { found: usize },

    #[error("invalid tracker id '{0}'")]
    InvalidId(String),

    #[error("invalid coordinate '{0}'")]
    InvalidCoordinate(String),
}

// ── Storage errors ───────────────────────────────────────────────────

/// Failure of the durable key-value storage behind link preferences.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("preference storage failed: {0}")]
pub struct StorageError(pub String);
