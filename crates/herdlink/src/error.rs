//! CLI error types with miette diagnostics.
//!
//! Maps `LinkError` and config failures into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use herdlink_config::ConfigError;
use herdlink_core::{LinkError, RadioError, StorageError};

/// Process exit codes. Success is 0.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const PERMISSION: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

/// Reason carried by `ConnectFailed` when the attempt ran out of time.
const TIMED_OUT_REASON: &str = "timed out";

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Radio ────────────────────────────────────────────────────────
    #[error("Bluetooth radio is unavailable")]
    #[diagnostic(
        code(herdlink::radio_unavailable),
        help(
            "Check that a Bluetooth adapter is present and powered on.\n\
             On Linux: bluetoothctl power on"
        )
    )]
    RadioUnavailable,

    #[error("Not permitted to {operation}")]
    #[diagnostic(
        code(herdlink::permission_denied),
        help("Grant this process Bluetooth access and try again.")
    )]
    PermissionDenied { operation: String },

    #[error("Scan failed: {reason}")]
    #[diagnostic(code(herdlink::scan_failed))]
    ScanFailed { reason: String },

    // ── Link ─────────────────────────────────────────────────────────
    #[error("Connection to {name} failed: {reason}")]
    #[diagnostic(
        code(herdlink::connect_failed),
        help("Make sure the tag is in range and advertising, then retry.")
    )]
    ConnectFailed { name: String, reason: String },

    #[error("Link to {name} was lost")]
    #[diagnostic(code(herdlink::link_lost))]
    LinkLost { name: String },

    #[error("Timed out after {seconds}s")]
    #[diagnostic(
        code(herdlink::timeout),
        help("Increase the limit with --connect-timeout or move closer to the tag.")
    )]
    Timeout { seconds: u64 },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(herdlink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration & storage ──────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(herdlink::config),
        help("Run: herdlink config path  to locate the file being loaded")
    )]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(code(herdlink::storage))]
    Storage(#[from] StorageError),

    // ── Runtime ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    #[diagnostic(code(herdlink::internal))]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to render YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::PermissionDenied { .. } => exit_code::PERMISSION,
            Self::RadioUnavailable
            | Self::ScanFailed { .. }
            | Self::LinkLost { .. } => exit_code::CONNECTION,
            Self::ConnectFailed { reason, .. } if reason == TIMED_OUT_REASON => {
                exit_code::TIMEOUT
            }
            Self::ConnectFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::Config(ConfigError::Validation { .. }) => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── LinkError → CliError mapping ─────────────────────────────────────

impl From<LinkError> for CliError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::PermissionDenied { operation } => CliError::PermissionDenied {
                operation: operation.into(),
            },

            LinkError::RadioUnavailable => CliError::RadioUnavailable,

            LinkError::InvalidAddress(raw) => CliError::Validation {
                field: "address".into(),
                reason: format!("'{raw}' is not a reachable peripheral address"),
            },

            LinkError::Timeout { after_secs } => CliError::Timeout {
                seconds: after_secs,
            },

            err @ (LinkError::ProtocolMismatch { .. }
            | LinkError::DescriptorWriteFailed { .. }
            | LinkError::Transport { .. }
            | LinkError::MalformedFrame(_)) => CliError::ConnectFailed {
                name: "peripheral".into(),
                reason: err.reason(),
            },

            LinkError::ManagerStopped => CliError::Internal(err.to_string()),
        }
    }
}

impl From<RadioError> for CliError {
    fn from(err: RadioError) -> Self {
        LinkError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_errors_keep_stable_exit_codes() {
        let code = |err: LinkError| CliError::from(err).exit_code();

        assert_eq!(
            code(LinkError::PermissionDenied { operation: "scan" }),
            exit_code::PERMISSION
        );
        assert_eq!(code(LinkError::RadioUnavailable), exit_code::CONNECTION);
        assert_eq!(code(LinkError::Transport { code: 133 }), exit_code::CONNECTION);
        assert_eq!(code(LinkError::Timeout { after_secs: 30 }), exit_code::TIMEOUT);
        assert_eq!(
            code(LinkError::InvalidAddress("nope".into())),
            exit_code::USAGE
        );
        assert_eq!(code(LinkError::ManagerStopped), exit_code::GENERAL);
    }

    #[test]
    fn timed_out_connect_maps_to_timeout_code() {
        let err = CliError::ConnectFailed {
            name: "Tag-1".into(),
            reason: LinkError::Timeout { after_secs: 30 }.reason(),
        };
        assert_eq!(err.exit_code(), exit_code::TIMEOUT);
    }

    #[test]
    fn config_validation_is_a_usage_error() {
        let err = CliError::from(ConfigError::Validation {
            field: "link.scan_window_secs".into(),
            reason: "must be greater than zero".into(),
        });
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }
}
