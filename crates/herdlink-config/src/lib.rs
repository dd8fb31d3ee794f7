//! Configuration for the herdlink CLI.
//!
//! TOML file + `HERDLINK_` environment overrides loaded through figment,
//! platform paths via `directories`, translation to
//! `herdlink_core::LinkConfig`, and the file-backed key-value store that
//! keeps the last linked peripheral across restarts.

mod storage;

pub use storage::FilePreferenceStorage;

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use herdlink_core::config::{TELEMETRY_CHARACTERISTIC, TELEMETRY_SERVICE};
use herdlink_core::{GattProfile, LinkConfig, ReconnectConfig};

const ENV_PREFIX: &str = "HERDLINK_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub link: LinkSettings,

    #[serde(default)]
    pub output: OutputSettings,
}

/// `[link]`: how the link manager scans, connects and ingests.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LinkSettings {
    pub scan_window_secs: u64,
    pub connect_timeout_secs: u64,
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
    /// Show peripherals that never advertise a name.
    pub include_anonymous: bool,
    pub upsert_workers: usize,
    pub upsert_queue: usize,
    pub reconnect: ReconnectSettings,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            scan_window_secs: 15,
            connect_timeout_secs: 30,
            service_uuid: TELEMETRY_SERVICE,
            characteristic_uuid: TELEMETRY_CHARACTERISTIC,
            include_anonymous: false,
            upsert_workers: 4,
            upsert_queue: 64,
            reconnect: ReconnectSettings::default(),
        }
    }
}

/// `[link.reconnect]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconnectSettings {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Unset means retry forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_retries: None,
        }
    }
}

/// `[output]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputSettings {
    pub format: String,
    pub color: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            format: "plain".into(),
            color: "auto".into(),
        }
    }
}

impl Config {
    /// Render as TOML, e.g. for `config show`.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate and translate into the core runtime configuration.
    pub fn to_link_config(&self) -> Result<LinkConfig, ConfigError> {
        let link = &self.link;
        positive("link.scan_window_secs", link.scan_window_secs)?;
        positive("link.connect_timeout_secs", link.connect_timeout_secs)?;
        positive("link.upsert_workers", link.upsert_workers)?;
        positive("link.upsert_queue", link.upsert_queue)?;
        if link.reconnect.initial_delay_ms > link.reconnect.max_delay_ms {
            return Err(ConfigError::Validation {
                field: "link.reconnect.initial_delay_ms".into(),
                reason: format!(
                    "must not exceed max_delay_ms ({})",
                    link.reconnect.max_delay_ms
                ),
            });
        }

        Ok(LinkConfig {
            scan_window: Duration::from_secs(link.scan_window_secs),
            connect_timeout: Duration::from_secs(link.connect_timeout_secs),
            gatt: GattProfile {
                service: link.service_uuid,
                characteristic: link.characteristic_uuid,
                ..GattProfile::default()
            },
            include_anonymous: link.include_anonymous,
            upsert_workers: link.upsert_workers,
            upsert_queue: link.upsert_queue,
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(link.reconnect.initial_delay_ms),
                max_delay: Duration::from_millis(link.reconnect.max_delay_ms),
                max_retries: link.reconnect.max_retries,
            },
        })
    }
}

fn positive<T: Default + PartialEq>(field: &str, value: T) -> Result<(), ConfigError> {
    if value == T::default() {
        return Err(ConfigError::Validation {
            field: field.into(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(())
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("io", "herdlink", "herdlink")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Where durable link state (`state.toml`) lives.
pub fn state_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".local/share").join("state.toml"),
        |dirs| dirs.data_dir().join("state.toml"),
    )
}

fn home_fallback(base: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(base);
    p.push("herdlink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Defaults, then the TOML file at `path`, then `HERDLINK_` variables
/// (`HERDLINK_LINK__SCAN_WINDOW_SECS=30`).
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load from the canonical config path. A missing file is not an error.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = figment(path).extract()?;
    tracing::debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}
