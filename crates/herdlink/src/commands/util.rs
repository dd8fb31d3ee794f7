//! Shared helpers for command handlers.

use std::sync::Arc;

use clap::ValueEnum;

use herdlink_config::{Config, FilePreferenceStorage};
use herdlink_core::radio::event_channel;
use herdlink_core::{
    LinkConfig, LinkDeps, LinkManager, LinkPreferenceStore, MemoryTrackerStore, PeripheralAddress,
    TrackerStore,
};

use crate::cli::{ColorMode, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output::{Printer, should_color};
use crate::radio::BtleplugRadio;

// ── Configuration ────────────────────────────────────────────────────

/// Load the config file (or `--config`) and apply CLI overrides.
pub fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    let mut cfg = match &global.config {
        Some(path) => herdlink_config::load_config_from(path)?,
        None => herdlink_config::load_config()?,
    };

    if let Some(secs) = global.scan_window {
        cfg.link.scan_window_secs = secs;
    }
    if let Some(secs) = global.connect_timeout {
        cfg.link.connect_timeout_secs = secs;
    }
    if let Some(format) = global.output {
        cfg.output.format = value_name(&format);
    }
    if let Some(color) = global.color {
        cfg.output.color = value_name(&color);
    }
    Ok(cfg)
}

pub fn printer(global: &GlobalOpts, cfg: &Config) -> Result<Printer, CliError> {
    let format: OutputFormat = parse_value("output.format", &cfg.output.format)?;
    let color: ColorMode = parse_value("output.color", &cfg.output.color)?;
    Ok(Printer {
        format,
        color: should_color(color),
        quiet: global.quiet,
    })
}

fn parse_value<T: ValueEnum>(field: &str, raw: &str) -> Result<T, CliError> {
    T::from_str(raw, true).map_err(|_| CliError::Validation {
        field: field.into(),
        reason: format!("unknown value '{raw}'"),
    })
}

fn value_name<T: ValueEnum>(value: &T) -> String {
    value
        .to_possible_value()
        .map(|v| v.get_name().to_owned())
        .unwrap_or_default()
}

pub fn parse_address(raw: &str) -> Result<PeripheralAddress, CliError> {
    raw.parse().map_err(|_| CliError::Validation {
        field: "address".into(),
        reason: format!("'{raw}' is not a hardware address (expected AA:BB:CC:DD:EE:FF)"),
    })
}

// ── Running manager ──────────────────────────────────────────────────

/// A link manager wired to the system radio and the durable state file.
pub struct LinkContext {
    pub manager: LinkManager,
    pub trackers: Arc<MemoryTrackerStore>,
    pub link: LinkConfig,
}

impl LinkContext {
    pub async fn start(cfg: &Config) -> Result<Self, CliError> {
        let link = cfg.to_link_config()?;

        let (events_tx, events_rx) = event_channel();
        let radio = BtleplugRadio::open(events_tx).await?;
        let trackers = Arc::new(MemoryTrackerStore::new());
        let preferences =
            LinkPreferenceStore::new(Arc::new(FilePreferenceStorage::open_default()));

        let deps = LinkDeps::new(Arc::new(radio))
            .with_trackers(Arc::clone(&trackers) as Arc<dyn TrackerStore>)
            .with_preferences(preferences);
        let manager = LinkManager::spawn(deps, link.clone(), events_rx);

        Ok(Self {
            manager,
            trackers,
            link,
        })
    }
}
