//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output` / `[output]`. Tables
//! use `tabled`, structured formats use serde, plain emits one line per
//! item. Streaming commands print one event per line in every format.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use herdlink_core::{DiscoveredPeripheral, LinkEvent, LinkStatus, TrackerRecord};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

// ── Rows ─────────────────────────────────────────────────────────────

#[derive(Tabled)]
struct PeripheralRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Scan")]
    scan: u64,
}

fn peripheral_row(p: &DiscoveredPeripheral) -> PeripheralRow {
    PeripheralRow {
        name: p.display_name(),
        address: p.address.to_string(),
        scan: p.first_seen_scan_id,
    }
}

fn status_detail(status: &LinkStatus) -> String {
    let peer = match (&status.name, &status.address) {
        (Some(name), Some(address)) => format!("{name} [{address}]"),
        (None, Some(address)) => address.to_string(),
        _ => "-".into(),
    };
    format!(
        "State:       {}\nPeripheral:  {peer}\nScanning:    {}\nDiscovered:  {}",
        status.state, status.scanning, status.peripherals
    )
}

// ── Printer ──────────────────────────────────────────────────────────

/// Resolved output settings shared by every command handler.
#[derive(Debug, Clone)]
pub struct Printer {
    pub format: OutputFormat,
    pub color: bool,
    pub quiet: bool,
}

impl Printer {
    pub fn peripherals(&self, data: &[DiscoveredPeripheral]) -> Result<(), CliError> {
        let out = render_list(
            self.format,
            data,
            peripheral_row,
            |p| format!("{}\t{}", p.address, p.display_name()),
        )?;
        self.print(&out);
        Ok(())
    }

    pub fn status(&self, status: &LinkStatus) -> Result<(), CliError> {
        let out = render_single(self.format, status, status_detail, |s| s.state.to_string())?;
        self.print(&out);
        Ok(())
    }

    /// One bus event as a single line.
    pub fn event(&self, event: &LinkEvent) -> Result<(), CliError> {
        let line = match self.format {
            OutputFormat::Table | OutputFormat::Plain => self.event_line(event),
            OutputFormat::Json | OutputFormat::JsonCompact => render_json_compact(event)?,
            OutputFormat::Yaml => format!("---\n{}", render_yaml(event)?),
        };
        self.print(&line);
        Ok(())
    }

    /// One tracker position update as a single line.
    pub fn tracker(&self, record: &TrackerRecord) -> Result<(), CliError> {
        let line = match self.format {
            OutputFormat::Table | OutputFormat::Plain => {
                let label = format!("tracker {}", record.id);
                format!(
                    "{} {} {:.6},{:.6}",
                    self.paint(&label, Tone::Data),
                    record.name,
                    record.latitude,
                    record.longitude
                )
            }
            OutputFormat::Json | OutputFormat::JsonCompact => render_json_compact(record)?,
            OutputFormat::Yaml => format!("---\n{}", render_yaml(record)?),
        };
        self.print(&line);
        Ok(())
    }

    /// Print the rendered output to stdout, respecting quiet mode.
    pub fn print(&self, output: &str) {
        if self.quiet || output.is_empty() {
            return;
        }
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{output}");
    }

    fn event_line(&self, event: &LinkEvent) -> String {
        let tone = match event {
            LinkEvent::Connected { .. } | LinkEvent::NewTracker { .. } => Tone::Good,
            LinkEvent::ConnectFailed { .. } | LinkEvent::ScanFailed { .. } => Tone::Bad,
            LinkEvent::Disconnected { .. } => Tone::Warn,
            _ => Tone::Info,
        };
        self.paint(&event.to_string(), tone)
    }

    fn paint(&self, text: &str, tone: Tone) -> String {
        if !self.color {
            return text.to_owned();
        }
        match tone {
            Tone::Good => text.green().to_string(),
            Tone::Bad => text.red().to_string(),
            Tone::Warn => text.yellow().to_string(),
            Tone::Info => text.cyan().to_string(),
            Tone::Data => text.bold().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Tone {
    Good,
    Bad,
    Warn,
    Info,
    Data,
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    plain_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    Ok(match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Table::new(rows).with(Style::rounded()).to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::JsonCompact => render_json_compact(data)?,
        OutputFormat::Yaml => render_yaml(data)?,
        OutputFormat::Plain => data.iter().map(plain_fn).collect::<Vec<_>>().join("\n"),
    })
}

/// Render a single item. Table output uses `detail_fn` since single-item
/// views don't use the `Tabled` derive.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    plain_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    Ok(match format {
        OutputFormat::Table => detail_fn(data),
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::JsonCompact => render_json_compact(data)?,
        OutputFormat::Yaml => render_yaml(data)?,
        OutputFormat::Plain => plain_fn(data),
    })
}

fn render_json_compact<T: serde::Serialize + ?Sized>(data: &T) -> Result<String, CliError> {
    Ok(serde_json::to_string(data)?)
}

fn render_yaml<T: serde::Serialize + ?Sized>(data: &T) -> Result<String, CliError> {
    Ok(serde_yaml::to_string(data)?.trim_end().to_owned())
}
