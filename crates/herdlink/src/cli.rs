//! Clap derive structures for the `herdlink` CLI.
//!
//! Only clap types live here: `build.rs` includes this file to render man
//! pages.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// herdlink -- link manager for BLE animal-tracking tags
#[derive(Debug, Parser)]
#[command(
    name = "herdlink",
    version,
    about = "Discover, link and ingest telemetry from BLE animal-tracking tags",
    long_about = "Scans for tracking tags advertising the telemetry service, keeps a\n\
        single link open to the chosen tag, and records every `id,lat,lon`\n\
        frame it notifies. The last linked tag is remembered and resumed on\n\
        the next `herdlink run`.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file to load instead of the platform default
    #[arg(long, env = "HERDLINK_CONFIG", global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Scan window in seconds (overrides config)
    #[arg(long, global = true, value_name = "SECS")]
    pub scan_window: Option<u64>,

    /// Connect-attempt timeout in seconds (overrides config)
    #[arg(long, global = true, value_name = "SECS")]
    pub connect_timeout: Option<u64>,

    /// Output format (overrides config)
    #[arg(long, short = 'o', global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output (overrides config)
    #[arg(long, global = true)]
    pub color: Option<ColorMode>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Log line format on stderr
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,
}

// ── Output, Color & Log Enums ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON (one event per line)
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one line per item
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resume the last link, then read commands from stdin
    ///
    /// Accepted lines: start-scan, stop-scan, connect <ADDRESS>,
    /// disconnect, forget, status, quit.
    Run,

    /// Scan for one window and list the tags found
    #[command(alias = "s")]
    Scan(ScanArgs),

    /// Link to a tag and stream its telemetry until interrupted
    #[command(alias = "c")]
    Connect(ConnectArgs),

    /// Forget the remembered tag
    Forget,

    /// Inspect configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Subcommand Arguments ─────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Scan window in seconds
    #[arg(long, short = 'w', value_name = "SECS")]
    pub window: Option<u64>,
}

#[derive(Debug, Args)]
pub struct ConnectArgs {
    /// Hardware address, e.g. C0:FF:EE:00:00:01
    pub address: String,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display the effective configuration
    Show,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
