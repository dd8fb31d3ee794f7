//! `herdlink scan`: one scan window, then the directory it built.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use herdlink_core::{LinkEvent, Subscription};

use super::util::LinkContext;
use crate::error::CliError;
use crate::output::Printer;

/// Slack on top of the window for the radio to report the stop.
const STOP_GRACE: Duration = Duration::from_secs(5);

pub async fn handle(ctx: LinkContext, printer: &Printer) -> Result<(), CliError> {
    let window = ctx.link.scan_window;
    let mut events = ctx.manager.subscribe();
    let spinner = spinner(printer.quiet, window);

    let outcome: Result<(), CliError> = async {
        ctx.manager.start_scan().await?;
        tokio::select! {
            ended = tokio::time::timeout(window + STOP_GRACE, scan_end(&mut events, &spinner)) => {
                ended.map_err(|_| CliError::Timeout {
                    seconds: (window + STOP_GRACE).as_secs(),
                })?
            }
            _ = tokio::signal::ctrl_c() => ctx.manager.stop_scan().await.map_err(CliError::from),
        }
    }
    .await;

    spinner.finish_and_clear();
    let directory = ctx.manager.bus().latest_directory().unwrap_or_default();
    ctx.manager.shutdown().await;

    outcome?;
    printer.peripherals(&directory)
}

async fn scan_end(events: &mut Subscription, spinner: &ProgressBar) -> Result<(), CliError> {
    while let Some(event) = events.recv().await {
        match event {
            LinkEvent::ScanStopped => return Ok(()),
            LinkEvent::ScanFailed { reason, .. } => return Err(CliError::ScanFailed { reason }),
            LinkEvent::ScanResults { peripherals } => {
                spinner.set_message(format!("{} tag(s) found", peripherals.len()));
            }
            _ => {}
        }
    }
    Err(CliError::Internal("event bus closed during scan".into()))
}

fn spinner(quiet: bool, window: Duration) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} scanning ({elapsed}) {msg}") {
        pb.set_style(style);
    }
    pb.set_message(format!("for {}", humantime::format_duration(window)));
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
