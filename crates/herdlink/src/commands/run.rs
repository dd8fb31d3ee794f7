//! `herdlink run`: resume the stored link and take commands from stdin.

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use herdlink_core::{Command, CommandResult, LinkEvent, LinkManager, TrackerStore};

use super::util::LinkContext;
use crate::error::CliError;
use crate::output::Printer;

pub async fn handle(ctx: LinkContext, printer: &Printer) -> Result<(), CliError> {
    let mut events = ctx.manager.subscribe();
    let mut feed = ctx.trackers.all();

    match ctx.manager.resume().await {
        Ok(Some(address)) => info!(%address, "resuming stored link"),
        Ok(None) => debug!("no stored link to resume"),
        // The failure is also on the bus.
        Err(e) => warn!(error = %e, "stored link could not be resumed"),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut directory_len = None;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            Some(event) = events.recv() => {
                // Sightings refresh the snapshot constantly; print only growth.
                if let LinkEvent::ScanResults { peripherals } = &event {
                    if directory_len == Some(peripherals.len()) {
                        continue;
                    }
                    directory_len = Some(peripherals.len());
                }
                printer.event(&event)?;
            }
            Some(updates) = feed.updates() => {
                for record in &updates {
                    printer.tracker(record)?;
                }
            }
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => {
                    if !execute_line(&ctx.manager, printer, line.trim()).await? {
                        break;
                    }
                }
                None => {
                    debug!("stdin closed; running until interrupted");
                    stdin_open = false;
                }
            },
        }
    }

    ctx.manager.shutdown().await;
    while let Some(event) = events.try_recv() {
        printer.event(&event)?;
    }
    Ok(())
}

/// Run one typed line. Returns `false` when the user asked to quit.
async fn execute_line(
    manager: &LinkManager,
    printer: &Printer,
    line: &str,
) -> Result<bool, CliError> {
    if line.is_empty() {
        return Ok(true);
    }
    if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
        return Ok(false);
    }

    let command = match line.parse::<Command>() {
        Ok(command) => command,
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(true);
        }
    };

    let verb = command.verb();
    match manager.execute(command).await {
        Ok(CommandResult::Status(status)) => printer.status(&status)?,
        Ok(CommandResult::Resumed { address: None }) => printer.print("nothing to resume"),
        Ok(_) => {}
        Err(e) => eprintln!("error: {verb}: {e}"),
    }
    Ok(true)
}
