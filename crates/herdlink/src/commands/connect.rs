//! `herdlink connect`: link to one tag and stream its telemetry.

use herdlink_core::{LinkEvent, PeripheralAddress, TrackerStore};

use super::util::LinkContext;
use crate::error::CliError;
use crate::output::Printer;

pub async fn handle(
    ctx: LinkContext,
    printer: &Printer,
    address: PeripheralAddress,
) -> Result<(), CliError> {
    let mut events = ctx.manager.subscribe();
    let mut feed = ctx.trackers.all();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let result: Result<(), CliError> = async {
        ctx.manager.connect(address).await?;
        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    ctx.manager.disconnect().await?;
                    return Ok(());
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        return Err(CliError::Internal("event bus closed".into()));
                    };
                    match event {
                        LinkEvent::ScanResults { .. } => {}
                        LinkEvent::ConnectFailed { name, reason, .. } => {
                            return Err(CliError::ConnectFailed { name, reason });
                        }
                        LinkEvent::Disconnected { name } => {
                            return Err(CliError::LinkLost { name });
                        }
                        other => printer.event(&other)?,
                    }
                }
                Some(updates) = feed.updates() => {
                    for record in &updates {
                        printer.tracker(record)?;
                    }
                }
            }
        }
    }
    .await;

    ctx.manager.shutdown().await;
    while let Some(event) = events.try_recv() {
        printer.event(&event)?;
    }
    result
}
