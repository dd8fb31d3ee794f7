//! `herdlink forget`: clear the remembered tag without touching the radio.

use std::sync::Arc;

use herdlink_config::FilePreferenceStorage;
use herdlink_core::LinkPreferenceStore;

use crate::error::CliError;
use crate::output::Printer;

pub fn handle(printer: &Printer) -> Result<(), CliError> {
    let preferences = LinkPreferenceStore::new(Arc::new(FilePreferenceStorage::open_default()));

    match preferences.load() {
        Some(stored) => {
            preferences.clear()?;
            printer.print(&format!("forgot {}", stored.display_name_or_address()));
        }
        None => printer.print("no stored link"),
    }
    Ok(())
}
