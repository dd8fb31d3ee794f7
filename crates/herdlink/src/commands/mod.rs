//! Command dispatch: bridges CLI args -> link manager -> output formatting.

pub mod config_cmd;
pub mod connect;
pub mod forget;
pub mod run;
pub mod scan;
pub mod util;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a command that needs configuration or the radio.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    let mut cfg = util::load_config(global)?;
    let printer = util::printer(global, &cfg)?;

    match cmd {
        Command::Run => run::handle(util::LinkContext::start(&cfg).await?, &printer).await,
        Command::Scan(args) => {
            if let Some(window) = args.window {
                cfg.link.scan_window_secs = window;
            }
            scan::handle(util::LinkContext::start(&cfg).await?, &printer).await
        }
        Command::Connect(args) => {
            // Reject a bad address before touching the radio.
            let address = util::parse_address(&args.address)?;
            connect::handle(util::LinkContext::start(&cfg).await?, &printer, address).await
        }
        Command::Forget => forget::handle(&printer),
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
