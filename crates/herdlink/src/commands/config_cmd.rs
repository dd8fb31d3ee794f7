//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::commands::util;
use crate::error::CliError;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            let path = global
                .config
                .clone()
                .unwrap_or_else(herdlink_config::config_path);
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommand::Show => {
            let cfg = util::load_config(global)?;
            // Refuse to show settings the other commands would reject.
            cfg.to_link_config()?;
            util::printer(global, &cfg)?;
            print!("{}", cfg.to_toml()?);
            Ok(())
        }
    }
}
