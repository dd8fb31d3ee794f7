// ── Command API ──
//
// Every request from the presentation layer flows through `Command`.
// Commands are acknowledged immediately; their outcomes arrive on the
// event bus.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::error::LinkError;
use crate::link::LinkState;
use crate::model::PeripheralAddress;

/// A command envelope sent through the command channel.
/// Contains the command and a oneshot response channel.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: tokio::sync::oneshot::Sender<Result<CommandResult, LinkError>>,
}

/// Everything a caller can ask of the link manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // ── Discovery ────────────────────────────────────────────────────
    StartScan,
    StopScan,

    // ── Session ──────────────────────────────────────────────────────
    Connect { address: PeripheralAddress },
    Disconnect,

    // ── Stored link ──────────────────────────────────────────────────
    /// Reconnect to the stored peripheral, if any and if idle.
    Resume,
    /// Drop the stored peripheral.
    Forget,

    Status,
}

/// Acknowledgement of an accepted command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommandResult {
    Accepted,
    /// `address` is `None` when there was nothing to resume.
    Resumed { address: Option<PeripheralAddress> },
    Status(LinkStatus),
}

/// Point-in-time view of the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkStatus {
    pub state: LinkState,
    pub address: Option<PeripheralAddress>,
    pub name: Option<String>,
    pub scanning: bool,
    /// Peripherals in the current directory snapshot.
    pub peripherals: usize,
}

// ── Text form ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}'")]
    Unknown(String),

    #[error("'{verb}' needs {argument}")]
    MissingArgument {
        verb: &'static str,
        argument: &'static str,
    },

    #[error("'{verb}' takes no argument, got '{extra}'")]
    UnexpectedArgument { verb: &'static str, extra: String },

    #[error(transparent)]
    InvalidAddress(#[from] crate::model::AddressParseError),
}

impl Command {
    /// The verb this command is typed as.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::StartScan => "start-scan",
            Self::StopScan => "stop-scan",
            Self::Connect { .. } => "connect",
            Self::Disconnect => "disconnect",
            Self::Resume => "resume",
            Self::Forget => "forget",
            Self::Status => "status",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect { address } => write!(f, "connect {address}"),
            other => f.write_str(other.verb()),
        }
    }
}

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let verb = words.next().ok_or(CommandParseError::Empty)?;

        let command = match verb.to_ascii_lowercase().as_str() {
            "start-scan" => Self::StartScan,
            "stop-scan" => Self::StopScan,
            "connect" => {
                let raw = words.next().ok_or(CommandParseError::MissingArgument {
                    verb: "connect",
                    argument: "an address",
                })?;
                Self::Connect {
                    address: raw.parse()?,
                }
            }
            "disconnect" => Self::Disconnect,
            "resume" => Self::Resume,
            "forget" => Self::Forget,
            "status" => Self::Status,
            _ => return Err(CommandParseError::Unknown(verb.to_owned())),
        };

        if let Some(extra) = words.next() {
            return Err(CommandParseError::UnexpectedArgument {
                verb: command.verb(),
                extra: extra.to_owned(),
            });
        }
        Ok(command)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_four_verbs() {
        assert_eq!("start-scan".parse::<Command>().unwrap(), Command::StartScan);
        assert_eq!("stop-scan".parse::<Command>().unwrap(), Command::StopScan);
        assert_eq!("disconnect".parse::<Command>().unwrap(), Command::Disconnect);
        assert_eq!(
            "  connect aa:bb:cc:dd:ee:ff ".parse::<Command>().unwrap(),
            Command::Connect {
                address: PeripheralAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF])
            }
        );
    }

    #[test]
    fn verbs_are_case_insensitive() {
        assert_eq!("Start-Scan".parse::<Command>().unwrap(), Command::StartScan);
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!("".parse::<Command>(), Err(CommandParseError::Empty));
        assert!(matches!(
            "connect".parse::<Command>(),
            Err(CommandParseError::MissingArgument { verb: "connect", .. })
        ));
        assert!(matches!(
            "connect nope".parse::<Command>(),
            Err(CommandParseError::InvalidAddress(_))
        ));
        assert!(matches!(
            "stop-scan now".parse::<Command>(),
            Err(CommandParseError::UnexpectedArgument { .. })
        ));
        assert_eq!(
            "pair".parse::<Command>(),
            Err(CommandParseError::Unknown("pair".into()))
        );
    }

    #[test]
    fn display_round_trips_through_parse() {
        let command = Command::Connect {
            address: "01:02:03:04:05:06".parse().unwrap(),
        };
        assert_eq!(command.to_string().parse::<Command>().unwrap(), command);
    }
}
