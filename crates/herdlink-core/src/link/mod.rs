// ── Link session ──
//
// The pieces the link manager's state machine is built from: the state
// enum, the session value owning the radio handle, and the reconnect
// schedule.

mod reconnect;
mod session;
mod state;

pub use reconnect::{PendingReconnect, calculate_backoff};
pub use session::{LinkSession, SessionEnd};
pub use state::{ConnectMode, LinkState};
