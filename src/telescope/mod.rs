pub mod command;
mod error;
mod session;
mod types;
mod watch;

pub use error::SessionError;
pub use session::{SessionOptions, TelescopeSession, DEFAULT_POLL_INTERVAL, DEFAULT_PORT};
pub use types::{ConnectionState, Notification, Pose, SessionStatus};
pub use watch::{wait_for_outcome, wait_until_connected};
