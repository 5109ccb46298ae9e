mod error;
mod http;
mod simulated;
mod types;

pub use error::TransportError;
pub use http::HttpTransport;
pub use simulated::SimulatedTransport;
pub use types::{Command, Link, Outcome, Report, Reporter, Target};

/// Issues commands to a telescope controller.
///
/// Every method returns immediately. Handshake and command outcomes are
/// delivered later through the [`Reporter`] of the currently open [`Link`],
/// so implementations hold no telescope state of their own and never call
/// back into the session.
pub trait CommandTransport: Send + Sync {
    /// Binds the transport to `link` and starts its handshake.
    fn open(&self, link: Link);

    /// Forgets the current link. Requests already in flight still report,
    /// tagged with the generation they were issued under.
    fn close(&self);

    /// Dispatches `command`, attaching `token` as the raw `Authorization`
    /// header when present. Returns false without sending anything when no
    /// link is open.
    fn send(&self, command: Command, token: Option<&str>) -> bool;
}
