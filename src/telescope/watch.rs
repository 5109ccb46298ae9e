use tokio::sync::broadcast::{self, error::RecvError};

use super::error::SessionError;
use super::types::Notification;

async fn next(
    events: &mut broadcast::Receiver<Notification>,
) -> Result<Notification, SessionError> {
    loop {
        match events.recv().await {
            Ok(notification) => {
                log::debug!("{}", notification);
                return Ok(notification);
            }
            Err(RecvError::Lagged(skipped)) => {
                log::warn!("Missed {} session notifications", skipped);
            }
            Err(RecvError::Closed) => {
                return Err(SessionError::ConnectionFailed("session closed".into()));
            }
        }
    }
}

/// Waits for the pending connection attempt to settle.
pub async fn wait_until_connected(
    events: &mut broadcast::Receiver<Notification>,
) -> Result<(), SessionError> {
    loop {
        match next(events).await? {
            Notification::Connected => return Ok(()),
            Notification::ConnectionError { message } => {
                return Err(SessionError::ConnectionFailed(message))
            }
            Notification::Disconnected => {
                return Err(SessionError::ConnectionFailed("disconnected".into()))
            }
            _ => {}
        }
    }
}

/// Waits for the controller's verdict on the command in flight and returns
/// its endpoint.
pub async fn wait_for_outcome(
    events: &mut broadcast::Receiver<Notification>,
) -> Result<String, SessionError> {
    loop {
        match next(events).await? {
            Notification::CommandAcknowledged { endpoint } => return Ok(endpoint),
            Notification::CommandFailed { endpoint, reason } => {
                return Err(SessionError::CommandFailed { endpoint, reason })
            }
            Notification::Disconnected => return Err(SessionError::NotConnected),
            _ => {}
        }
    }
}
