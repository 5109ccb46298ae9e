use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Last known or commanded orientation. Only ever overwritten with real data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, utoipa::ToSchema)]
pub struct Pose {
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub alt_deg: f64,
    pub az_deg: f64,
    pub target_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct SessionStatus {
    pub state: ConnectionState,
    pub label: String,
    pub authenticated: bool,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub last_error: Option<String>,
    pub pose: Pose,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Connected,
    Disconnected,
    ConnectionError { message: String },
    StatusUpdated { label: String },
    PoseUpdated(Pose),
    CommandAcknowledged { endpoint: String },
    CommandFailed { endpoint: String, reason: String },
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::Connected => write!(f, "connected"),
            Notification::Disconnected => write!(f, "disconnected"),
            Notification::ConnectionError { message } => write!(f, "connection error: {}", message),
            Notification::StatusUpdated { label } => write!(f, "status: {}", label),
            Notification::PoseUpdated(pose) => write!(
                f,
                "pose: RA {:.4} DEC {:.4} ALT {:.2} AZ {:.2} {}",
                pose.ra_deg, pose.dec_deg, pose.alt_deg, pose.az_deg, pose.target_name
            ),
            Notification::CommandAcknowledged { endpoint } => write!(f, "acknowledged: {}", endpoint),
            Notification::CommandFailed { endpoint, reason } => {
                write!(f, "failed: {} ({})", endpoint, reason)
            }
        }
    }
}
