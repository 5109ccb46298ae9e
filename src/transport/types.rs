use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::error::TransportError;

/// Network address of a telescope controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn url(&self, endpoint: &str) -> String {
        format!("http://{}:{}{}", self.host, self.port, endpoint)
    }
}

/// A single outbound request. Never persisted.
#[derive(Debug, Clone)]
pub struct Command {
    pub id: Uuid,
    pub endpoint: String,
    pub payload: Value,
    pub issued_at: DateTime<Utc>,
}

impl Command {
    pub fn new(endpoint: &str, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            endpoint: endpoint.to_string(),
            payload,
            issued_at: Utc::now(),
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    Opened { token: String },
    OpenFailed(TransportError),
    Delivered { endpoint: String },
    Failed { endpoint: String, error: TransportError },
}

/// Outcome of a handshake or command, tagged with the connection
/// generation it was issued under.
#[derive(Debug)]
pub struct Report {
    pub generation: u64,
    pub outcome: Outcome,
}

#[derive(Debug, Clone)]
pub struct Reporter {
    generation: u64,
    tx: mpsc::UnboundedSender<Report>,
}

impl Reporter {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<Report>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn report(&self, outcome: Outcome) {
        let report = Report {
            generation: self.generation,
            outcome,
        };
        if self.tx.send(report).is_err() {
            log::debug!(
                "Session gone, dropping report for generation {}",
                self.generation
            );
        }
    }
}

/// Everything a transport needs to serve one connection lifetime.
#[derive(Debug, Clone)]
pub struct Link {
    pub target: Target,
    pub handshake: Command,
    pub reporter: Reporter,
}
