use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use super::error::TransportError;
use super::types::{Command, Link, Outcome};
use super::CommandTransport;

const SIMULATED_TOKEN: &str = "simulated-token";

/// Controller stand-in that acknowledges everything after a fixed delay.
///
/// Used for dry runs (`--simulate`) and as the test double behind
/// [`CommandTransport`]. Handshake refusal and per-endpoint failures can be
/// scripted.
pub struct SimulatedTransport {
    handshake_delay: Duration,
    command_delay: Duration,
    refuse_handshake: bool,
    failures: HashMap<String, TransportError>,
    link: StdMutex<Option<Link>>,
    sent: StdMutex<Vec<Command>>,
    handshakes: StdMutex<usize>,
}

impl SimulatedTransport {
    pub fn new(delay: Duration) -> Self {
        Self {
            handshake_delay: delay,
            command_delay: delay,
            refuse_handshake: false,
            failures: HashMap::new(),
            link: StdMutex::new(None),
            sent: StdMutex::new(Vec::new()),
            handshakes: StdMutex::new(0),
        }
    }

    #[cfg(test)]
    pub fn with_command_delay(mut self, delay: Duration) -> Self {
        self.command_delay = delay;
        self
    }

    #[cfg(test)]
    pub fn refusing(mut self) -> Self {
        self.refuse_handshake = true;
        self
    }

    #[cfg(test)]
    pub fn failing(mut self, endpoint: &str, error: TransportError) -> Self {
        self.failures.insert(endpoint.to_string(), error);
        self
    }

    #[cfg(test)]
    pub fn sent(&self) -> Vec<Command> {
        self.sent.lock().unwrap().clone()
    }

    #[cfg(test)]
    pub fn handshakes(&self) -> usize {
        *self.handshakes.lock().unwrap()
    }
}

impl CommandTransport for SimulatedTransport {
    fn open(&self, link: Link) {
        *self.link.lock().unwrap() = Some(link.clone());
        *self.handshakes.lock().unwrap() += 1;

        let delay = self.handshake_delay;
        let refuse = self.refuse_handshake;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let outcome = if refuse {
                Outcome::OpenFailed(TransportError::ConnectionRefused)
            } else {
                Outcome::Opened {
                    token: SIMULATED_TOKEN.to_string(),
                }
            };
            link.reporter.report(outcome);
        });
    }

    fn close(&self) {
        self.link.lock().unwrap().take();
    }

    fn send(&self, command: Command, token: Option<&str>) -> bool {
        let Some(link) = self.link.lock().unwrap().clone() else {
            return false;
        };

        log::debug!(
            "Simulated {} (authorized: {}): {}",
            command.endpoint,
            token.is_some(),
            command.payload
        );

        let endpoint = command.endpoint.clone();
        let failure = self.failures.get(&endpoint).cloned();
        self.sent.lock().unwrap().push(command);

        let delay = self.command_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let outcome = match failure {
                Some(error) => Outcome::Failed { endpoint, error },
                None => Outcome::Delivered { endpoint },
            };
            link.reporter.report(outcome);
        });
        true
    }
}
